//! Object model for GenTL style industrial cameras.
//!
//! A [System] enumerates [Interface]s (network cards, frame grabbers, USB3
//! controllers). Each interface enumerates [DeviceInfo] snapshots which are
//! used to open a [Device]. A device exposes parameter trees ([ParamTree]) and
//! one or more [Stream]s, the acquisition engines that fill [Buffer]s.
//!
//! Backends implement these traits. The acquisition lifecycle built on top of
//! them lives in the `ipxcam-acquire` crate.

use std::sync::Arc;
use std::time::Duration;

pub use ipxcam_types::{
    AccessStatus, DeviceAccess, EventKind, FlushOperation, InterfaceType, ParamType, Visibility,
};

mod buffer;
pub mod code;
pub mod event;
mod list;
pub mod param;

pub use buffer::{pfnc, pixel_format_code, Buffer, BufferId, FrameMeta};
pub use code::ErrorCode;
pub use event::{DeviceEvent, EventObserver, GevEvent, ObserverRegistry, ParamObserver, SubscriptionId};
pub use list::SnapshotList;
pub use param::{EnumEntry, Param, ParamKind, ParamTree, ParamWrite};

// ---------------------------
// errors

pub type Result<M> = std::result::Result<M, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Timeout")]
    Timeout,
    #[error("operation aborted")]
    Aborted,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("no device")]
    NoDevice,
    #[error("access denied (access status {status})")]
    AccessDenied { status: AccessStatus },
    #[error("device is not in the IP subnet of its interface")]
    IpSubnetMismatch,
    #[error("device info is stale, the interface was re-enumerated")]
    StaleDeviceInfo,
    #[error("invalid index {index}")]
    InvalidIndex { index: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown parameter \"{name}\"")]
    UnknownParam { name: String },
    #[error("parameter \"{name}\" is not available")]
    ParamNotAvailable { name: String },
    #[error("parameter \"{name}\" is not readable")]
    ParamNotReadable { name: String },
    #[error("parameter \"{name}\" is not writable")]
    ParamNotWritable { name: String },
    #[error("parameter \"{name}\" has type {actual}, expected {expected}")]
    WrongType {
        name: String,
        expected: ParamType,
        actual: ParamType,
    },
    #[error("value for \"{name}\" is out of range: {msg}")]
    OutOfRange { name: String, msg: String },
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory { size: usize },
    #[error("invalid buffer {0}")]
    InvalidBuffer(BufferId),
    #[error("file not found: {}", path.display())]
    FileNotFound { path: std::path::PathBuf },
    #[error("wrong configuration: {0}")]
    WrongConfiguration(String),
    #[error("IpxCamError({msg})")]
    IpxCamError { msg: String },
    #[error("BackendError({0})")]
    BackendError(#[from] anyhow::Error),
    #[error("io error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

fn _test_error_is_send() {
    // Compile-time test to ensure Error implements Send trait.
    fn implements<T: Send + Sync>() {}
    implements::<Error>();
}

impl<'a> From<&'a str> for Error {
    fn from(orig: &'a str) -> Error {
        Error::IpxCamError {
            msg: orig.to_string(),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Error {
        Error::IpxCamError { msg }
    }
}

impl Error {
    /// The numeric status code corresponding to this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Timeout => ErrorCode::GC_TIMEOUT,
            Error::Aborted => ErrorCode::GC_ABORT,
            Error::InvalidState(_) => ErrorCode::INVALID_STATE,
            Error::NoDevice => ErrorCode::NO_DEVICE,
            Error::AccessDenied { .. } | Error::IpSubnetMismatch => ErrorCode::GC_ACCESS_DENIED,
            Error::StaleDeviceInfo => ErrorCode::GC_INVALID_HANDLE,
            Error::InvalidIndex { .. } => ErrorCode::INVALID_INDEX,
            Error::InvalidArgument(_) => ErrorCode::INVALID_ARGUMENT,
            Error::UnknownParam { .. } => ErrorCode::GENICAM_UNKNOWN_PARAM,
            Error::ParamNotAvailable { .. }
            | Error::ParamNotReadable { .. }
            | Error::ParamNotWritable { .. } => ErrorCode::GENICAM_ACCESS,
            Error::WrongType { .. } => ErrorCode::GENICAM_TYPE,
            Error::OutOfRange { .. } => ErrorCode::GENICAM_OUT_OF_RANGE,
            Error::OutOfMemory { .. } => ErrorCode::GC_OUT_OF_MEMORY,
            Error::InvalidBuffer(_) => ErrorCode::GC_INVALID_BUFFER,
            Error::FileNotFound { .. } => ErrorCode::FILE_NOT_FOUND,
            Error::WrongConfiguration(_) => ErrorCode::WRONG_CONFIGURATION,
            Error::IoError { .. } => ErrorCode::FILE_READ,
            Error::IpxCamError { .. } | Error::BackendError(_) => ErrorCode::UNKNOWN,
        }
    }

    /// Returns true for errors a caller may retry after re-enumerating.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout | Error::Aborted)
    }
}

// ---------------------------
// timeouts

/// Wait limit for blocking stream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until a buffer arrives or the wait is cancelled.
    Infinite,
    After(Duration),
}

impl Timeout {
    /// Interpret a millisecond count where `u64::MAX` means infinite.
    pub fn from_millis(ms: u64) -> Self {
        if ms == u64::MAX {
            Timeout::Infinite
        } else {
            Timeout::After(Duration::from_millis(ms))
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Timeout::Infinite => None,
            Timeout::After(d) => Some(*d),
        }
    }
}

// ---------------------------
// DeviceInfo

/// GigE Vision network configuration of a device.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NetworkInfo {
    pub ip: std::net::Ipv4Addr,
    pub mask: std::net::Ipv4Addr,
    pub gateway: std::net::Ipv4Addr,
    pub mac: String,
}

impl NetworkInfo {
    /// Returns true if `ip` lies in the same subnet as `other` under `mask`.
    pub fn same_subnet(ip: u32, other: u32, mask: u32) -> bool {
        ip & mask == other & mask
    }
}

/// Read-only snapshot describing a discoverable device.
///
/// A snapshot belongs to the enumeration that produced it. Once its interface
/// re-enumerates, the snapshot is stale and interfaces reject it with
/// [Error::StaleDeviceInfo].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DeviceInfo {
    pub vendor: String,
    pub model: String,
    pub serial: String,
    pub display_name: String,
    pub unique_id: String,
    pub user_defined_name: String,
    pub version: String,
    pub interface_type: InterfaceType,
    pub access_status: AccessStatus,
    pub network: Option<NetworkInfo>,
    /// Id of the interface which enumerated this device.
    pub interface_id: String,
    /// Enumeration generation of the interface at snapshot time.
    pub generation: u64,
}

impl DeviceInfo {
    /// Returns true if `needle` equals the display name, serial or unique id.
    pub fn matches_name(&self, needle: &str) -> bool {
        self.display_name == needle || self.serial == needle || self.unique_id == needle
    }
}

// ---------------------------
// System and Interface

/// Process-wide entry point.
pub trait System {
    type Interface: Interface;

    fn interfaces(&self) -> Result<SnapshotList<Self::Interface>>;
}

/// A physical transport to which devices are attached.
pub trait Interface: Send + Sync {
    type Params: ParamTree;
    type Device: Device;

    fn id(&self) -> &str;
    fn description(&self) -> &str;
    fn interface_type(&self) -> InterfaceType;
    /// Transport layer parameters of the interface.
    fn parameters(&self) -> &Self::Params;

    /// Look for attached devices. Returns true if the device list changed.
    ///
    /// Every [DeviceInfo] previously obtained from this interface becomes
    /// stale.
    fn re_enumerate_devices(&self, timeout: Duration) -> Result<bool>;
    fn device_info_list(&self) -> Result<SnapshotList<DeviceInfo>>;

    /// Assign a temporary IP configuration to a GigE Vision device.
    ///
    /// Addresses are host-order `u32` values.
    fn force_ip(&self, info: &DeviceInfo, ip: u32, mask: u32, gateway: u32) -> Result<()>;

    /// Open the device described by `info`.
    ///
    /// Fails fast with [Error::IpSubnetMismatch] when the device must first be
    /// moved with [Interface::force_ip].
    fn create_device(&self, info: &DeviceInfo, access: DeviceAccess) -> Result<Self::Device>;
}

// ---------------------------
// Device

/// An open camera connection. Closed on drop.
pub trait Device: Send {
    type Params: ParamTree;
    type Stream: Stream;

    fn info(&self) -> &DeviceInfo;
    fn access(&self) -> DeviceAccess;
    fn camera_parameters(&self) -> &Self::Params;
    fn transport_parameters(&self) -> &Self::Params;

    fn num_streams(&self) -> usize;
    /// Stream `index`. The stream is shared so that it can be cancelled from
    /// a thread other than the one waiting on it.
    fn stream(&self, index: usize) -> Result<Arc<Self::Stream>>;

    fn is_connected(&self) -> bool;
    fn events(&self) -> &ObserverRegistry;

    /// Write the camera parameters to `path`.
    fn save_configuration(&self, path: &std::path::Path) -> Result<()>;
    /// Restore camera parameters previously saved with
    /// [Device::save_configuration].
    fn load_configuration(&self, path: &std::path::Path) -> Result<()>;
}

// ---------------------------
// Stream

/// Counters reported by a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StreamInfo {
    pub delivered: u64,
    pub underrun: u64,
    pub announced: usize,
    pub queued: usize,
    pub await_delivery: usize,
    pub started: bool,
}

/// Failure of [Stream::get_buffer].
///
/// The engine may hand out a buffer even on failure. In that case the caller
/// owns it and must queue it again.
#[derive(Debug)]
pub struct FetchError {
    pub error: Error,
    pub buffer: Option<Buffer>,
}

impl From<Error> for FetchError {
    fn from(error: Error) -> Self {
        FetchError {
            error,
            buffer: None,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.buffer {
            Some(b) => write!(f, "{} (buffer {})", self.error, b.id()),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// The acquisition engine of a device.
///
/// Buffers are announced with [Stream::create_buffer] and live inside the
/// stream until revoked. While acquiring, filled buffers are moved out by
/// [Stream::get_buffer] and must be moved back with [Stream::queue_buffer].
pub trait Stream: Send + Sync {
    /// Payload size of one frame in bytes.
    fn buffer_size(&self) -> Result<usize>;
    fn min_num_buffers(&self) -> Result<usize>;
    fn buffer_alignment(&self) -> usize;

    /// Announce a new buffer of `size` bytes.
    fn create_buffer(&self, size: usize) -> Result<BufferId>;
    /// Remove an announced buffer. The buffer must not be queued.
    fn revoke_buffer(&self, id: BufferId) -> Result<()>;

    /// Hand a delivered buffer back to the engine.
    fn queue_buffer(&self, buffer: Buffer) -> Result<()>;
    /// Wait for the next filled buffer.
    ///
    /// This is the only blocking call. A concurrent [Stream::cancel_buffer]
    /// makes it return [Error::Aborted].
    fn get_buffer(&self, timeout: Timeout) -> std::result::Result<Buffer, FetchError>;
    /// Abort a pending or the next [Stream::get_buffer] call.
    fn cancel_buffer(&self) -> Result<()>;
    fn flush_buffers(&self, op: FlushOperation) -> Result<()>;

    /// Start the engine. Announced buffers not yet queued are queued.
    ///
    /// With `num_frames` set, the engine stops filling after that many frames.
    fn start_acquisition(&self, num_frames: Option<u64>) -> Result<()>;
    fn stop_acquisition(&self) -> Result<()>;
    fn is_grabbing(&self) -> bool;

    fn info(&self) -> StreamInfo;

    fn num_delivered(&self) -> u64 {
        self.info().delivered
    }
    fn num_underrun(&self) -> u64 {
        self.info().underrun
    }
    fn num_announced(&self) -> usize {
        self.info().announced
    }
    fn num_queued(&self) -> usize {
        self.info().queued
    }
    fn num_await_delivery(&self) -> usize {
        self.info().await_delivery
    }
}
