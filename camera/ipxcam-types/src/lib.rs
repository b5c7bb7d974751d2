#![no_std]
extern crate core as std;

use serde::{Deserialize, Serialize};

macro_rules! display_as_debug {
    ($($t:ty),*) => {
        $(
            // use Debug to impl Display
            impl std::fmt::Display for $t {
                fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::result::Result<(), std::fmt::Error> {
                    std::fmt::Debug::fmt(self, fmt)
                }
            }
        )*
    };
}

display_as_debug!(
    InterfaceType,
    AccessStatus,
    DeviceAccess,
    FlushOperation,
    ParamType,
    Visibility,
    EventKind,
    TriggerMode
);

/// The physical transport behind an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum InterfaceType {
    Usb3Vision,
    GigEVision,
    CameraLink,
    CoaXPress,
    HdSdi,
}

/// Numeric code matching every interface type when used as a filter.
pub const INTERFACE_TYPE_ALL: u32 = 0xff;

impl InterfaceType {
    pub const ALL: &'static [Self] = &[
        Self::Usb3Vision,
        Self::GigEVision,
        Self::CameraLink,
        Self::CoaXPress,
        Self::HdSdi,
    ];

    pub const fn code(&self) -> u32 {
        match self {
            Self::Usb3Vision => 1,
            Self::GigEVision => 2,
            Self::CameraLink => 3,
            Self::CoaXPress => 4,
            Self::HdSdi => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Returns true if `self` passes the numeric filter `code`.
    ///
    /// [INTERFACE_TYPE_ALL] matches every interface type.
    pub fn matches_code(&self, code: u32) -> bool {
        code == INTERFACE_TYPE_ALL || code == self.code()
    }
}

/// How a discovered device may currently be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessStatus {
    Unknown,
    ReadWrite,
    ReadOnly,
    NoAccess,
    /// The device sits in a different IP subnet than the host interface.
    ///
    /// It must be moved with a forced IP before it can be opened.
    IpSubnetMismatch,
}

impl AccessStatus {
    pub const fn code(&self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::ReadWrite => 1,
            Self::ReadOnly => 2,
            Self::NoAccess => 3,
            Self::IpSubnetMismatch => 1001,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Unknown,
            1 => Self::ReadWrite,
            2 => Self::ReadOnly,
            3 => Self::NoAccess,
            1001 => Self::IpSubnetMismatch,
            _ => return None,
        })
    }

    /// Returns true if a device with this status can be opened with `access`.
    pub fn permits(&self, access: DeviceAccess) -> bool {
        match self {
            Self::ReadWrite => true,
            Self::ReadOnly => access == DeviceAccess::ReadOnly,
            Self::Unknown | Self::NoAccess | Self::IpSubnetMismatch => false,
        }
    }
}

impl Default for AccessStatus {
    fn default() -> Self {
        AccessStatus::Unknown
    }
}

/// Access level requested when opening a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceAccess {
    ReadOnly,
    Control,
    Exclusive,
}

impl DeviceAccess {
    pub const fn code(&self) -> u32 {
        match self {
            Self::ReadOnly => 0,
            Self::Control => 1,
            Self::Exclusive => 2,
        }
    }

    pub const fn is_writable(&self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

impl Default for DeviceAccess {
    fn default() -> Self {
        DeviceAccess::Control
    }
}

/// Buffer queue flush operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlushOperation {
    /// Discard delivered buffers that were not yet fetched.
    OutputDiscard,
    /// Move every announced buffer to the input queue.
    AllToInput,
    /// Move announced buffers that are in neither queue to the input queue.
    UnqueuedToInput,
    /// Empty both queues. Buffers stay announced.
    AllDiscard,
}

impl FlushOperation {
    pub const fn code(&self) -> u32 {
        match self {
            Self::OutputDiscard => 1,
            Self::AllToInput => 2,
            Self::UnqueuedToInput => 3,
            Self::AllDiscard => 4,
        }
    }
}

/// Discriminant of a GenICam parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Unknown,
    Int,
    Float,
    String,
    Enum,
    EnumEntry,
    Boolean,
    Command,
    Category,
}

/// GenICam feature visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Beginner,
    Expert,
    Guru,
    Invisible,
    Undefined,
}

impl Visibility {
    pub const fn code(&self) -> u32 {
        match self {
            Self::Beginner => 0,
            Self::Expert => 1,
            Self::Guru => 2,
            Self::Invisible => 3,
            Self::Undefined => 99,
        }
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Beginner
    }
}

/// Kinds of asynchronous device event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    GenICamEvent,
    CameraConnected,
    CameraDisconnected,
}

impl EventKind {
    pub const fn code(&self) -> u32 {
        match self {
            Self::GenICamEvent => 1002,
            Self::CameraConnected => 1003,
            Self::CameraDisconnected => 1004,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1002 => Self::GenICamEvent,
            1003 => Self::CameraConnected,
            1004 => Self::CameraDisconnected,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    Off,
    On,
}

impl TriggerMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::On => "On",
        }
    }
}
