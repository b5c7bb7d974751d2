//! A simulated camera backend.
//!
//! [SimSystem] implements the [ipxcam] object model entirely in process. It is
//! used for tests and for running the command line tool without hardware.
//! Cameras are described by [SimCameraSpec]. Each camera can produce frames
//! in free-run mode at its configured frame rate or replay a scripted list of
//! frames, and failures can be injected with [Faults].

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ipxcam::{
    DeviceEvent, DeviceInfo, Error, GevEvent, NetworkInfo, ObserverRegistry, ParamTree, Result,
    SnapshotList, pfnc,
};
use ipxcam_types::{AccessStatus, DeviceAccess, EventKind, InterfaceType};

pub mod nodemap;
mod settings;
mod stream;

pub use nodemap::{NodeMap, SimParams};
pub use settings::SettingsFile;
pub use stream::SimStream;

/// The file extension for saved camera settings.
pub const SETTINGS_FILE_EXTENSION: &str = "ipxsettings";

// ---------------------------
// fault injection

/// A failure which can be injected into a simulated camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Setting `TLParamsLocked` to 1 fails.
    Lock,
    /// `Stream::start_acquisition` fails.
    StreamStart,
    /// The `AcquisitionStart` command fails.
    AcquisitionStart,
    /// The `AcquisitionStop` command fails.
    AcquisitionStop,
    /// The `AcquisitionAbort` command fails.
    AcquisitionAbort,
}

/// Failures currently injected into one camera.
#[derive(Debug, Default)]
pub struct Faults {
    active: Mutex<HashSet<Fault>>,
    alloc_limit: Mutex<Option<usize>>,
}

impl Faults {
    pub fn set(&self, fault: Fault, active: bool) {
        let mut set = self.active.lock();
        if active {
            set.insert(fault);
        } else {
            set.remove(&fault);
        }
    }

    pub fn is_set(&self, fault: Fault) -> bool {
        self.active.lock().contains(&fault)
    }

    /// Make buffer allocation fail once `limit` buffers are announced.
    pub fn set_alloc_limit(&self, limit: Option<usize>) {
        *self.alloc_limit.lock() = limit;
    }

    pub fn alloc_limit(&self) -> Option<usize> {
        *self.alloc_limit.lock()
    }

    pub fn clear(&self) {
        self.active.lock().clear();
        *self.alloc_limit.lock() = None;
    }
}

// ---------------------------
// camera description

/// One frame of a scripted acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedFrame {
    pub frame_id: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub incomplete: bool,
    /// Deliver the frame together with a transfer error.
    #[serde(default)]
    pub error: bool,
}

impl ScriptedFrame {
    pub fn new(frame_id: u64, timestamp: u64) -> Self {
        Self {
            frame_id,
            timestamp,
            incomplete: false,
            error: false,
        }
    }
}

fn default_vendor() -> String {
    "Imperx".to_string()
}

fn default_model() -> String {
    "SIM-0001".to_string()
}

fn default_interface_type() -> InterfaceType {
    InterfaceType::GigEVision
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_pixel_format() -> String {
    "Mono8".to_string()
}

fn default_frame_rate() -> f64 {
    30.0
}

fn default_access_status() -> AccessStatus {
    AccessStatus::ReadWrite
}

fn default_min_num_buffers() -> usize {
    4
}

/// Description of a simulated camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimCameraSpec {
    pub serial: String,
    #[serde(default = "default_vendor")]
    pub vendor: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_interface_type")]
    pub interface_type: InterfaceType,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// PFNC pixel format name, e.g. `Mono8` or `BayerRG8`.
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    /// Frames per second in free-run mode.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    /// Access status reported when the camera is reachable and not open.
    #[serde(default = "default_access_status")]
    pub access_status: AccessStatus,
    /// IP address of a GigE Vision camera. Defaults to an address inside the
    /// interface subnet.
    #[serde(default)]
    pub ip: Option<Ipv4Addr>,
    #[serde(default = "default_min_num_buffers")]
    pub min_num_buffers: usize,
    /// Replay these frames instead of free-running.
    #[serde(default)]
    pub frames: Option<Vec<ScriptedFrame>>,
}

impl SimCameraSpec {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            vendor: default_vendor(),
            model: default_model(),
            interface_type: default_interface_type(),
            width: default_width(),
            height: default_height(),
            pixel_format: default_pixel_format(),
            frame_rate: default_frame_rate(),
            access_status: default_access_status(),
            ip: None,
            min_num_buffers: default_min_num_buffers(),
            frames: None,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {} ({})", self.vendor, self.model, self.serial)
    }
}

// ---------------------------
// cameras

/// Interface subnet used for simulated GigE Vision interfaces.
const GEV_SUBNET: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
const GEV_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

struct Link {
    ip: Ipv4Addr,
    mask: Ipv4Addr,
    gateway: Ipv4Addr,
    connected: bool,
    /// Access level of the connection currently controlling the camera.
    controller: Option<DeviceAccess>,
    readers: usize,
}

/// A physical simulated camera. Outlives the connections made to it.
struct SimCamera {
    spec: SimCameraSpec,
    index: usize,
    params: Arc<NodeMap>,
    faults: Arc<Faults>,
    events: Arc<ObserverRegistry>,
    link: Mutex<Link>,
}

impl SimCamera {
    fn new(spec: SimCameraSpec, index: usize) -> Result<Self> {
        let pixel_format = pfnc::from_name(&spec.pixel_format).ok_or_else(|| {
            Error::WrongConfiguration(format!("unknown pixel format \"{}\"", spec.pixel_format))
        })?;
        if spec.width == 0 || spec.height == 0 {
            return Err(Error::WrongConfiguration(format!(
                "camera {} has an empty sensor",
                spec.serial
            )));
        }
        let faults = Arc::new(Faults::default());
        let params = Arc::new(NodeMap::camera(
            &nodemap::CameraDescription {
                vendor: &spec.vendor,
                model: &spec.model,
                serial: &spec.serial,
                width: spec.width,
                height: spec.height,
                pixel_format,
                frame_rate: spec.frame_rate,
            },
            faults.clone(),
        ));
        let host = u32::from(GEV_SUBNET) & u32::from(GEV_MASK);
        let default_ip = Ipv4Addr::from(host + 10 + index as u32);
        let link = Link {
            ip: spec.ip.unwrap_or(default_ip),
            mask: GEV_MASK,
            gateway: Ipv4Addr::UNSPECIFIED,
            connected: true,
            controller: None,
            readers: 0,
        };
        Ok(Self {
            spec,
            index,
            params,
            faults,
            events: Arc::new(ObserverRegistry::new()),
            link: Mutex::new(link),
        })
    }

    fn is_gige(&self) -> bool {
        self.spec.interface_type == InterfaceType::GigEVision
    }

    fn access_status(&self, link: &Link) -> AccessStatus {
        if self.is_gige()
            && !NetworkInfo::same_subnet(
                u32::from(link.ip),
                u32::from(GEV_SUBNET),
                u32::from(GEV_MASK),
            )
        {
            return AccessStatus::IpSubnetMismatch;
        }
        match link.controller {
            Some(DeviceAccess::Exclusive) => AccessStatus::NoAccess,
            Some(_) => AccessStatus::ReadOnly,
            None => self.spec.access_status,
        }
    }

    fn snapshot(&self, interface_id: &str, generation: u64) -> DeviceInfo {
        let link = self.link.lock();
        let network = if self.is_gige() {
            Some(NetworkInfo {
                ip: link.ip,
                mask: link.mask,
                gateway: link.gateway,
                mac: format!("00:11:1c:00:00:{:02x}", self.index),
            })
        } else {
            None
        };
        DeviceInfo {
            vendor: self.spec.vendor.clone(),
            model: self.spec.model.clone(),
            serial: self.spec.serial.clone(),
            display_name: self.spec.display_name(),
            unique_id: format!("{}-{}", interface_id, self.spec.serial),
            user_defined_name: self
                .params
                .string_value("DeviceUserID")
                .unwrap_or_default(),
            version: "sim-1.0".to_string(),
            interface_type: self.spec.interface_type,
            access_status: self.access_status(&link),
            network,
            interface_id: interface_id.to_string(),
            generation,
        }
    }

    fn emit(&self, kind: EventKind, event_id: u16, timestamp: u64) {
        let data = GevEvent {
            event_id,
            timestamp,
        }
        .to_packet(&[]);
        self.events.notify_event(&DeviceEvent {
            kind,
            event_id,
            timestamp,
            data,
        });
    }
}

// ---------------------------
// SimSystem

/// Entry point of the simulated backend.
pub struct SimSystem {
    interfaces: Vec<SimInterface>,
}

impl SimSystem {
    /// Build a system with one interface per transport used by `cameras`.
    pub fn new(cameras: Vec<SimCameraSpec>) -> Result<Self> {
        let mut interfaces: Vec<SimInterface> = Vec::new();
        for (index, spec) in cameras.into_iter().enumerate() {
            let camera = Arc::new(SimCamera::new(spec, index)?);
            let kind = camera.spec.interface_type;
            match interfaces.iter_mut().find(|i| i.kind == kind) {
                Some(iface) => iface.shared.state.lock().cameras.push(camera),
                None => {
                    let iface = SimInterface::new(kind, interfaces.len());
                    iface.shared.state.lock().cameras.push(camera);
                    interfaces.push(iface);
                }
            }
        }
        info!("simulated system with {} interfaces", interfaces.len());
        Ok(Self { interfaces })
    }

    /// Injected failures of the camera with serial number `serial`.
    pub fn faults(&self, serial: &str) -> Option<Arc<Faults>> {
        self.find_camera(serial).map(|c| c.faults.clone())
    }

    /// The parameter tree of camera `serial`, bypassing any connection.
    pub fn node_map(&self, serial: &str) -> Option<Arc<NodeMap>> {
        self.find_camera(serial).map(|c| c.params.clone())
    }

    /// Unplug or replug camera `serial`.
    pub fn set_connected(&self, serial: &str, connected: bool) -> Result<()> {
        let camera = self.find_camera(serial).ok_or(Error::NoDevice)?;
        let changed = {
            let mut link = camera.link.lock();
            std::mem::replace(&mut link.connected, connected) != connected
        };
        if changed {
            if connected {
                info!("camera {serial} connected");
                camera.emit(EventKind::CameraConnected, 0, 0);
            } else {
                warn!("camera {serial} disconnected");
                camera.params.set_acquiring(false);
                camera.emit(EventKind::CameraDisconnected, 0, 0);
            }
        }
        Ok(())
    }

    fn find_camera(&self, serial: &str) -> Option<Arc<SimCamera>> {
        self.interfaces.iter().find_map(|i| {
            i.shared
                .state
                .lock()
                .cameras
                .iter()
                .find(|c| c.spec.serial == serial)
                .cloned()
        })
    }
}

impl ipxcam::System for SimSystem {
    type Interface = SimInterface;

    fn interfaces(&self) -> Result<SnapshotList<SimInterface>> {
        Ok(self.interfaces.iter().cloned().collect())
    }
}

// ---------------------------
// SimInterface

struct InterfaceState {
    generation: u64,
    cameras: Vec<Arc<SimCamera>>,
    /// Visible devices at the last enumeration, for change detection.
    last_seen: Vec<(String, AccessStatus, Ipv4Addr)>,
}

struct InterfaceShared {
    state: Mutex<InterfaceState>,
    params: SimParams,
}

/// A simulated transport. Cheap to clone.
#[derive(Clone)]
pub struct SimInterface {
    id: String,
    description: String,
    kind: InterfaceType,
    shared: Arc<InterfaceShared>,
}

impl SimInterface {
    fn new(kind: InterfaceType, index: usize) -> Self {
        let id = format!("sim-{}-{index}", format!("{kind:?}").to_lowercase());
        let subnet = (kind == InterfaceType::GigEVision)
            .then(|| (u32::from(GEV_SUBNET), u32::from(GEV_MASK)));
        let params = SimParams::new(Arc::new(NodeMap::interface(&id, subnet)), true);
        Self {
            description: format!("Simulated {kind:?} interface {index}"),
            id,
            kind,
            shared: Arc::new(InterfaceShared {
                state: Mutex::new(InterfaceState {
                    generation: 1,
                    cameras: Vec::new(),
                    last_seen: Vec::new(),
                }),
                params,
            }),
        }
    }

    fn visible(state: &InterfaceState) -> Vec<(String, AccessStatus, Ipv4Addr)> {
        state
            .cameras
            .iter()
            .filter_map(|c| {
                let link = c.link.lock();
                link.connected
                    .then(|| (c.spec.serial.clone(), c.access_status(&link), link.ip))
            })
            .collect()
    }

    /// Find the camera behind `info`, checking the snapshot is current.
    fn resolve(&self, info: &DeviceInfo) -> Result<Arc<SimCamera>> {
        let state = self.shared.state.lock();
        if info.interface_id != self.id || info.generation != state.generation {
            return Err(Error::StaleDeviceInfo);
        }
        state
            .cameras
            .iter()
            .find(|c| c.spec.serial == info.serial)
            .cloned()
            .ok_or(Error::NoDevice)
    }
}

impl ipxcam::Interface for SimInterface {
    type Params = SimParams;
    type Device = SimDevice;

    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn interface_type(&self) -> InterfaceType {
        self.kind
    }

    fn parameters(&self) -> &SimParams {
        &self.shared.params
    }

    fn re_enumerate_devices(&self, timeout: Duration) -> Result<bool> {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        let seen = Self::visible(&state);
        let changed = seen != state.last_seen;
        state.last_seen = seen;
        debug!(
            "{} re-enumerated (timeout {:?}), generation {}, changed: {changed}",
            self.id, timeout, state.generation
        );
        Ok(changed)
    }

    fn device_info_list(&self) -> Result<SnapshotList<DeviceInfo>> {
        let state = self.shared.state.lock();
        Ok(state
            .cameras
            .iter()
            .filter(|c| c.link.lock().connected)
            .map(|c| c.snapshot(&self.id, state.generation))
            .collect())
    }

    fn force_ip(&self, info: &DeviceInfo, ip: u32, mask: u32, gateway: u32) -> Result<()> {
        if self.kind != InterfaceType::GigEVision {
            return Err(Error::WrongConfiguration(format!(
                "force IP is not supported on {} interfaces",
                self.kind
            )));
        }
        let camera = self.resolve(info)?;
        let mut link = camera.link.lock();
        if link.controller.is_some() || link.readers > 0 {
            return Err(Error::InvalidState(format!(
                "camera {} is open",
                info.serial
            )));
        }
        link.ip = Ipv4Addr::from(ip);
        link.mask = Ipv4Addr::from(mask);
        link.gateway = Ipv4Addr::from(gateway);
        info!("camera {} forced to {}", info.serial, link.ip);
        Ok(())
    }

    fn create_device(&self, info: &DeviceInfo, access: DeviceAccess) -> Result<SimDevice> {
        let camera = self.resolve(info)?;
        let info = {
            let mut link = camera.link.lock();
            if !link.connected {
                return Err(Error::NoDevice);
            }
            let status = camera.access_status(&link);
            if status == AccessStatus::IpSubnetMismatch {
                return Err(Error::IpSubnetMismatch);
            }
            if !status.permits(access) {
                return Err(Error::AccessDenied { status });
            }
            if access.is_writable() {
                link.controller = Some(access);
            } else {
                link.readers += 1;
            }
            drop(link);
            let mut info = info.clone();
            info.access_status = status;
            info
        };
        info!("opened {} with {access} access", info.display_name);
        let stream = Arc::new(SimStream::new(
            &info.serial,
            camera.params.clone(),
            camera.faults.clone(),
            camera.spec.frames.clone(),
            camera.spec.min_num_buffers,
        ));
        Ok(SimDevice {
            camera_params: SimParams::new(camera.params.clone(), access.is_writable()),
            transport_params: SimParams::new(
                Arc::new(NodeMap::device_transport(&info, camera.faults.clone())),
                access.is_writable(),
            ),
            stream,
            info,
            access,
            camera,
        })
    }
}

// ---------------------------
// SimDevice

/// An open connection to a simulated camera. Closed on drop.
pub struct SimDevice {
    info: DeviceInfo,
    access: DeviceAccess,
    camera: Arc<SimCamera>,
    camera_params: SimParams,
    transport_params: SimParams,
    stream: Arc<SimStream>,
}

impl SimDevice {
    pub fn faults(&self) -> &Arc<Faults> {
        &self.camera.faults
    }

    /// Emit a GenICam event as the device would send it.
    pub fn emit_event(&self, event_id: u16, timestamp: u64) {
        self.camera
            .emit(EventKind::GenICamEvent, event_id, timestamp);
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.stream.shutdown();
        let mut link = self.camera.link.lock();
        if self.access.is_writable() {
            link.controller = None;
        } else {
            link.readers = link.readers.saturating_sub(1);
        }
        debug!("closed {}", self.info.display_name);
    }
}

impl ipxcam::Device for SimDevice {
    type Params = SimParams;
    type Stream = SimStream;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn access(&self) -> DeviceAccess {
        self.access
    }

    fn camera_parameters(&self) -> &SimParams {
        &self.camera_params
    }

    fn transport_parameters(&self) -> &SimParams {
        &self.transport_params
    }

    fn num_streams(&self) -> usize {
        1
    }

    fn stream(&self, index: usize) -> Result<Arc<SimStream>> {
        if index == 0 {
            Ok(self.stream.clone())
        } else {
            Err(Error::InvalidIndex { index })
        }
    }

    fn is_connected(&self) -> bool {
        self.camera.link.lock().connected
    }

    fn events(&self) -> &ObserverRegistry {
        &self.camera.events
    }

    fn save_configuration(&self, path: &Path) -> Result<()> {
        let headers = vec![
            "# ipxcam camera settings".to_string(),
            format!("# {}\t{}", self.info.model, self.info.serial),
        ];
        let settings = self.camera.params.save_settings(headers);
        std::fs::write(path, settings.to_string())?;
        info!("saved configuration to {}", path.display());
        Ok(())
    }

    fn load_configuration(&self, path: &Path) -> Result<()> {
        if !self.access.is_writable() {
            return Err(Error::AccessDenied {
                status: AccessStatus::ReadOnly,
            });
        }
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let settings = SettingsFile::parse(&contents)?;
        self.camera.params.load_settings(&settings)?;
        info!("loaded configuration from {}", path.display());
        Ok(())
    }
}
