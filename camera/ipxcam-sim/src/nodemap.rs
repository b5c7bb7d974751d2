//! In-memory GenICam parameter trees.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use ipxcam::{
    pfnc, EnumEntry, Error, ObserverRegistry, Param, ParamKind, ParamTree, ParamWrite, Result,
};
use ipxcam_types::{ParamType, Visibility};

use crate::settings::{float_to_str, SettingsFile};
use crate::{Fault, Faults};

pub const TL_PARAMS_LOCKED: &str = "TLParamsLocked";
pub const PAYLOAD_SIZE: &str = "PayloadSize";
pub const TICK_FREQUENCY: &str = "GevTimestampTickFrequency";

/// Parameters which cannot change while [TL_PARAMS_LOCKED] is set.
const LOCKED_WHILE_STREAMING: &[&str] = &["Width", "Height", "OffsetX", "OffsetY", "PixelFormat"];

struct Node {
    param: Param,
}

/// A parameter tree held in memory.
pub struct NodeMap {
    nodes: Mutex<Vec<Node>>,
    observers: ObserverRegistry,
    faults: Arc<Faults>,
    acquiring: AtomicBool,
    command_log: Mutex<Vec<String>>,
}

fn int(name: &str, value: i64, min: i64, max: i64, inc: i64) -> Param {
    Param::new(
        name,
        ParamKind::Int {
            value,
            min,
            max,
            inc,
        },
    )
}

fn float(name: &str, value: f64, min: f64, max: f64, unit: &str) -> Param {
    Param::new(
        name,
        ParamKind::Float {
            value,
            min,
            max,
            unit: unit.to_string(),
        },
    )
}

fn string(name: &str, value: &str, writable: bool) -> Param {
    let mut p = Param::new(
        name,
        ParamKind::String {
            value: value.to_string(),
            max_len: 64,
        },
    );
    p.writable = writable;
    p
}

fn enumeration(name: &str, value: i64, entries: &[(&str, i64)]) -> Param {
    Param::new(
        name,
        ParamKind::Enum {
            value,
            entries: entries
                .iter()
                .map(|(name, value)| EnumEntry {
                    name: name.to_string(),
                    value: *value,
                    available: true,
                })
                .collect(),
        },
    )
}

fn boolean(name: &str, value: bool) -> Param {
    Param::new(name, ParamKind::Boolean { value })
}

fn command(name: &str) -> Param {
    Param::new(name, ParamKind::Command { done: true })
}

fn category(name: &str, children: &[&str]) -> Param {
    let mut p = Param::new(
        name,
        ParamKind::Category {
            children: children.iter().map(|c| c.to_string()).collect(),
        },
    );
    p.writable = false;
    p
}

fn read_only(mut p: Param) -> Param {
    p.writable = false;
    p
}

fn with_visibility(mut p: Param, visibility: Visibility) -> Param {
    p.visibility = visibility;
    p
}

/// Identity and geometry used to populate a camera parameter tree.
pub(crate) struct CameraDescription<'a> {
    pub vendor: &'a str,
    pub model: &'a str,
    pub serial: &'a str,
    pub width: u32,
    pub height: u32,
    pub pixel_format: u32,
    pub frame_rate: f64,
}

pub(crate) fn payload_size(width: i64, height: i64, pixel_format: u32) -> i64 {
    width * height * i64::from(pfnc::bits_per_pixel(pixel_format)) / 8
}

impl NodeMap {
    pub(crate) fn from_params(params: Vec<Param>, faults: Arc<Faults>) -> Self {
        Self {
            nodes: Mutex::new(params.into_iter().map(|param| Node { param }).collect()),
            observers: ObserverRegistry::new(),
            faults,
            acquiring: AtomicBool::new(false),
            command_log: Mutex::new(Vec::new()),
        }
    }

    /// The standard feature set of a simulated area scan camera.
    pub(crate) fn camera(desc: &CameraDescription, faults: Arc<Faults>) -> Self {
        let pixel_formats: Vec<(&str, i64)> = pfnc::ALL
            .iter()
            .filter_map(|code| pfnc::name(*code).map(|name| (name, i64::from(*code))))
            .collect();
        let (w, h) = (i64::from(desc.width), i64::from(desc.height));
        let params = vec![
            category(
                "Root",
                &[
                    "DeviceControl",
                    "ImageFormatControl",
                    "AcquisitionControl",
                    "PulseGenerator",
                    "DigitalIOControl",
                    "TransportLayerControl",
                ],
            ),
            category(
                "DeviceControl",
                &[
                    "DeviceVendorName",
                    "DeviceModelName",
                    "DeviceSerialNumber",
                    "DeviceUserID",
                ],
            ),
            string("DeviceVendorName", desc.vendor, false),
            string("DeviceModelName", desc.model, false),
            string("DeviceSerialNumber", desc.serial, false),
            string("DeviceUserID", "", true),
            category(
                "ImageFormatControl",
                &["Width", "Height", "OffsetX", "OffsetY", "PixelFormat"],
            ),
            int("Width", w, 1, w, 1),
            int("Height", h, 1, h, 1),
            int("OffsetX", 0, 0, w - 1, 1),
            int("OffsetY", 0, 0, h - 1, 1),
            enumeration("PixelFormat", i64::from(desc.pixel_format), &pixel_formats),
            category(
                "AcquisitionControl",
                &[
                    "AcquisitionMode",
                    "AcquisitionStart",
                    "AcquisitionStop",
                    "AcquisitionAbort",
                    "AcquisitionFrameRate",
                    "ExposureTime",
                    "Gain",
                    "TriggerMode",
                    "TriggerSource",
                    "TriggerSoftware",
                ],
            ),
            enumeration(
                "AcquisitionMode",
                0,
                &[("Continuous", 0), ("SingleFrame", 1), ("MultiFrame", 2)],
            ),
            command("AcquisitionStart"),
            command("AcquisitionStop"),
            command("AcquisitionAbort"),
            float("AcquisitionFrameRate", desc.frame_rate, 0.1, 10_000.0, "Hz"),
            float("ExposureTime", 10_000.0, 10.0, 10_000_000.0, "us"),
            float("Gain", 0.0, 0.0, 48.0, "dB"),
            enumeration("TriggerMode", 0, &[("Off", 0), ("On", 1)]),
            enumeration(
                "TriggerSource",
                0,
                &[
                    ("Line1", 0),
                    ("Line2", 1),
                    ("Software", 2),
                    ("PulseGenerator", 3),
                ],
            ),
            command("TriggerSoftware"),
            category(
                "PulseGenerator",
                &[
                    "PulseGenGranularity",
                    "PulseGenWidth",
                    "PulseGenPeriod",
                    "PulseGenMode",
                    "PulseGenEnable",
                ],
            ),
            enumeration(
                "PulseGenGranularity",
                0,
                &[("x1", 0), ("x10", 1), ("x100", 2), ("x1000", 3)],
            ),
            int("PulseGenWidth", 1000, 1, 1_048_575, 1),
            int("PulseGenPeriod", 33_333, 1, 1_048_575, 1),
            enumeration("PulseGenMode", 0, &[("Continuous", 0), ("Burst", 1)]),
            boolean("PulseGenEnable", false),
            category("DigitalIOControl", &["OUT1Selector", "OUT2Selector"]),
            enumeration(
                "OUT1Selector",
                0,
                &[
                    ("Disabled", 0),
                    ("ExposureActive", 1),
                    ("PulseGenerator", 2),
                ],
            ),
            enumeration(
                "OUT2Selector",
                0,
                &[
                    ("Disabled", 0),
                    ("ExposureActive", 1),
                    ("PulseGenerator", 2),
                ],
            ),
            category(
                "TransportLayerControl",
                &[PAYLOAD_SIZE, TICK_FREQUENCY, TL_PARAMS_LOCKED],
            ),
            read_only(int(
                PAYLOAD_SIZE,
                payload_size(w, h, desc.pixel_format),
                0,
                i64::MAX,
                1,
            )),
            read_only(int(
                TICK_FREQUENCY,
                1_000_000_000,
                1,
                i64::MAX,
                1,
            )),
            with_visibility(int(TL_PARAMS_LOCKED, 0, 0, 1, 1), Visibility::Invisible),
        ];
        Self::from_params(params, faults)
    }

    /// Transport layer parameters of a device connection.
    pub(crate) fn device_transport(
        info: &ipxcam::DeviceInfo,
        faults: Arc<Faults>,
    ) -> Self {
        let mut params = vec![
            string("DeviceID", &info.unique_id, false),
            string("DeviceVendorName", &info.vendor, false),
            string("DeviceModelName", &info.model, false),
            read_only(enumeration(
                "DeviceAccessStatus",
                i64::from(info.access_status.code()),
                &[
                    ("Unknown", 0),
                    ("ReadWrite", 1),
                    ("ReadOnly", 2),
                    ("NoAccess", 3),
                    ("IpSubnetMismatch", 1001),
                ],
            )),
        ];
        if let Some(net) = &info.network {
            params.push(read_only(int(
                "GevDeviceIPAddress",
                i64::from(u32::from(net.ip)),
                0,
                i64::from(u32::MAX),
                1,
            )));
            params.push(read_only(int(
                "GevDeviceSubnetMask",
                i64::from(u32::from(net.mask)),
                0,
                i64::from(u32::MAX),
                1,
            )));
        }
        Self::from_params(params, faults)
    }

    /// Transport layer parameters of an interface.
    pub(crate) fn interface(id: &str, subnet: Option<(u32, u32)>) -> Self {
        let mut params = vec![string("InterfaceID", id, false)];
        if let Some((ip, mask)) = subnet {
            params.push(int(
                "GevInterfaceSubnetIPAddress",
                i64::from(ip),
                0,
                i64::from(u32::MAX),
                1,
            ));
            params.push(int(
                "GevInterfaceSubnetMask",
                i64::from(mask),
                0,
                i64::from(u32::MAX),
                1,
            ));
        }
        Self::from_params(params, Arc::new(Faults::default()))
    }

    pub fn is_locked(&self) -> bool {
        self.int_value(TL_PARAMS_LOCKED).unwrap_or(0) != 0
    }

    /// True between `AcquisitionStart` and `AcquisitionStop`/`AcquisitionAbort`.
    pub fn is_acquiring(&self) -> bool {
        self.acquiring.load(Ordering::SeqCst)
    }

    pub(crate) fn set_acquiring(&self, value: bool) {
        self.acquiring.store(value, Ordering::SeqCst);
    }

    /// Names of every successfully executed command, in order.
    pub fn command_log(&self) -> Vec<String> {
        self.command_log.lock().clone()
    }

    pub fn clear_command_log(&self) {
        self.command_log.lock().clear();
    }

    fn with_node<R>(&self, name: &str, f: impl FnOnce(&mut Node) -> Result<R>) -> Result<R> {
        let mut nodes = self.nodes.lock();
        match nodes.iter_mut().find(|n| n.param.name == name) {
            Some(node) => f(node),
            None => Err(Error::UnknownParam {
                name: name.to_string(),
            }),
        }
    }

    fn recompute_payload(&self) {
        let size = (|| -> Result<i64> {
            let w = self.int_value("Width")?;
            let h = self.int_value("Height")?;
            let fmt = self.param("PixelFormat")?;
            let code = match fmt.kind {
                ParamKind::Enum { value, .. } => value as u32,
                _ => return Err("PixelFormat is not an enumeration".into()),
            };
            Ok(payload_size(w, h, code))
        })();
        match size {
            Ok(size) => {
                let updated = self.with_node(PAYLOAD_SIZE, |node| {
                    if let ParamKind::Int { value, .. } = &mut node.param.kind {
                        *value = size;
                    }
                    Ok(())
                });
                if let Err(e) = updated {
                    debug!("not updating {PAYLOAD_SIZE}: {e}");
                }
            }
            Err(e) => debug!("not updating {PAYLOAD_SIZE}: {e}"),
        }
    }

    /// Snapshot every writable value into a settings file.
    pub fn save_settings(&self, headers: Vec<String>) -> SettingsFile {
        let mut out = SettingsFile::new(headers);
        let nodes = self.nodes.lock();
        for node in nodes.iter() {
            let p = &node.param;
            if !p.writable || !p.available || p.name == TL_PARAMS_LOCKED {
                continue;
            }
            let value = match &p.kind {
                ParamKind::Int { value, .. } => value.to_string(),
                ParamKind::Float { value, .. } => float_to_str(*value),
                ParamKind::String { value, .. } => value.clone(),
                ParamKind::Enum { .. } => match p.enum_entry() {
                    Some(entry) => entry.to_string(),
                    None => continue,
                },
                ParamKind::Boolean { value } => format!("{}", *value as i8), // make '0' or '1'
                ParamKind::Command { .. } | ParamKind::Category { .. } => continue,
            };
            out.update(&p.name, value);
        }
        out
    }

    /// Apply a settings file. Unknown names are skipped with a warning.
    pub fn load_settings(&self, settings: &SettingsFile) -> Result<()> {
        for (name, value) in settings.nodes() {
            if !self.contains(name) {
                warn!("ignoring unknown setting \"{name}\"");
                continue;
            }
            self.set_from_str(name, value)?;
        }
        Ok(())
    }

    fn check_lock(&self, node: &Node, locked: bool) -> Result<()> {
        if locked && LOCKED_WHILE_STREAMING.contains(&node.param.name.as_str()) {
            return Err(Error::ParamNotWritable {
                name: node.param.name.clone(),
            });
        }
        Ok(())
    }
}

fn apply_write(param: &mut Param, value: ParamWrite) -> Result<()> {
    let name = param.name.clone();
    let out_of_range = |msg: String| Error::OutOfRange {
        name: name.clone(),
        msg,
    };
    let expected = match &value {
        ParamWrite::Int(_) => ParamType::Int,
        ParamWrite::Float(_) => ParamType::Float,
        ParamWrite::Str(_) => ParamType::String,
        ParamWrite::EnumName(_) | ParamWrite::EnumValue(_) => ParamType::Enum,
        ParamWrite::Bool(_) => ParamType::Boolean,
    };
    let actual = param.param_type();
    match (&mut param.kind, value) {
        (
            ParamKind::Int {
                value,
                min,
                max,
                inc,
            },
            ParamWrite::Int(v),
        ) => {
            if v < *min || v > *max {
                return Err(out_of_range(format!("{v} not in [{min}, {max}]")));
            }
            if *inc > 1 && (v - *min) % *inc != 0 {
                return Err(out_of_range(format!("{v} is not a multiple of {inc}")));
            }
            *value = v;
        }
        (ParamKind::Float { value, min, max, .. }, ParamWrite::Float(v)) => {
            if !(v >= *min && v <= *max) {
                return Err(out_of_range(format!("{v} not in [{min}, {max}]")));
            }
            *value = v;
        }
        (ParamKind::Float { value, min, max, .. }, ParamWrite::Int(v)) => {
            let v = v as f64;
            if !(v >= *min && v <= *max) {
                return Err(out_of_range(format!("{v} not in [{min}, {max}]")));
            }
            *value = v;
        }
        (ParamKind::String { value, max_len }, ParamWrite::Str(v)) => {
            if v.len() > *max_len {
                return Err(out_of_range(format!("longer than {max_len} bytes")));
            }
            *value = v;
        }
        (ParamKind::Enum { value, entries }, ParamWrite::EnumName(v)) => {
            match entries.iter().find(|e| e.name == v && e.available) {
                Some(e) => *value = e.value,
                None => {
                    return Err(Error::InvalidArgument(format!(
                        "\"{v}\" is not an entry of {name}"
                    )));
                }
            }
        }
        (ParamKind::Enum { value, entries }, ParamWrite::EnumValue(v)) => {
            if !entries.iter().any(|e| e.value == v && e.available) {
                return Err(Error::InvalidArgument(format!(
                    "{v} is not an entry of {name}"
                )));
            }
            *value = v;
        }
        (ParamKind::Boolean { value }, ParamWrite::Bool(v)) => {
            *value = v;
        }
        _ => {
            return Err(Error::WrongType {
                name,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

impl ParamTree for NodeMap {
    fn names(&self) -> Vec<String> {
        self.nodes
            .lock()
            .iter()
            .map(|n| n.param.name.clone())
            .collect()
    }

    fn param(&self, name: &str) -> Result<Param> {
        self.with_node(name, |node| {
            if !node.param.available {
                return Err(Error::ParamNotAvailable {
                    name: name.to_string(),
                });
            }
            if !node.param.readable {
                return Err(Error::ParamNotReadable {
                    name: name.to_string(),
                });
            }
            Ok(node.param.clone())
        })
    }

    fn write(&self, name: &str, value: ParamWrite) -> Result<()> {
        if name == TL_PARAMS_LOCKED
            && value == ParamWrite::Int(1)
            && self.faults.is_set(Fault::Lock)
        {
            return Err(Error::IpxCamError {
                msg: format!("injected failure writing {name}"),
            });
        }
        let locked = self.is_locked();
        let updated = self.with_node(name, |node| {
            if !node.param.available {
                return Err(Error::ParamNotAvailable {
                    name: name.to_string(),
                });
            }
            if !node.param.writable || matches!(node.param.kind, ParamKind::Category { .. }) {
                return Err(Error::ParamNotWritable {
                    name: name.to_string(),
                });
            }
            self.check_lock(node, locked)?;
            apply_write(&mut node.param, value)?;
            Ok(node.param.clone())
        })?;
        debug!("{} = {}", name, updated.value_string());
        if matches!(name, "Width" | "Height" | "PixelFormat") {
            self.recompute_payload();
        }
        self.observers.notify_param(&updated);
        Ok(())
    }

    fn execute(&self, name: &str) -> Result<()> {
        self.with_node(name, |node| match node.param.kind {
            ParamKind::Command { .. } if node.param.available && node.param.writable => Ok(()),
            ParamKind::Command { .. } => Err(Error::ParamNotWritable {
                name: name.to_string(),
            }),
            _ => Err(node.param_wrong_type()),
        })?;
        let fault = match name {
            "AcquisitionStart" => Some(Fault::AcquisitionStart),
            "AcquisitionStop" => Some(Fault::AcquisitionStop),
            "AcquisitionAbort" => Some(Fault::AcquisitionAbort),
            _ => None,
        };
        if let Some(fault) = fault {
            if self.faults.is_set(fault) {
                return Err(Error::IpxCamError {
                    msg: format!("injected failure executing {name}"),
                });
            }
        }
        match name {
            "AcquisitionStart" => self.set_acquiring(true),
            "AcquisitionStop" | "AcquisitionAbort" => self.set_acquiring(false),
            _ => {}
        }
        debug!("executed {name}");
        self.command_log.lock().push(name.to_string());
        Ok(())
    }

    fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }
}

impl Node {
    fn param_wrong_type(&self) -> Error {
        Error::WrongType {
            name: self.param.name.clone(),
            expected: ParamType::Command,
            actual: self.param.param_type(),
        }
    }
}

/// A view of a [NodeMap] limited by the access level of a connection.
#[derive(Clone)]
pub struct SimParams {
    map: Arc<NodeMap>,
    writable: bool,
}

impl SimParams {
    pub(crate) fn new(map: Arc<NodeMap>, writable: bool) -> Self {
        Self { map, writable }
    }

    /// The underlying tree, shared by every connection to the camera.
    pub fn node_map(&self) -> &Arc<NodeMap> {
        &self.map
    }

    fn check_writable(&self, name: &str) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::ParamNotWritable {
                name: name.to_string(),
            })
        }
    }
}

impl ParamTree for SimParams {
    fn names(&self) -> Vec<String> {
        self.map.names()
    }
    fn param(&self, name: &str) -> Result<Param> {
        let mut p = self.map.param(name)?;
        p.writable &= self.writable;
        Ok(p)
    }
    fn write(&self, name: &str, value: ParamWrite) -> Result<()> {
        self.check_writable(name)?;
        self.map.write(name, value)
    }
    fn execute(&self, name: &str) -> Result<()> {
        self.check_writable(name)?;
        self.map.execute(name)
    }
    fn observers(&self) -> &ObserverRegistry {
        self.map.observers()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn camera_map() -> NodeMap {
        NodeMap::camera(
            &CameraDescription {
                vendor: "Imperx",
                model: "sim",
                serial: "0001",
                width: 64,
                height: 48,
                pixel_format: pfnc::MONO8,
                frame_rate: 100.0,
            },
            Arc::new(Faults::default()),
        )
    }

    #[test]
    fn test_payload_follows_geometry() {
        let map = camera_map();
        assert_eq!(map.int_value(PAYLOAD_SIZE).unwrap(), 64 * 48);
        map.set_int_value("Width", 32).unwrap();
        map.set_enum_value("PixelFormat", "Mono16").unwrap();
        assert_eq!(map.int_value(PAYLOAD_SIZE).unwrap(), 32 * 48 * 2);
        assert!(matches!(
            map.set_int_value(PAYLOAD_SIZE, 1),
            Err(Error::ParamNotWritable { .. })
        ));
    }

    #[test]
    fn test_geometry_without_payload_node() {
        let mono8 = i64::from(pfnc::MONO8);
        let map = NodeMap::from_params(
            vec![
                int("Width", 64, 1, 64, 1),
                int("Height", 48, 1, 48, 1),
                enumeration("PixelFormat", mono8, &[("Mono8", mono8)]),
            ],
            Arc::new(Faults::default()),
        );
        map.set_int_value("Width", 32).unwrap();
        assert_eq!(map.int_value("Width").unwrap(), 32);
        assert!(map.int_value(PAYLOAD_SIZE).is_err());
    }

    #[test]
    fn test_lock_blocks_geometry() {
        let map = camera_map();
        map.set_int_value(TL_PARAMS_LOCKED, 1).unwrap();
        assert!(map.is_locked());
        assert!(matches!(
            map.set_int_value("Width", 32),
            Err(Error::ParamNotWritable { .. })
        ));
        // unrelated features stay writable
        map.set_float_value("ExposureTime", 2000.0).unwrap();
        map.set_int_value(TL_PARAMS_LOCKED, 0).unwrap();
        map.set_int_value("Width", 32).unwrap();
    }

    #[test]
    fn test_errors() {
        let map = camera_map();
        assert!(matches!(
            map.param("NoSuchThing"),
            Err(Error::UnknownParam { .. })
        ));
        assert!(matches!(
            map.set_int_value("Width", 100_000),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            map.set_bool_value("Width", true),
            Err(Error::WrongType { .. })
        ));
        assert!(matches!(
            map.execute("Width"),
            Err(Error::WrongType { .. })
        ));
        assert!(map.set_enum_value("TriggerMode", "Sometimes").is_err());
        assert!(map.set_from_str("PulseGenEnable", "TRUE").is_ok());
        assert!(map.bool_value("PulseGenEnable").unwrap());
    }

    #[test]
    fn test_commands_and_log() {
        let map = camera_map();
        map.execute("AcquisitionStart").unwrap();
        assert!(map.is_acquiring());
        map.faults.set(Fault::AcquisitionStop, true);
        assert!(map.execute("AcquisitionStop").is_err());
        assert!(map.is_acquiring());
        map.execute("AcquisitionAbort").unwrap();
        assert!(!map.is_acquiring());
        assert_eq!(map.command_log(), vec!["AcquisitionStart", "AcquisitionAbort"]);
    }

    #[test]
    fn test_settings_round_trip() {
        let map = camera_map();
        map.set_int_value("Width", 16).unwrap();
        map.set_float_value("Gain", 3.5).unwrap();
        map.set_enum_value("TriggerMode", "On").unwrap();
        let saved = map.save_settings(vec!["# test".into()]);
        assert_eq!(saved.get("Width"), Some("16"));
        assert_eq!(saved.get("Gain"), Some("3.5"));
        assert_eq!(saved.get("PulseGenEnable"), Some("0"));
        assert_eq!(saved.get(PAYLOAD_SIZE), None);
        assert_eq!(saved.get(TL_PARAMS_LOCKED), None);

        let other = camera_map();
        other.load_settings(&saved).unwrap();
        assert_eq!(other.int_value("Width").unwrap(), 16);
        assert_eq!(other.enum_value("TriggerMode").unwrap(), "On");
        assert_eq!(other.int_value(PAYLOAD_SIZE).unwrap(), 16 * 48);
    }

    #[test]
    fn test_read_only_view() {
        let view = SimParams::new(Arc::new(camera_map()), false);
        assert!(!view.param("Width").unwrap().writable);
        assert!(matches!(
            view.set_int_value("Width", 8),
            Err(Error::ParamNotWritable { .. })
        ));
        assert!(view.execute("AcquisitionStart").is_err());
    }
}
