use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ipxcam_acquire::{SessionSettings, TriggerSettings};
use ipxcam_sim::SimCameraSpec;
use ipxcam_types::DeviceAccess;

/// The ipxcam configuration error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("lookup error on variable: {source}")]
    ShellExpandLookupVarError {
        #[from]
        source: shellexpand::LookupError<std::env::VarError>,
    },
    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDeError {
        #[from]
        source: toml::de::Error,
    },
    #[error("TOML serialization error: {source}")]
    TomlSerError {
        #[from]
        source: toml::ser::Error,
    },
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

type Result<T> = std::result::Result<T, Error>;

/// The default value for [LoggingConfig::filter].
pub const DEFAULT_LOG_FILTER: &str = "ipxcam=info,warn";

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_access() -> DeviceAccess {
    DeviceAccess::Control
}

/// If `path` is relative, make it relative to `dirname`.
///
/// `path` must be utf-8 encoded and can start with a tilde, which is expanded
/// to the home directory.
fn fixup_relative_path(path: &mut PathBuf, dirname: &Path) -> Result<()> {
    let pathstr = path
        .as_os_str()
        .to_str()
        .ok_or_else(|| Error::NonUtf8Path(path.clone()))?;
    let expanded = shellexpand::full(&pathstr)?;
    *path = PathBuf::from(expanded.to_string());

    if path.is_relative() {
        *path = dirname.join(&path);
    }
    Ok(())
}

/// How cameras are opened and how frames are acquired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcquisitionConfig {
    /// Number of buffers to announce. Defaults to the minimum the stream
    /// requires.
    pub num_buffers: Option<usize>,
    /// Frames to acquire per camera. 0 acquires until stopped.
    #[serde(default)]
    pub num_frames: u64,
    /// Timeout for a single frame in milliseconds. Waits forever if not set.
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_access")]
    pub access: DeviceAccess,
    /// Directory to save raw frames into. Can contain shell variables. Frames
    /// are not saved if not set.
    pub save_dir: Option<PathBuf>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            num_buffers: None,
            num_frames: 0,
            timeout_ms: None,
            access: default_access(),
            save_dir: None,
        }
    }
}

impl AcquisitionConfig {
    pub fn session_settings(&self, trigger_frequency: Option<f64>) -> SessionSettings {
        SessionSettings {
            num_buffers: self.num_buffers,
            num_frames: (self.num_frames > 0).then_some(self.num_frames),
            timeout: self.timeout_ms.map(std::time::Duration::from_millis),
            trigger_frequency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set. Defaults to [DEFAULT_LOG_FILTER].
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Also write the log to this file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: None,
        }
    }
}

/// The contents of an ipxcam `.toml` configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpxcamConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub trigger: TriggerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Cameras of the simulated backend.
    #[serde(default)]
    pub cameras: Vec<SimCameraSpec>,
}

impl IpxcamConfig {
    /// For all paths which are relative, make them relative to the
    /// config file location.
    fn fixup_relative_paths(&mut self, orig_path: &Path) -> Result<()> {
        let dirname = orig_path.parent().unwrap_or_else(|| Path::new("."));

        if let Some(save_dir) = self.acquisition.save_dir.as_mut() {
            fixup_relative_path(save_dir, dirname)?;
        }
        if let Some(file) = self.logging.file.as_mut() {
            fixup_relative_path(file, dirname)?;
        }
        Ok(())
    }
}

impl Default for IpxcamConfig {
    fn default() -> Self {
        default_config()
    }
}

/// The configuration used when no file is given.
///
/// It contains two simulated cameras so that every command works without
/// hardware.
pub fn default_config() -> IpxcamConfig {
    IpxcamConfig {
        acquisition: AcquisitionConfig::default(),
        trigger: TriggerSettings::default(),
        logging: LoggingConfig::default(),
        cameras: vec![
            SimCameraSpec::new("SIM0001"),
            SimCameraSpec::new("SIM0002"),
        ],
    }
}

/// Parse configuration from a string. Relative paths are left as they are.
pub fn parse_config_str(contents: &str) -> Result<IpxcamConfig> {
    Ok(toml::from_str(contents)?)
}

/// Parse a `.toml` file and return an [IpxcamConfig] structure.
pub fn parse_config_file<P: AsRef<Path>>(fname: P) -> Result<IpxcamConfig> {
    let contents = std::fs::read_to_string(fname.as_ref())?;
    let mut cfg = parse_config_str(&contents)?;
    cfg.fixup_relative_paths(fname.as_ref())?;
    tracing::debug!("loaded configuration from {}", fname.as_ref().display());
    Ok(cfg)
}

pub fn to_toml_string(cfg: &IpxcamConfig) -> Result<String> {
    Ok(toml::to_string_pretty(cfg)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use ipxcam_types::InterfaceType;

    #[test]
    fn test_default_roundtrip() {
        let cfg = default_config();
        let text = to_toml_string(&cfg).unwrap();
        assert!(text.contains("[[cameras]]"));
        let parsed = parse_config_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = parse_config_str("").unwrap();
        assert_eq!(cfg.acquisition, AcquisitionConfig::default());
        assert_eq!(cfg.logging.filter, DEFAULT_LOG_FILTER);
        assert!(!cfg.trigger.enabled);
        assert!(cfg.cameras.is_empty());
        let settings = cfg.acquisition.session_settings(None);
        assert_eq!(settings.num_frames, None);
        assert_eq!(settings.timeout, None);
    }

    #[test]
    fn test_parse() {
        let cfg = parse_config_str(
            r#"
            [acquisition]
            num_buffers = 8
            num_frames = 100
            timeout_ms = 500
            access = "Exclusive"

            [trigger]
            enabled = true
            source = "Line2"

            [[cameras]]
            serial = "A1"
            interface_type = "Usb3Vision"
            pixel_format = "BayerRG8"

            [[cameras.frames]]
            frame_id = 1
            timestamp = 0

            [[cameras.frames]]
            frame_id = 3
            timestamp = 1000
            incomplete = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.acquisition.access, DeviceAccess::Exclusive);
        let settings = cfg.acquisition.session_settings(Some(1.0));
        assert_eq!(settings.num_buffers, Some(8));
        assert_eq!(settings.num_frames, Some(100));
        assert_eq!(settings.timeout, Some(std::time::Duration::from_millis(500)));
        assert_eq!(cfg.trigger.source, "Line2");
        assert_eq!(cfg.trigger.period_us, 1_000_000);
        let cam = &cfg.cameras[0];
        assert_eq!(cam.interface_type, InterfaceType::Usb3Vision);
        assert_eq!(cam.width, 640);
        let frames = cam.frames.as_ref().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].incomplete);
    }

    #[test]
    fn test_unknown_field() {
        assert!(parse_config_str("[acquisition]\nnum_bufers = 3\n").is_err());
    }

    #[test]
    fn test_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ipxcam.toml");
        std::fs::write(
            &path,
            "[acquisition]\nsave_dir = \"frames\"\n[logging]\nfile = \"/var/log/ipxcam.log\"\n",
        )
        .unwrap();
        let cfg = parse_config_file(&path).unwrap();
        assert_eq!(cfg.acquisition.save_dir, Some(tmp.path().join("frames")));
        assert_eq!(cfg.logging.file, Some(PathBuf::from("/var/log/ipxcam.log")));
    }
}
