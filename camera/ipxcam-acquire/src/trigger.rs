//! Hardware trigger setup driven by the camera's pulse generator.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ipxcam::{Error, ParamTree, Result};
use ipxcam_types::TriggerMode;

fn default_source() -> String {
    "Line1".to_string()
}

fn default_granularity() -> String {
    "x1".to_string()
}

fn default_period_us() -> i64 {
    1_000_000
}

fn default_pulse_width_us() -> i64 {
    100_000
}

/// Trigger configuration as stored in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Value of the `TriggerSource` enumeration.
    #[serde(default = "default_source")]
    pub source: String,
    /// Entry of `PulseGenGranularity` (`x1`, `x10`, ...).
    #[serde(default = "default_granularity")]
    pub granularity: String,
    /// Pulse generator period in granularity units.
    #[serde(default = "default_period_us")]
    pub period_us: i64,
    #[serde(default = "default_pulse_width_us")]
    pub pulse_width_us: i64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            source: default_source(),
            granularity: default_granularity(),
            period_us: default_period_us(),
            pulse_width_us: default_pulse_width_us(),
        }
    }
}

/// Multiplier encoded in a `PulseGenGranularity` entry name such as `x10`.
pub fn granularity_factor(entry: &str) -> Option<f64> {
    let digits = entry.strip_prefix('x').or_else(|| entry.strip_prefix('X'))?;
    digits.parse::<u32>().ok().filter(|f| *f > 0).map(f64::from)
}

/// Configure the pulse generator and trigger, or switch triggering off.
pub fn configure_trigger<P: ParamTree + ?Sized>(params: &P, settings: &TriggerSettings) -> Result<()> {
    if !settings.enabled {
        params.set_enum_value("TriggerMode", TriggerMode::Off.as_str())?;
        params.set_bool_value("PulseGenEnable", false)?;
        info!("trigger disabled");
        return Ok(());
    }
    if granularity_factor(&settings.granularity).is_none() {
        return Err(Error::InvalidArgument(format!(
            "bad pulse generator granularity \"{}\"",
            settings.granularity
        )));
    }
    params.set_enum_value("PulseGenGranularity", &settings.granularity)?;
    params.set_int_value("PulseGenWidth", settings.pulse_width_us)?;
    params.set_int_value("PulseGenPeriod", settings.period_us)?;
    params.set_enum_value("PulseGenMode", "Continuous")?;
    params.set_bool_value("PulseGenEnable", true)?;
    for out in ["OUT1Selector", "OUT2Selector"] {
        params.set_enum_value(out, "PulseGenerator")?;
    }
    params.set_enum_value("TriggerSource", &settings.source)?;
    params.set_enum_value("TriggerMode", TriggerMode::On.as_str())?;
    debug!("{settings:?}");
    info!(
        "trigger enabled from {} at {:.3} Hz",
        settings.source,
        trigger_frequency(params)?
    );
    Ok(())
}

/// Pulse generator rate in Hz as currently configured on the camera.
pub fn trigger_frequency<P: ParamTree + ?Sized>(params: &P) -> Result<f64> {
    let granularity = params.enum_value("PulseGenGranularity")?;
    let factor = granularity_factor(&granularity).ok_or_else(|| {
        Error::InvalidArgument(format!("bad pulse generator granularity \"{granularity}\""))
    })?;
    let period = params.int_value("PulseGenPeriod")?;
    if period <= 0 {
        return Err(Error::OutOfRange {
            name: "PulseGenPeriod".into(),
            msg: format!("{period} is not positive"),
        });
    }
    Ok(1e6 / (factor * period as f64))
}

/// Returns true if the camera is in trigger mode.
pub fn trigger_enabled<P: ParamTree + ?Sized>(params: &P) -> Result<bool> {
    Ok(params.enum_value("TriggerMode")? == TriggerMode::On.as_str())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::open_sim;
    use ipxcam::Device;
    use ipxcam_sim::SimCameraSpec;

    #[test]
    fn test_granularity() {
        assert_eq!(granularity_factor("x1"), Some(1.0));
        assert_eq!(granularity_factor("x1000"), Some(1000.0));
        assert_eq!(granularity_factor("x0"), None);
        assert_eq!(granularity_factor("fast"), None);
    }

    #[test_log::test]
    fn test_configure() {
        let (_system, device) = open_sim(SimCameraSpec::new("t"));
        let params = device.camera_parameters();
        let settings = TriggerSettings {
            enabled: true,
            source: "PulseGenerator".into(),
            granularity: "x10".into(),
            period_us: 10_000,
            pulse_width_us: 100,
        };
        configure_trigger(params, &settings).unwrap();
        assert!(trigger_enabled(params).unwrap());
        assert_eq!(params.enum_value("TriggerSource").unwrap(), "PulseGenerator");
        assert_eq!(params.enum_value("OUT2Selector").unwrap(), "PulseGenerator");
        assert!(params.bool_value("PulseGenEnable").unwrap());
        // 1e6 / (10 * 10_000)
        assert_eq!(trigger_frequency(params).unwrap(), 10.0);

        configure_trigger(params, &TriggerSettings::default()).unwrap();
        assert!(!trigger_enabled(params).unwrap());
        assert!(!params.bool_value("PulseGenEnable").unwrap());
    }

    #[test_log::test]
    fn test_bad_settings() {
        let (_system, device) = open_sim(SimCameraSpec::new("t"));
        let params = device.camera_parameters();
        let mut settings = TriggerSettings {
            enabled: true,
            ..Default::default()
        };
        settings.granularity = "x3".into();
        // not an entry of the enumeration
        assert!(configure_trigger(params, &settings).is_err());
        settings.granularity = "slow".into();
        assert!(matches!(
            configure_trigger(params, &settings),
            Err(Error::InvalidArgument(_))
        ));
    }
}
