use std::path::{Path, PathBuf};

use time::{UtcOffset, format_description::well_known::Iso8601};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::OffsetTime},
    layer::SubscriberExt,
};

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where log messages go and which are shown when `RUST_LOG` is not set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directives used if `RUST_LOG` is unset, e.g. `ipxcam=info,warn`.
    pub default_filter: String,
    pub file: Option<PathBuf>,
    pub disable_console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            file: None,
            disable_console: false,
        }
    }
}

impl LogConfig {
    pub fn with_default_filter(default_filter: &str) -> Self {
        Self {
            default_filter: default_filter.to_string(),
            ..Default::default()
        }
    }

    pub fn file<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        self.file = path.map(|p| p.as_ref().to_path_buf());
        self
    }
}

struct Guard {}

impl Drop for Guard {
    fn drop(&mut self) {}
}

/// Log to the console, filtered by `RUST_LOG` or else at info level.
pub fn init() -> Result<impl Drop, Error> {
    initiate_logging(&LogConfig::default())
}

/// The filter from `RUST_LOG`, falling back to `default_filter` if the
/// variable is unset or does not parse.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(default_filter),
    }
}

/// Start logging to file and console, both optional.
pub fn initiate_logging(cfg: &LogConfig) -> Result<impl Drop + use<>, Error> {
    // Create a fixed offset time formatter based on the timezone at the
    // time this line of code runs.
    let timer = OffsetTime::new(
        UtcOffset::from_whole_seconds(chrono::Local::now().offset().local_minus_utc())?,
        Iso8601::DEFAULT,
    );

    let file_layer = if let Some(path) = &cfg.file {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        let file_writer = std::sync::Mutex::new(file);
        Some(
            fmt::layer()
                .with_timer(timer.clone())
                .with_writer(file_writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
    } else {
        None
    };

    let console_layer = if cfg.disable_console {
        None
    } else {
        let with_ansi = !cfg!(windows);
        Some(
            fmt::layer()
                .with_timer(timer)
                .with_ansi(with_ansi)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true),
        )
    };

    let collector = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter(&cfg.default_filter));
    tracing::subscriber::set_global_default(collector)?;

    let log_var = if let Ok(var) = std::env::var("RUST_LOG") {
        format!(" with RUST_LOG=\"{}\".", var)
    } else {
        format!(" with default filter \"{}\".", cfg.default_filter)
    };

    if let Some(path) = &cfg.file {
        tracing::debug!("Logging initiated to file \"{}\"{log_var}", path.display());
    }

    if !cfg.disable_console {
        tracing::debug!("Logging initiated to console{log_var}");
    }

    Ok(Guard {})
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_log_to_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs").join("ipxcam.log");
        let cfg = LogConfig {
            disable_console: true,
            ..LogConfig::with_default_filter("warn").file(Some(&path))
        };
        let _guard = initiate_logging(&cfg).unwrap();
        tracing::error!("camera went away");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("camera went away"));

        // only one global subscriber per process
        assert!(initiate_logging(&LogConfig::default()).is_err());
    }
}
