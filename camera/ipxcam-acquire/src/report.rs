use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::stats::{AcquisitionStats, FrameReport};

#[derive(Serialize)]
struct JsonLine<'a, T: Serialize> {
    serial: &'a str,
    time: chrono::DateTime<chrono::Local>,
    #[serde(flatten)]
    data: &'a T,
}

/// Writer for per-frame status lines and run summaries.
///
/// Cloning shares the underlying writer, so the workers of several devices
/// can print through one report without interleaving lines.
#[derive(Clone)]
pub struct ConsoleReport {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    json: bool,
    frames: bool,
}

impl ConsoleReport {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            json: false,
            frames: true,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Discard everything.
    pub fn silent() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Write one JSON object per line instead of text.
    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Whether to print a line for every frame (summaries are always written).
    pub fn frames(mut self, frames: bool) -> Self {
        self.frames = frames;
        self
    }

    pub fn frame(&self, serial: &str, report: &FrameReport) {
        if !self.frames {
            return;
        }
        let line = if self.json {
            self.json_line(serial, report)
        } else {
            Some(format!("{serial} {report}"))
        };
        if let Some(line) = line {
            self.write_line(&line);
        }
    }

    pub fn summary(&self, serial: &str, stats: &AcquisitionStats) {
        let line = if self.json {
            self.json_line(serial, stats)
        } else {
            Some(format!("{serial} summary: {stats}"))
        };
        if let Some(line) = line {
            self.write_line(&line);
        }
    }

    fn json_line<T: Serialize>(&self, serial: &str, data: &T) -> Option<String> {
        let line = JsonLine {
            serial,
            time: chrono::Local::now(),
            data,
        };
        match serde_json::to_string(&line) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("serializing report: {e}");
                None
            }
        }
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!("writing report: {e}");
        }
    }
}
