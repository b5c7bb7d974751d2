//! Per-stream frame statistics.
//!
//! Drops are derived from gaps in the frame id sequence, frame rate and
//! bandwidth from the device timestamps. Both are what the camera reports,
//! not how fast frames are processed on the host.

use std::time::Duration;

use serde::Serialize;

use ipxcam::{Buffer, Error};

/// Timestamp tick frequency assumed when the camera does not report one.
pub const DEFAULT_TICK_FREQUENCY: f64 = 1e9;

/// A trigger is considered lost when two frames are further apart than this
/// multiple of the trigger period.
pub const TRIGGER_LOSS_FACTOR: f64 = 1.5;

const MIB: f64 = 1_048_576.0;

/// Number of frames lost between `prev` and `current`.
///
/// Returns `None` if the id did not increase, in which case drop tracking
/// restarts at `current`.
pub fn dropped_between(prev: u64, current: u64) -> Option<u64> {
    (current > prev).then(|| current - prev - 1)
}

/// Frame rate from a timestamp delta. Zero if the delta is zero.
pub fn fps(tick_frequency: f64, delta_ticks: u64) -> f64 {
    if delta_ticks == 0 {
        0.0
    } else {
        tick_frequency / delta_ticks as f64
    }
}

/// Bandwidth in MiB/s for `fps` frames of `buffer_size` bytes.
pub fn bandwidth_mib(fps: f64, buffer_size: usize) -> f64 {
    fps * buffer_size as f64 / MIB
}

/// Returns true if `delta_ticks` is too long for a trigger at `trigger_hz`.
pub fn trigger_lost(delta_ticks: u64, tick_frequency: f64, trigger_hz: f64) -> bool {
    if trigger_hz <= 0.0 {
        return false;
    }
    let expected = tick_frequency / trigger_hz;
    delta_ticks as f64 > TRIGGER_LOSS_FACTOR * expected
}

/// The parts of a delivered buffer which statistics depend on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub frame_id: u64,
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
    pub incomplete: bool,
}

impl From<&Buffer> for FrameSample {
    fn from(buffer: &Buffer) -> Self {
        Self {
            frame_id: buffer.frame_id(),
            timestamp: buffer.timestamp(),
            width: buffer.width(),
            height: buffer.height(),
            incomplete: buffer.is_incomplete(),
        }
    }
}

/// Status line for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub bandwidth_mib: f64,
    /// Incomplete frames so far.
    pub incomplete: u64,
    /// Dropped frames so far.
    pub dropped: u64,
    /// Wall clock time since the previous frame was delivered.
    pub duration_ms: u64,
    pub trigger_lost: bool,
}

impl std::fmt::Display for FrameReport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "FID:{:08X} {:4}W {:4}H {:7.2}FPS {:7.2}MiB/s inc:{} dr:{} dur:{}",
            self.frame_id & 0xFFFF_FFFF,
            self.width,
            self.height,
            self.fps,
            self.bandwidth_mib,
            self.incomplete,
            self.dropped,
            self.duration_ms
        )?;
        if self.trigger_lost {
            write!(f, " ER")?;
        }
        Ok(())
    }
}

/// Totals of one acquisition run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcquisitionStats {
    /// Frames delivered without error.
    pub frames: u64,
    pub dropped: u64,
    pub incomplete: u64,
    pub timeouts: u64,
    /// Failed fetches other than timeouts, including those which returned a
    /// buffer.
    pub errors: u64,
    pub consumer_errors: u64,
    pub last_fps: f64,
    pub last_bandwidth_mib: f64,
    /// Frame ids after which frames were dropped.
    pub drops_after: Vec<u64>,
    pub incomplete_ids: Vec<u64>,
    pub trigger_lost_ids: Vec<u64>,
}

fn write_ids(f: &mut std::fmt::Formatter, label: &str, ids: &[u64]) -> std::fmt::Result {
    if ids.is_empty() {
        return Ok(());
    }
    write!(f, "\n  {label}:")?;
    for id in ids {
        write!(f, " {id:08X}")?;
    }
    Ok(())
}

impl std::fmt::Display for AcquisitionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "frames: {}, dropped: {}, incomplete: {}, timeouts: {}, errors: {}",
            self.frames, self.dropped, self.incomplete, self.timeouts, self.errors
        )?;
        if self.consumer_errors > 0 {
            write!(f, ", consumer errors: {}", self.consumer_errors)?;
        }
        write_ids(f, "dropped after", &self.drops_after)?;
        write_ids(f, "trigger lost", &self.trigger_lost_ids)?;
        write_ids(f, "incomplete", &self.incomplete_ids)
    }
}

/// Accumulates [AcquisitionStats] frame by frame.
#[derive(Debug, Clone)]
pub struct FrameStatistics {
    tick_frequency: f64,
    buffer_size: usize,
    trigger_frequency: Option<f64>,
    prev_frame_id: Option<u64>,
    prev_timestamp: Option<u64>,
    stats: AcquisitionStats,
}

impl FrameStatistics {
    /// `trigger_frequency` enables trigger loss detection.
    pub fn new(tick_frequency: f64, buffer_size: usize, trigger_frequency: Option<f64>) -> Self {
        Self {
            tick_frequency,
            buffer_size,
            trigger_frequency,
            prev_frame_id: None,
            prev_timestamp: None,
            stats: AcquisitionStats::default(),
        }
    }

    pub fn record(&mut self, sample: &FrameSample, duration: Duration) -> FrameReport {
        let stats = &mut self.stats;
        stats.frames += 1;

        if let Some(prev) = self.prev_frame_id {
            if let Some(n) = dropped_between(prev, sample.frame_id) {
                if n > 0 {
                    stats.dropped += n;
                    stats.drops_after.push(prev);
                }
            }
        }
        self.prev_frame_id = Some(sample.frame_id);

        let mut lost = false;
        if let Some(prev) = self.prev_timestamp {
            let delta = sample.timestamp.saturating_sub(prev);
            stats.last_fps = fps(self.tick_frequency, delta);
            stats.last_bandwidth_mib = bandwidth_mib(stats.last_fps, self.buffer_size);
            if let Some(hz) = self.trigger_frequency {
                lost = trigger_lost(delta, self.tick_frequency, hz);
            }
        }
        self.prev_timestamp = Some(sample.timestamp);

        if lost {
            stats.trigger_lost_ids.push(sample.frame_id);
        }
        if sample.incomplete {
            stats.incomplete += 1;
            stats.incomplete_ids.push(sample.frame_id);
        }

        FrameReport {
            frame_id: sample.frame_id,
            width: sample.width,
            height: sample.height,
            fps: stats.last_fps,
            bandwidth_mib: stats.last_bandwidth_mib,
            incomplete: stats.incomplete,
            dropped: stats.dropped,
            duration_ms: duration.as_millis() as u64,
            trigger_lost: lost,
        }
    }

    /// Count a failed fetch.
    pub fn record_error(&mut self, error: &Error) {
        match error {
            Error::Timeout => self.stats.timeouts += 1,
            _ => self.stats.errors += 1,
        }
    }

    pub fn record_consumer_error(&mut self) {
        self.stats.consumer_errors += 1;
    }

    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    pub fn into_stats(self) -> AcquisitionStats {
        self.stats
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn sample(frame_id: u64, timestamp: u64) -> FrameSample {
        FrameSample {
            frame_id,
            timestamp,
            width: 640,
            height: 480,
            incomplete: false,
        }
    }

    fn run(ids: &[u64]) -> AcquisitionStats {
        let mut s = FrameStatistics::new(DEFAULT_TICK_FREQUENCY, 1024, None);
        for (i, id) in ids.iter().enumerate() {
            s.record(&sample(*id, i as u64 * 1000), Duration::ZERO);
        }
        s.into_stats()
    }

    #[test]
    fn test_drops() {
        let stats = run(&[10, 11, 13, 14]);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.drops_after, vec![11]);
        assert_eq!(stats.frames, 4);
    }

    #[test]
    fn test_first_frame_not_counted() {
        assert_eq!(run(&[1000]).dropped, 0);
    }

    #[test]
    fn test_regression_resets() {
        // 5 -> 2 is a restart, 2 -> 4 loses one frame
        let stats = run(&[4, 5, 2, 4, 4]);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.drops_after, vec![2]);
    }

    #[test]
    fn test_fps_and_bandwidth() {
        assert_eq!(fps(1e9, 0), 0.0);
        assert_eq!(fps(1e9, 10_000_000), 100.0);
        assert_eq!(bandwidth_mib(100.0, 1_048_576), 100.0);

        let mut s = FrameStatistics::new(1e6, 2 * 1_048_576, None);
        let first = s.record(&sample(1, 0), Duration::ZERO);
        assert_eq!(first.fps, 0.0);
        let r = s.record(&sample(2, 40_000), Duration::from_millis(40));
        assert_eq!(r.fps, 25.0);
        assert_eq!(r.bandwidth_mib, 50.0);
        assert_eq!(r.duration_ms, 40);
        // equal timestamps
        let r = s.record(&sample(3, 40_000), Duration::ZERO);
        assert_eq!(r.fps, 0.0);
        assert_eq!(r.bandwidth_mib, 0.0);
    }

    #[test]
    fn test_trigger_loss() {
        // 10 Hz trigger with a microsecond clock: 100_000 ticks per frame
        assert!(!trigger_lost(100_000, 1e6, 10.0));
        assert!(!trigger_lost(150_000, 1e6, 10.0));
        assert!(trigger_lost(150_001, 1e6, 10.0));
        assert!(!trigger_lost(1_000_000, 1e6, 0.0));

        let mut s = FrameStatistics::new(1e6, 16, Some(10.0));
        assert!(!s.record(&sample(1, 0), Duration::ZERO).trigger_lost);
        assert!(!s.record(&sample(2, 100_000), Duration::ZERO).trigger_lost);
        assert!(s.record(&sample(3, 300_000), Duration::ZERO).trigger_lost);
        assert_eq!(s.stats().trigger_lost_ids, vec![3]);
    }

    #[test]
    fn test_incomplete_and_errors() {
        let mut s = FrameStatistics::new(1e9, 16, None);
        let mut f = sample(7, 0);
        f.incomplete = true;
        let r = s.record(&f, Duration::ZERO);
        assert_eq!(r.incomplete, 1);
        s.record_error(&Error::Timeout);
        s.record_error(&Error::Aborted);
        s.record_consumer_error();
        let stats = s.into_stats();
        assert_eq!(stats.incomplete_ids, vec![7]);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.consumer_errors, 1);
    }

    #[test]
    fn test_report_format() {
        let r = FrameReport {
            frame_id: 0x1a,
            width: 640,
            height: 48,
            fps: 29.97,
            bandwidth_mib: 8.788,
            incomplete: 0,
            dropped: 2,
            duration_ms: 33,
            trigger_lost: false,
        };
        assert_eq!(
            r.to_string(),
            "FID:0000001A  640W   48H   29.97FPS    8.79MiB/s inc:0 dr:2 dur:33"
        );
        let r = FrameReport {
            trigger_lost: true,
            ..r
        };
        assert!(r.to_string().ends_with(" ER"));

        // only the low 32 bits of the frame id are shown
        let r = FrameReport {
            frame_id: 0x1_0000_002A,
            trigger_lost: false,
            ..r
        };
        assert!(r.to_string().starts_with("FID:0000002A  640W"));
    }

    #[test]
    fn test_summary() {
        let stats = run(&[1, 3]);
        let text = stats.to_string();
        assert!(text.starts_with("frames: 2, dropped: 1,"));
        assert!(text.contains("dropped after: 00000001"));
        assert!(!text.contains("trigger lost"));
    }

    proptest! {
        #[test]
        fn drops_equal_missing_ids(ids in proptest::collection::btree_set(0u64..10_000, 1..200)) {
            let ids: Vec<u64> = ids.into_iter().collect();
            let stats = run(&ids);
            let span = ids[ids.len() - 1] - ids[0] + 1;
            prop_assert_eq!(stats.dropped, span - ids.len() as u64);
        }
    }
}
