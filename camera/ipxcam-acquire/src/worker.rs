//! The per-stream acquisition thread.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use ipxcam::{Buffer, Error, FetchError, Result, Stream, Timeout};

use crate::report::ConsoleReport;
use crate::stats::{AcquisitionStats, FrameSample, FrameStatistics};

/// Receives every frame delivered by the worker.
///
/// The buffer is re-queued after `consume` returns, so data must be copied
/// out if it is needed later. Errors and panics are counted and logged but do
/// not stop acquisition.
pub trait FrameConsumer: Send {
    fn consume(&mut self, buffer: &Buffer) -> anyhow::Result<()>;
}

impl<F> FrameConsumer for F
where
    F: FnMut(&Buffer) -> anyhow::Result<()> + Send,
{
    fn consume(&mut self, buffer: &Buffer) -> anyhow::Result<()> {
        self(buffer)
    }
}

/// Ignores frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConsumer;

impl FrameConsumer for NullConsumer {
    fn consume(&mut self, _buffer: &Buffer) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes the image bytes of every frame to `<dir>/<serial>_<frame_id>.raw`.
#[derive(Debug, Clone)]
pub struct RawDumpConsumer {
    dir: PathBuf,
    serial: String,
}

impl RawDumpConsumer {
    /// Create `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, serial: &str) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            serial: serial.to_string(),
        })
    }

    pub fn path_for(&self, frame_id: u64) -> PathBuf {
        self.dir.join(format!("{}_{}.raw", self.serial, frame_id))
    }
}

impl FrameConsumer for RawDumpConsumer {
    fn consume(&mut self, buffer: &Buffer) -> anyhow::Result<()> {
        let path = self.path_for(buffer.frame_id());
        std::fs::write(&path, buffer.image())?;
        trace!("wrote {}", path.display());
        Ok(())
    }
}

/// Settings of one worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Used to name the thread and label report lines.
    pub serial: String,
    pub timeout: Timeout,
    /// Stop after this many buffers were fetched, counting those delivered
    /// with an error. `None` runs until cancelled.
    pub num_frames: Option<u64>,
    pub tick_frequency: f64,
    pub buffer_size: usize,
    /// Expected trigger rate, enables trigger loss detection.
    pub trigger_frequency: Option<f64>,
}

/// A thread fetching, inspecting and re-queueing buffers of one stream.
///
/// The worker is joined when dropped.
pub struct AcquisitionWorker<S: Stream + 'static> {
    stream: Arc<S>,
    serial: String,
    control_and_join_handle:
        Option<(thread_control::Control, std::thread::JoinHandle<AcquisitionStats>)>,
}

fn _test_worker_is_send<S: Stream + 'static>() {
    // Compile-time test to ensure AcquisitionWorker implements Send trait.
    fn implements<T: Send>() {}
    implements::<AcquisitionWorker<S>>();
}

impl<S: Stream + 'static> AcquisitionWorker<S> {
    pub fn spawn<C>(
        stream: Arc<S>,
        mut consumer: C,
        settings: WorkerSettings,
        report: ConsoleReport,
    ) -> Result<Self>
    where
        C: FrameConsumer + 'static,
    {
        let (flag, control) = thread_control::make_pair();
        let thread_builder =
            std::thread::Builder::new().name(format!("ipxcam-acquire-{}", settings.serial));
        let serial = settings.serial.clone();
        let stream2 = stream.clone();
        let join_handle = thread_builder.spawn(move || {
            let stats = run(&*stream2, &mut consumer, &settings, &report, &flag);
            report.summary(&settings.serial, &stats);
            debug!(
                "closing thread {:?} ({:?}) in {}:{}",
                std::thread::current().name(),
                std::thread::current().id(),
                file!(),
                line!()
            );
            stats
        })?;
        info!("acquisition worker for {serial} started");
        Ok(Self {
            stream,
            serial,
            control_and_join_handle: Some((control, join_handle)),
        })
    }

    /// Returns true once the thread has exited, e.g. after the frame limit.
    pub fn is_finished(&self) -> bool {
        match &self.control_and_join_handle {
            Some((_, join_handle)) => join_handle.is_finished(),
            None => true,
        }
    }

    /// Ask the thread to stop and unblock a pending [Stream::get_buffer].
    pub fn cancel(&self) {
        if let Some((control, _)) = &self.control_and_join_handle {
            control.stop();
            if let Err(e) = self.stream.cancel_buffer() {
                warn!("cancelling wait of {}: {e}", self.serial);
            }
        }
    }

    /// Wait for the thread to exit on its own and return its statistics.
    pub fn join(mut self) -> Result<AcquisitionStats> {
        self.join_inner()
    }

    /// [Self::cancel] followed by [Self::join].
    pub fn stop(self) -> Result<AcquisitionStats> {
        self.cancel();
        self.join()
    }

    fn join_inner(&mut self) -> Result<AcquisitionStats> {
        let (_control, join_handle) = self
            .control_and_join_handle
            .take()
            .ok_or_else(|| Error::InvalidState("worker already joined".into()))?;
        join_handle.join().map_err(|_| {
            Error::IpxCamError {
                msg: format!("acquisition worker of {} panicked", self.serial),
            }
        })
    }
}

impl<S: Stream + 'static> Drop for AcquisitionWorker<S> {
    fn drop(&mut self) {
        if self.control_and_join_handle.is_some() {
            self.cancel();
            if let Err(e) = self.join_inner() {
                error!("{e}");
            }
        }
    }
}

fn requeue<S: Stream + ?Sized>(stream: &S, buffer: Buffer, stats: &mut FrameStatistics) {
    let id = buffer.id();
    if let Err(e) = stream.queue_buffer(buffer) {
        error!("re-queueing buffer {id}: {e}");
        stats.record_error(&e);
    }
}

fn run<S: Stream + ?Sized, C: FrameConsumer>(
    stream: &S,
    consumer: &mut C,
    settings: &WorkerSettings,
    report: &ConsoleReport,
    flag: &thread_control::Flag,
) -> AcquisitionStats {
    let mut stats = FrameStatistics::new(
        settings.tick_frequency,
        settings.buffer_size,
        settings.trigger_frequency,
    );
    // Buffers handed out by the stream, including those with a transfer
    // error. The frame limit counts these, as the stream does.
    let mut fetched: u64 = 0;
    let mut prev_delivery: Option<Instant> = None;
    while flag.is_alive() {
        if let Some(n) = settings.num_frames {
            if fetched >= n {
                debug!("{}: frame limit of {n} reached", settings.serial);
                break;
            }
        }
        let buffer = match stream.get_buffer(settings.timeout) {
            Ok(buffer) => buffer,
            Err(FetchError { error, buffer }) => {
                if let Some(buffer) = buffer {
                    fetched += 1;
                    requeue(stream, buffer, &mut stats);
                }
                match error {
                    Error::Aborted if !flag.is_alive() => break,
                    Error::Timeout => trace!("{}: timeout", settings.serial),
                    ref e => warn!("{}: get_buffer: {e}", settings.serial),
                }
                stats.record_error(&error);
                continue;
            }
        };
        fetched += 1;

        let now = Instant::now();
        let since_prev = prev_delivery.map(|t| now - t).unwrap_or_default();
        prev_delivery = Some(now);
        let frame = stats.record(&FrameSample::from(&buffer), since_prev);
        report.frame(&settings.serial, &frame);

        match catch_unwind(AssertUnwindSafe(|| consumer.consume(&buffer))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("{}: consumer failed on frame {}: {e}", settings.serial, frame.frame_id);
                stats.record_consumer_error();
            }
            Err(_) => {
                error!("{}: consumer panicked on frame {}", settings.serial, frame.frame_id);
                stats.record_consumer_error();
            }
        }
        requeue(stream, buffer, &mut stats);
    }
    stats.into_stats()
}
