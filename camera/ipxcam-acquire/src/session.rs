use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use ipxcam::{Device, DeviceAccess, DeviceInfo, Error, Interface, ParamTree, Result, Timeout};

use crate::pool::BufferPool;
use crate::report::ConsoleReport;
use crate::sequence::{AcquisitionControl, AcquisitionState, StopReport};
use crate::stats::{AcquisitionStats, DEFAULT_TICK_FREQUENCY};
use crate::worker::{AcquisitionWorker, FrameConsumer, WorkerSettings};

pub const TICK_FREQUENCY: &str = "GevTimestampTickFrequency";

/// How to run one acquisition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSettings {
    /// `None` allocates [ipxcam::Stream::min_num_buffers] buffers.
    pub num_buffers: Option<usize>,
    /// `None` runs until stopped.
    pub num_frames: Option<u64>,
    /// `None` waits forever for each buffer.
    pub timeout: Option<std::time::Duration>,
    /// Expected trigger rate, enables trigger loss detection.
    pub trigger_frequency: Option<f64>,
}

/// Result of a complete acquisition run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub serial: String,
    pub stats: AcquisitionStats,
    #[serde(skip)]
    pub stop: StopReport,
}

/// The timestamp tick frequency reported by the camera, or 1 GHz.
pub fn tick_frequency<P: ParamTree + ?Sized>(params: &P) -> f64 {
    match params.float_value(TICK_FREQUENCY) {
        Ok(f) if f > 0.0 => f,
        Ok(_) | Err(_) => DEFAULT_TICK_FREQUENCY,
    }
}

/// An open device together with everything needed to acquire from its first
/// stream.
///
/// Fields are declared in teardown order: the worker is joined before
/// acquisition is stopped, acquisition is stopped before the buffers are
/// revoked, and the buffers are revoked before the stream and device are
/// released.
pub struct AcquisitionSession<D: Device>
where
    D::Stream: 'static,
{
    worker: Option<AcquisitionWorker<D::Stream>>,
    control: AcquisitionControl<D>,
    pool: Option<BufferPool<D::Stream>>,
    stream: Arc<D::Stream>,
    device: Arc<D>,
}

impl<D: Device> AcquisitionSession<D>
where
    D::Stream: 'static,
{
    /// Open the device described by `info` on `iface`.
    pub fn open<I>(iface: &I, info: &DeviceInfo, access: DeviceAccess) -> Result<Self>
    where
        I: Interface<Device = D>,
    {
        let device = iface.create_device(info, access)?;
        Self::from_device(device)
    }

    pub fn from_device(device: D) -> Result<Self> {
        if device.num_streams() == 0 {
            return Err(Error::InvalidState(format!(
                "{} has no stream",
                device.info().display_name
            )));
        }
        let stream = device.stream(0)?;
        let device = Arc::new(device);
        Ok(Self {
            worker: None,
            control: AcquisitionControl::new(device.clone(), stream.clone()),
            pool: None,
            stream,
            device,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn stream(&self) -> &Arc<D::Stream> {
        &self.stream
    }

    pub fn info(&self) -> &DeviceInfo {
        self.device.info()
    }

    pub fn state(&self) -> AcquisitionState {
        self.control.state()
    }

    /// Allocate buffers, start acquisition and spawn the worker.
    ///
    /// On failure everything set up so far is torn down again and the
    /// parameters are left unlocked.
    pub fn start<C>(
        &mut self,
        settings: &SessionSettings,
        consumer: C,
        report: ConsoleReport,
    ) -> Result<()>
    where
        C: FrameConsumer + 'static,
    {
        if self.control.state() != AcquisitionState::Idle {
            return Err(Error::InvalidState(format!(
                "cannot start while {:?}",
                self.control.state()
            )));
        }
        let serial = self.device.info().serial.clone();
        let pool = match settings.num_buffers {
            Some(n) => BufferPool::allocate(self.stream.clone(), n)?,
            None => BufferPool::allocate_default(self.stream.clone())?,
        };
        pool.queue_all()?;
        let buffer_size = pool.buffer_size();
        self.pool = Some(pool);

        if let Err(e) = self.control.start(settings.num_frames) {
            self.release_pool();
            return Err(e);
        }

        let worker_settings = WorkerSettings {
            serial: serial.clone(),
            timeout: settings
                .timeout
                .map(Timeout::After)
                .unwrap_or(Timeout::Infinite),
            num_frames: settings.num_frames,
            tick_frequency: tick_frequency(self.device.camera_parameters()),
            buffer_size,
            trigger_frequency: settings.trigger_frequency,
        };
        match AcquisitionWorker::spawn(self.stream.clone(), consumer, worker_settings, report) {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                error!("spawning worker for {serial}: {e}");
                if let Err(e2) = self.control.stop() {
                    error!("{e2}");
                }
                self.release_pool();
                return Err(e);
            }
        }
        info!("{serial}: acquiring");
        Ok(())
    }

    /// Returns true once the worker exited on its own, e.g. after the frame
    /// limit was reached.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map(|w| w.is_finished()).unwrap_or(true)
    }

    /// Cancel the worker, stop acquisition and release the buffers.
    pub fn stop(&mut self) -> Result<RunSummary> {
        let worker = self
            .worker
            .take()
            .ok_or_else(|| Error::InvalidState("not acquiring".into()))?;
        let stats = match worker.stop() {
            Ok(stats) => stats,
            Err(e) => {
                error!("{e}");
                AcquisitionStats::default()
            }
        };
        let stop = self.control.stop()?;
        self.release_pool();
        debug!("stop report: {stop:?}");
        Ok(RunSummary {
            serial: self.device.info().serial.clone(),
            stats,
            stop,
        })
    }

    fn release_pool(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            if let Err(e) = pool.release() {
                warn!("releasing buffers: {e}");
            }
        }
    }

    /// Stop if needed and close the device.
    pub fn close(mut self) -> Option<RunSummary> {
        let summary = if self.worker.is_some() {
            match self.stop() {
                Ok(summary) => Some(summary),
                Err(e) => {
                    error!("stopping {}: {e}", self.device.info().serial);
                    None
                }
            }
        } else {
            None
        };
        info!("closing {}", self.device.info().display_name);
        summary
    }
}
