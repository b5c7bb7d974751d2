//! Parameter lock and acquisition command sequencing.
//!
//! Starting a camera is a three step sequence: lock the transport layer
//! parameters, start the stream engine, then send `AcquisitionStart`. Stopping
//! reverses it. [AcquisitionControl] runs both sequences and guarantees the
//! parameters end up unlocked whatever fails along the way.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use ipxcam::{Device, Error, ParamTree, Result, Stream};

pub const TL_PARAMS_LOCKED: &str = "TLParamsLocked";
pub const ACQUISITION_START: &str = "AcquisitionStart";
pub const ACQUISITION_STOP: &str = "AcquisitionStop";
pub const ACQUISITION_ABORT: &str = "AcquisitionAbort";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AcquisitionState {
    Idle,
    /// `TLParamsLocked` is 1, the stream is not started.
    Locked,
    Streaming,
    /// An end command is being sent.
    Draining,
    /// The stream engine is stopped, parameters still locked.
    Stopped,
    Unlocked,
}

/// The command which ended acquisition on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndCommand {
    Stop,
    Abort,
}

/// A step of the stop sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopStep {
    AcquisitionStop,
    AcquisitionAbort,
    StopStream,
    Unlock,
}

/// Outcome of [AcquisitionControl::stop].
#[derive(Debug, Default)]
pub struct StopReport {
    /// `None` if both `AcquisitionStop` and `AcquisitionAbort` failed.
    pub end_command: Option<EndCommand>,
    pub errors: Vec<(StopStep, Error)>,
}

impl StopReport {
    /// True if every step of the stop sequence succeeded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, step: StopStep, e: Error) {
        warn!("{step:?} failed: {e}");
        self.errors.push((step, e));
    }
}

/// Drives the lock/start/stop/unlock sequence of one device and stream.
///
/// All transitions take `&mut self`, which serializes them per device.
/// Dropping a control that is still streaming runs [AcquisitionControl::stop].
pub struct AcquisitionControl<D: Device> {
    device: Arc<D>,
    stream: Arc<D::Stream>,
    state: AcquisitionState,
}

impl<D: Device> AcquisitionControl<D> {
    pub fn new(device: Arc<D>, stream: Arc<D::Stream>) -> Self {
        Self {
            device,
            stream,
            state: AcquisitionState::Idle,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    fn set_state(&mut self, state: AcquisitionState) {
        debug!(
            "{}: {:?} -> {:?}",
            self.device.info().serial,
            self.state,
            state
        );
        self.state = state;
    }

    fn unlock(&self) -> Result<()> {
        self.device
            .camera_parameters()
            .set_int_value(TL_PARAMS_LOCKED, 0)
    }

    /// Lock parameters, start the stream, then send `AcquisitionStart`.
    ///
    /// Either every step succeeds and the control is
    /// [AcquisitionState::Streaming], or the steps already taken are undone
    /// and the control is back at [AcquisitionState::Idle].
    pub fn start(&mut self, num_frames: Option<u64>) -> Result<()> {
        if self.state != AcquisitionState::Idle {
            return Err(Error::InvalidState(format!(
                "cannot start acquisition while {:?}",
                self.state
            )));
        }
        let params = self.device.camera_parameters();
        params.set_int_value(TL_PARAMS_LOCKED, 1)?;
        self.set_state(AcquisitionState::Locked);

        if let Err(e) = self.stream.start_acquisition(num_frames) {
            error!("starting stream: {e}");
            self.unwind_start();
            return Err(e);
        }

        if let Err(e) = self.device.camera_parameters().execute(ACQUISITION_START) {
            error!("{ACQUISITION_START}: {e}");
            if let Err(e2) = self.stream.stop_acquisition() {
                warn!("stopping stream after failed start: {e2}");
            }
            self.unwind_start();
            return Err(e);
        }
        self.set_state(AcquisitionState::Streaming);
        info!("acquisition started on {}", self.device.info().display_name);
        Ok(())
    }

    fn unwind_start(&mut self) {
        if let Err(e) = self.unlock() {
            error!("unlocking parameters after failed start: {e}");
        }
        self.set_state(AcquisitionState::Idle);
    }

    /// End acquisition.
    ///
    /// `AcquisitionStop` is tried first and `AcquisitionAbort` only if it
    /// fails. The stream is stopped and the parameters unlocked even if the
    /// end commands fail. Errors of the individual steps are collected in the
    /// returned report. The acquisition worker must be joined before calling
    /// this.
    pub fn stop(&mut self) -> Result<StopReport> {
        if self.state != AcquisitionState::Streaming {
            return Err(Error::InvalidState(format!(
                "cannot stop acquisition while {:?}",
                self.state
            )));
        }
        let mut report = StopReport::default();
        self.set_state(AcquisitionState::Draining);

        let params = self.device.camera_parameters();
        match params.execute(ACQUISITION_STOP) {
            Ok(()) => report.end_command = Some(EndCommand::Stop),
            Err(e) => {
                report.record(StopStep::AcquisitionStop, e);
                match params.execute(ACQUISITION_ABORT) {
                    Ok(()) => report.end_command = Some(EndCommand::Abort),
                    Err(e) => report.record(StopStep::AcquisitionAbort, e),
                }
            }
        }

        if let Err(e) = self.stream.stop_acquisition() {
            report.record(StopStep::StopStream, e);
        }
        self.set_state(AcquisitionState::Stopped);

        if let Err(e) = self.unlock() {
            report.record(StopStep::Unlock, e);
        }
        self.set_state(AcquisitionState::Unlocked);
        self.set_state(AcquisitionState::Idle);
        info!(
            "acquisition stopped on {} ({:?})",
            self.device.info().display_name,
            report.end_command
        );
        Ok(report)
    }
}

impl<D: Device> Drop for AcquisitionControl<D> {
    fn drop(&mut self) {
        if self.state == AcquisitionState::Streaming {
            warn!("acquisition control dropped while streaming");
            match self.stop() {
                Ok(report) => {
                    for (step, e) in report.errors {
                        error!("{step:?} failed during drop: {e}");
                    }
                }
                Err(e) => error!("{e}"),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pool::BufferPool;
    use crate::test_util::open_sim;
    use ipxcam_sim::{Fault, SimCameraSpec};

    fn setup() -> (
        ipxcam_sim::SimSystem,
        Arc<ipxcam_sim::SimDevice>,
        BufferPool<ipxcam_sim::SimStream>,
    ) {
        let (system, device) = open_sim(SimCameraSpec::new("c"));
        let device = Arc::new(device);
        let pool = BufferPool::allocate_default(device.stream(0).unwrap()).unwrap();
        (system, device, pool)
    }

    fn locked(device: &ipxcam_sim::SimDevice) -> i64 {
        device
            .camera_parameters()
            .int_value(TL_PARAMS_LOCKED)
            .unwrap()
    }

    #[test_log::test]
    fn test_start_stop() {
        let (system, device, _pool) = setup();
        let stream = device.stream(0).unwrap();
        let mut control = AcquisitionControl::new(device.clone(), stream.clone());
        control.start(None).unwrap();
        assert_eq!(control.state(), AcquisitionState::Streaming);
        assert_eq!(locked(&device), 1);
        assert!(stream.is_grabbing());
        assert!(matches!(control.start(None), Err(Error::InvalidState(_))));

        let report = control.stop().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.end_command, Some(EndCommand::Stop));
        assert_eq!(control.state(), AcquisitionState::Idle);
        assert_eq!(locked(&device), 0);
        assert!(!stream.is_grabbing());
        assert!(matches!(control.stop(), Err(Error::InvalidState(_))));

        let log = system.node_map("c").unwrap().command_log();
        assert_eq!(log, vec![ACQUISITION_START, ACQUISITION_STOP]);
    }

    #[test_log::test]
    fn test_lock_failure_aborts() {
        let (_system, device, _pool) = setup();
        device.faults().set(Fault::Lock, true);
        let mut control = AcquisitionControl::new(device.clone(), device.stream(0).unwrap());
        assert!(control.start(None).is_err());
        assert_eq!(control.state(), AcquisitionState::Idle);
        assert!(!device.stream(0).unwrap().is_grabbing());
    }

    #[test_log::test]
    fn test_stream_start_failure_unlocks() {
        let (_system, device, _pool) = setup();
        device.faults().set(Fault::StreamStart, true);
        let mut control = AcquisitionControl::new(device.clone(), device.stream(0).unwrap());
        assert!(control.start(None).is_err());
        assert_eq!(control.state(), AcquisitionState::Idle);
        assert_eq!(locked(&device), 0);
    }

    #[test_log::test]
    fn test_command_failure_stops_stream() {
        let (_system, device, _pool) = setup();
        device.faults().set(Fault::AcquisitionStart, true);
        let stream = device.stream(0).unwrap();
        let mut control = AcquisitionControl::new(device.clone(), stream.clone());
        assert!(control.start(None).is_err());
        assert!(!stream.is_grabbing());
        assert_eq!(locked(&device), 0);
        // a later start works once the fault is gone
        device.faults().clear();
        control.start(None).unwrap();
        control.stop().unwrap();
    }

    #[test_log::test]
    fn test_abort_only_after_failed_stop() {
        let (system, device, _pool) = setup();
        let map = system.node_map("c").unwrap();
        let mut control = AcquisitionControl::new(device.clone(), device.stream(0).unwrap());

        device.faults().set(Fault::AcquisitionStop, true);
        control.start(None).unwrap();
        map.clear_command_log();
        let report = control.stop().unwrap();
        assert_eq!(report.end_command, Some(EndCommand::Abort));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, StopStep::AcquisitionStop);
        assert_eq!(map.command_log(), vec![ACQUISITION_ABORT]);
        assert_eq!(locked(&device), 0);

        device.faults().set(Fault::AcquisitionAbort, true);
        control.start(None).unwrap();
        let report = control.stop().unwrap();
        assert_eq!(report.end_command, None);
        assert_eq!(report.errors.len(), 2);
        // unlock still happened
        assert_eq!(locked(&device), 0);
        assert_eq!(control.state(), AcquisitionState::Idle);
    }

    #[test_log::test]
    fn test_drop_stops() {
        let (system, device, _pool) = setup();
        let stream = device.stream(0).unwrap();
        {
            let mut control = AcquisitionControl::new(device.clone(), stream.clone());
            control.start(None).unwrap();
        }
        assert!(!stream.is_grabbing());
        assert_eq!(locked(&device), 0);
        assert!(
            system
                .node_map("c")
                .unwrap()
                .command_log()
                .contains(&ACQUISITION_STOP.to_string())
        );
    }
}
