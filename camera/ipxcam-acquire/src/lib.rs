//! The acquisition lifecycle on top of the [ipxcam] object model.
//!
//! A typical run opens a device with [AcquisitionSession::open] and calls
//! [AcquisitionSession::start], which
//!
//! 1. announces a [BufferPool] to the stream,
//! 2. locks the transport layer parameters, starts the stream and sends
//!    `AcquisitionStart` ([AcquisitionControl]), and
//! 3. spawns an [AcquisitionWorker] which fetches buffers, updates
//!    [FrameStatistics], hands each frame to a [FrameConsumer] and re-queues
//!    the buffer.
//!
//! [AcquisitionSession::stop] undoes these steps in reverse order.

pub mod discovery;
pub mod pool;
pub mod report;
pub mod sequence;
pub mod session;
pub mod stats;
pub mod trigger;
pub mod worker;

pub use discovery::{DeviceFilter, find_devices, parse_ipv4, repair_subnet, select_device, select_interface};
pub use pool::BufferPool;
pub use report::ConsoleReport;
pub use sequence::{AcquisitionControl, AcquisitionState, EndCommand, StopReport, StopStep};
pub use session::{AcquisitionSession, RunSummary, SessionSettings, tick_frequency};
pub use stats::{AcquisitionStats, FrameReport, FrameSample, FrameStatistics};
pub use trigger::{TriggerSettings, configure_trigger, trigger_frequency};
pub use worker::{AcquisitionWorker, FrameConsumer, NullConsumer, RawDumpConsumer, WorkerSettings};
