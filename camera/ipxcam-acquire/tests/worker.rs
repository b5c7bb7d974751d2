use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing_test::traced_test;

use ipxcam::{
    Buffer, BufferId, Device, FetchError, FlushOperation, Interface, ParamTree, Result, Stream,
    StreamInfo, System, Timeout,
};
use ipxcam_acquire::{
    AcquisitionSession, AcquisitionWorker, BufferPool, ConsoleReport, NullConsumer,
    RawDumpConsumer, SessionSettings, WorkerSettings,
};
use ipxcam_sim::{ScriptedFrame, SimCameraSpec, SimDevice, SimStream, SimSystem};
use ipxcam_types::DeviceAccess;

/// Wraps a stream and counts how often each buffer is handed out and queued.
struct RecordingStream<S> {
    inner: Arc<S>,
    fetched: Mutex<BTreeMap<BufferId, usize>>,
    queued: Mutex<BTreeMap<BufferId, usize>>,
}

impl<S: Stream> RecordingStream<S> {
    fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            fetched: Mutex::new(BTreeMap::new()),
            queued: Mutex::new(BTreeMap::new()),
        }
    }

    fn total_fetched(&self) -> usize {
        self.fetched.lock().values().sum()
    }

    fn total_queued(&self) -> usize {
        self.queued.lock().values().sum()
    }
}

impl<S: Stream> Stream for RecordingStream<S> {
    fn buffer_size(&self) -> Result<usize> {
        self.inner.buffer_size()
    }
    fn min_num_buffers(&self) -> Result<usize> {
        self.inner.min_num_buffers()
    }
    fn buffer_alignment(&self) -> usize {
        self.inner.buffer_alignment()
    }
    fn create_buffer(&self, size: usize) -> Result<BufferId> {
        self.inner.create_buffer(size)
    }
    fn revoke_buffer(&self, id: BufferId) -> Result<()> {
        self.inner.revoke_buffer(id)
    }
    fn queue_buffer(&self, buffer: Buffer) -> Result<()> {
        *self.queued.lock().entry(buffer.id()).or_default() += 1;
        self.inner.queue_buffer(buffer)
    }
    fn get_buffer(&self, timeout: Timeout) -> std::result::Result<Buffer, FetchError> {
        let result = self.inner.get_buffer(timeout);
        let id = match &result {
            Ok(b) => Some(b.id()),
            Err(e) => e.buffer.as_ref().map(|b| b.id()),
        };
        if let Some(id) = id {
            *self.fetched.lock().entry(id).or_default() += 1;
        }
        result
    }
    fn cancel_buffer(&self) -> Result<()> {
        self.inner.cancel_buffer()
    }
    fn flush_buffers(&self, op: FlushOperation) -> Result<()> {
        self.inner.flush_buffers(op)
    }
    fn start_acquisition(&self, num_frames: Option<u64>) -> Result<()> {
        self.inner.start_acquisition(num_frames)
    }
    fn stop_acquisition(&self) -> Result<()> {
        self.inner.stop_acquisition()
    }
    fn is_grabbing(&self) -> bool {
        self.inner.is_grabbing()
    }
    fn info(&self) -> StreamInfo {
        self.inner.info()
    }
}

fn open(spec: SimCameraSpec) -> (SimSystem, SimDevice) {
    let system = SimSystem::new(vec![spec]).unwrap();
    let iface = system.interfaces().unwrap().take(0).unwrap();
    let info = iface.device_info_list().unwrap().take(0).unwrap();
    let device = iface.create_device(&info, DeviceAccess::Control).unwrap();
    (system, device)
}

fn scripted(serial: &str, frames: Vec<ScriptedFrame>) -> SimCameraSpec {
    let mut spec = SimCameraSpec::new(serial);
    spec.width = 16;
    spec.height = 4;
    spec.frames = Some(frames);
    spec
}

fn frames(ids: &[u64]) -> Vec<ScriptedFrame> {
    ids.iter()
        .map(|id| ScriptedFrame::new(*id, id * 1_000_000))
        .collect()
}

fn settings(serial: &str, timeout: Timeout, num_frames: Option<u64>) -> WorkerSettings {
    WorkerSettings {
        serial: serial.to_string(),
        timeout,
        num_frames,
        tick_frequency: 1e9,
        buffer_size: 64,
        trigger_frequency: None,
    }
}

/// Start the stream and camera without parameter locking.
fn start(
    device: &SimDevice,
) -> (
    Arc<RecordingStream<SimStream>>,
    BufferPool<RecordingStream<SimStream>>,
) {
    let stream = Arc::new(RecordingStream::new(device.stream(0).unwrap()));
    let pool = BufferPool::allocate_default(stream.clone()).unwrap();
    stream.start_acquisition(None).unwrap();
    device.camera_parameters().execute("AcquisitionStart").unwrap();
    (stream, pool)
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let t0 = Instant::now();
    while !done() {
        assert!(t0.elapsed() < Duration::from_secs(10), "timed out");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[traced_test]
#[test]
fn test_every_buffer_requeued_once() {
    let (_system, device) = open(scripted("r", frames(&[10, 11, 13, 14])));
    let (stream, _pool) = start(&device);
    let worker = AcquisitionWorker::spawn(
        stream.clone(),
        NullConsumer,
        settings("r", Timeout::Infinite, Some(4)),
        ConsoleReport::silent(),
    )
    .unwrap();
    wait_until(|| worker.is_finished());
    let stats = worker.join().unwrap();
    assert_eq!(stats.frames, 4);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.drops_after, vec![11]);
    assert_eq!(*stream.fetched.lock(), *stream.queued.lock());
    assert_eq!(stream.total_fetched(), 4);
    stream.stop_acquisition().unwrap();
}

#[traced_test]
#[test]
fn test_timeout_without_buffer() {
    let (_system, device) = open(scripted("t", vec![]));
    let (stream, _pool) = start(&device);
    let worker = AcquisitionWorker::spawn(
        stream.clone(),
        NullConsumer,
        settings("t", Timeout::After(Duration::from_millis(5)), None),
        ConsoleReport::silent(),
    )
    .unwrap();
    std::thread::sleep(Duration::from_millis(50));
    let stats = worker.stop().unwrap();
    assert!(stats.timeouts > 0);
    assert_eq!(stats.frames, 0);
    assert_eq!(stream.total_queued(), 0);
    stream.stop_acquisition().unwrap();
}

#[traced_test]
#[test]
fn test_cancel_infinite_wait() {
    let (_system, device) = open(scripted("c", vec![]));
    let (stream, _pool) = start(&device);
    let worker = AcquisitionWorker::spawn(
        stream.clone(),
        NullConsumer,
        settings("c", Timeout::Infinite, None),
        ConsoleReport::silent(),
    )
    .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let t0 = Instant::now();
    let stats = worker.stop().unwrap();
    assert!(t0.elapsed() < Duration::from_secs(2));
    assert_eq!(stats.errors, 0);
    stream.stop_acquisition().unwrap();
}

#[traced_test]
#[test]
fn test_consumer_failures_still_requeue() {
    let (_system, device) = open(scripted("p", frames(&[1, 2, 3])));
    let (stream, _pool) = start(&device);
    let consumer = |buffer: &Buffer| -> anyhow::Result<()> {
        match buffer.frame_id() {
            2 => panic!("consumer bug"),
            3 => anyhow::bail!("disk full"),
            _ => Ok(()),
        }
    };
    let worker = AcquisitionWorker::spawn(
        stream.clone(),
        consumer,
        settings("p", Timeout::Infinite, Some(3)),
        ConsoleReport::silent(),
    )
    .unwrap();
    wait_until(|| worker.is_finished());
    let stats = worker.join().unwrap();
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.consumer_errors, 2);
    assert_eq!(stream.total_queued(), 3);
    assert_eq!(*stream.fetched.lock(), *stream.queued.lock());
    stream.stop_acquisition().unwrap();
}

#[traced_test]
#[test]
fn test_transfer_error_buffer_requeued() {
    let mut script = frames(&[1, 2]);
    script[0].error = true;
    let (_system, device) = open(scripted("e", script));
    let (stream, _pool) = start(&device);
    let worker = AcquisitionWorker::spawn(
        stream.clone(),
        NullConsumer,
        settings("e", Timeout::Infinite, Some(2)),
        ConsoleReport::silent(),
    )
    .unwrap();
    wait_until(|| worker.is_finished());
    let stats = worker.join().unwrap();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.frames, 1);
    assert_eq!(stream.total_queued(), 2);
    stream.stop_acquisition().unwrap();
}

#[traced_test]
#[test]
fn test_raw_dump() {
    let tmp = tempfile::tempdir().unwrap();
    let (_system, device) = open(scripted("d", frames(&[5, 6])));
    let mut session = AcquisitionSession::from_device(device).unwrap();
    let consumer = RawDumpConsumer::new(tmp.path().join("frames"), "d").unwrap();
    let settings = SessionSettings {
        num_frames: Some(2),
        ..Default::default()
    };
    session
        .start(&settings, consumer.clone(), ConsoleReport::silent())
        .unwrap();
    wait_until(|| session.is_finished());
    let summary = session.stop().unwrap();
    assert_eq!(summary.stats.frames, 2);
    for id in [5u64, 6] {
        let data = std::fs::read(consumer.path_for(id)).unwrap();
        assert_eq!(data.len(), 16 * 4);
        assert!(data.iter().all(|b| *b == id as u8));
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[traced_test]
#[test]
fn test_two_devices_share_report() {
    let system = SimSystem::new(vec![
        scripted("a", frames(&[1, 2, 3])),
        scripted("b", frames(&[7, 9])),
    ])
    .unwrap();
    let iface = system.interfaces().unwrap().take(0).unwrap();
    let buf = SharedBuf::default();
    let report = ConsoleReport::new(Box::new(buf.clone()));
    let mut sessions = Vec::new();
    for (info, n) in iface.device_info_list().unwrap().into_iter().zip([3, 2]) {
        let mut session = AcquisitionSession::open(&iface, &info, DeviceAccess::Control).unwrap();
        let settings = SessionSettings {
            num_frames: Some(n),
            ..Default::default()
        };
        session.start(&settings, NullConsumer, report.clone()).unwrap();
        sessions.push(session);
    }
    for session in sessions.iter_mut() {
        wait_until(|| session.is_finished());
        session.stop().unwrap();
    }
    let text = String::from_utf8(buf.0.lock().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.iter().filter(|l| l.starts_with("a FID:")).count(), 3);
    assert_eq!(lines.iter().filter(|l| l.starts_with("b FID:")).count(), 2);
    assert!(lines.contains(&"b summary: frames: 2, dropped: 1, incomplete: 0, timeouts: 0, errors: 0"));
}

#[traced_test]
#[test]
fn test_frame_limit_counts_failed_deliveries() {
    let mut script = frames(&[1, 2, 3]);
    script[1].error = true;
    let (_system, device) = open(scripted("l", script));
    let mut session = AcquisitionSession::from_device(device).unwrap();
    let settings = SessionSettings {
        num_frames: Some(3),
        ..Default::default()
    };
    session
        .start(&settings, NullConsumer, ConsoleReport::silent())
        .unwrap();
    wait_until(|| session.is_finished());
    let summary = session.stop().unwrap();
    assert_eq!(summary.stats.frames, 2);
    assert_eq!(summary.stats.errors, 1);
    assert!(summary.stop.is_clean());
    assert_eq!(session.stream().num_announced(), 0);
}

#[traced_test]
#[test]
fn test_duration_spans_consumer() {
    let (_system, device) = open(scripted("w", frames(&[1, 2])));
    let (stream, _pool) = start(&device);
    let buf = SharedBuf::default();
    let slow = |_: &Buffer| -> anyhow::Result<()> {
        std::thread::sleep(Duration::from_millis(30));
        Ok(())
    };
    let worker = AcquisitionWorker::spawn(
        stream.clone(),
        slow,
        settings("w", Timeout::Infinite, Some(2)),
        ConsoleReport::new(Box::new(buf.clone())),
    )
    .unwrap();
    wait_until(|| worker.is_finished());
    worker.join().unwrap();
    let text = String::from_utf8(buf.0.lock().clone()).unwrap();
    let durations: Vec<u64> = text
        .lines()
        .filter(|l| l.starts_with("w FID:"))
        .map(|l| l.rsplit("dur:").next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(durations.len(), 2);
    assert_eq!(durations[0], 0);
    assert!(durations[1] >= 30, "{durations:?}");
    stream.stop_acquisition().unwrap();
}
