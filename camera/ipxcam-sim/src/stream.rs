//! The simulated acquisition engine.
//!
//! Buffers move between four states. `Announced` buffers sit in the pool,
//! `Input` buffers wait to be filled, `Output` buffers wait to be fetched and
//! `Delivered` buffers are owned by the client. A producer thread, running
//! while the stream is started, moves buffers from input to output.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, trace, warn};

use ipxcam::{
    Buffer, BufferId, Error, FetchError, FlushOperation, ParamTree, Result, StreamInfo, Timeout,
};

use crate::nodemap::{NodeMap, PAYLOAD_SIZE, TICK_FREQUENCY};
use crate::{Fault, Faults, ScriptedFrame};

/// How long an idle producer sleeps before re-checking its conditions.
const IDLE_POLL: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Announced,
    Input,
    Output,
    Delivered,
}

struct Slot {
    state: SlotState,
    /// `None` exactly while the client holds the buffer.
    buffer: Option<Buffer>,
    /// Deliver this buffer together with a transfer error.
    transfer_error: bool,
}

#[derive(Clone, Copy)]
struct Geometry {
    width: u32,
    height: u32,
    pixel_format: u32,
    payload: usize,
    tick_frequency: f64,
    frame_rate: f64,
}

struct Engine {
    slots: BTreeMap<BufferId, Slot>,
    input: VecDeque<BufferId>,
    output: VecDeque<BufferId>,
    next_buffer_id: u64,
    started: bool,
    frames_left: Option<u64>,
    cancel_pending: bool,
    delivered: u64,
    underrun: u64,
    /// Frames generated (or lost) since start in free-run mode.
    frame_index: u64,
    /// Position in the scripted frame list since start.
    script_pos: usize,
    geometry: Option<Geometry>,
    producer: Option<(thread_control::Control, std::thread::JoinHandle<()>)>,
}

impl Engine {
    fn slot_mut(&mut self, id: BufferId) -> Result<&mut Slot> {
        self.slots.get_mut(&id).ok_or(Error::InvalidBuffer(id))
    }

    fn count(&self, state: SlotState) -> usize {
        self.slots.values().filter(|s| s.state == state).count()
    }

    fn queue_unqueued(&mut self) {
        let ids: Vec<BufferId> = self
            .slots
            .iter()
            .filter(|(_, s)| s.state == SlotState::Announced)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.state = SlotState::Input;
            }
            self.input.push_back(id);
        }
    }

    fn discard(&mut self, ids: Vec<BufferId>) {
        for id in ids {
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.state = SlotState::Announced;
                slot.transfer_error = false;
            }
        }
    }
}

struct Shared {
    engine: Mutex<Engine>,
    cond: Condvar,
    params: Arc<NodeMap>,
    faults: Arc<Faults>,
    script: Option<Vec<ScriptedFrame>>,
    name: String,
}

/// Stream of a simulated camera.
pub struct SimStream {
    shared: Arc<Shared>,
    min_num_buffers: usize,
}

impl SimStream {
    pub(crate) fn new(
        name: &str,
        params: Arc<NodeMap>,
        faults: Arc<Faults>,
        script: Option<Vec<ScriptedFrame>>,
        min_num_buffers: usize,
    ) -> Self {
        let engine = Engine {
            slots: BTreeMap::new(),
            input: VecDeque::new(),
            output: VecDeque::new(),
            next_buffer_id: 0,
            started: false,
            frames_left: None,
            cancel_pending: false,
            delivered: 0,
            underrun: 0,
            frame_index: 0,
            script_pos: 0,
            geometry: None,
            producer: None,
        };
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                cond: Condvar::new(),
                params,
                faults,
                script,
                name: name.to_string(),
            }),
            min_num_buffers,
        }
    }

    fn geometry(&self) -> Result<Geometry> {
        let p = &self.shared.params;
        let pixel_format = match p.param("PixelFormat")?.kind {
            ipxcam::ParamKind::Enum { value, .. } => value as u32,
            _ => return Err("PixelFormat is not an enumeration".into()),
        };
        Ok(Geometry {
            width: p.int_value("Width")? as u32,
            height: p.int_value("Height")? as u32,
            pixel_format,
            payload: p.int_value(PAYLOAD_SIZE)? as usize,
            tick_frequency: p.float_value(TICK_FREQUENCY)?,
            frame_rate: p.float_value("AcquisitionFrameRate")?,
        })
    }

    /// Stop the producer thread, if any. The lock must not be held.
    fn join_producer(&self) {
        let producer = {
            let mut engine = self.shared.engine.lock();
            let producer = engine.producer.take();
            if let Some((control, _)) = &producer {
                // Stopping under the lock means the producer cannot miss it.
                control.stop();
            }
            self.shared.cond.notify_all();
            producer
        };
        if let Some((_control, join_handle)) = producer {
            if join_handle.join().is_err() {
                error!("producer thread of {} panicked", self.shared.name);
            }
        }
    }

    /// Stop acquisition if running. Used when the device closes.
    pub(crate) fn shutdown(&self) {
        let was_started = {
            let mut engine = self.shared.engine.lock();
            std::mem::replace(&mut engine.started, false)
        };
        if was_started {
            warn!("stream {} closed while acquiring", self.shared.name);
        }
        self.join_producer();
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn produce(shared: Arc<Shared>, flag: thread_control::Flag) {
    let mut engine = shared.engine.lock();
    let mut next_due = Instant::now();
    while flag.is_alive() {
        let geometry = match engine.geometry {
            Some(g) if engine.started => g,
            _ => break,
        };
        if !shared.params.is_acquiring() || engine.frames_left == Some(0) {
            shared.cond.wait_for(&mut engine, IDLE_POLL);
            next_due = Instant::now();
            continue;
        }
        match &shared.script {
            Some(script) => {
                let Some(frame) = script.get(engine.script_pos).cloned() else {
                    // script exhausted: nothing more will arrive
                    shared.cond.wait_for(&mut engine, IDLE_POLL);
                    continue;
                };
                if engine.input.is_empty() {
                    shared.cond.wait_for(&mut engine, IDLE_POLL);
                    continue;
                }
                engine.script_pos += 1;
                fill(
                    &shared,
                    &mut engine,
                    &geometry,
                    frame.frame_id,
                    frame.timestamp,
                    frame.incomplete,
                    frame.error,
                );
            }
            None => {
                let now = Instant::now();
                if now < next_due {
                    shared.cond.wait_until(&mut engine, next_due);
                    continue;
                }
                let period = 1.0 / geometry.frame_rate.max(0.1);
                next_due += Duration::from_secs_f64(period);
                engine.frame_index += 1;
                let frame_id = engine.frame_index;
                let timestamp = (frame_id as f64 * period * geometry.tick_frequency) as u64;
                if engine.input.is_empty() {
                    engine.underrun += 1;
                    trace!("underrun on {}, frame {frame_id} lost", shared.name);
                    continue;
                }
                fill(&shared, &mut engine, &geometry, frame_id, timestamp, false, false);
            }
        }
    }
    debug!(
        "closing thread {:?} ({:?}) in {}:{}",
        std::thread::current().name(),
        std::thread::current().id(),
        file!(),
        line!()
    );
}

fn fill(
    shared: &Shared,
    engine: &mut MutexGuard<Engine>,
    geometry: &Geometry,
    frame_id: u64,
    timestamp: u64,
    incomplete: bool,
    transfer_error: bool,
) {
    let Some(id) = engine.input.pop_front() else {
        return;
    };
    let Some(slot) = engine.slots.get_mut(&id) else {
        return;
    };
    let Some(buffer) = slot.buffer.as_mut() else {
        error!("queued buffer {id} has no memory");
        return;
    };
    let image_size = geometry.payload.min(buffer.buffer_size());
    buffer.data_mut()[..image_size].fill(frame_id as u8);
    let meta = buffer.meta_mut();
    meta.image_offset = 0;
    meta.image_size = image_size;
    meta.pixel_format = geometry.pixel_format;
    meta.width = geometry.width;
    meta.height = geometry.height;
    meta.frame_id = frame_id;
    meta.timestamp = timestamp;
    meta.incomplete = incomplete || image_size < geometry.payload;
    slot.state = SlotState::Output;
    slot.transfer_error = transfer_error;
    engine.output.push_back(id);
    if let Some(n) = engine.frames_left.as_mut() {
        *n = n.saturating_sub(1);
    }
    shared.cond.notify_all();
}

impl ipxcam::Stream for SimStream {
    fn buffer_size(&self) -> Result<usize> {
        Ok(self.shared.params.int_value(PAYLOAD_SIZE)? as usize)
    }

    fn min_num_buffers(&self) -> Result<usize> {
        Ok(self.min_num_buffers)
    }

    fn buffer_alignment(&self) -> usize {
        64
    }

    fn create_buffer(&self, size: usize) -> Result<BufferId> {
        if size == 0 {
            return Err(Error::InvalidArgument("buffer size must be non-zero".into()));
        }
        let mut engine = self.shared.engine.lock();
        if let Some(limit) = self.shared.faults.alloc_limit() {
            if engine.slots.len() >= limit {
                return Err(Error::OutOfMemory { size });
            }
        }
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| Error::OutOfMemory { size })?;
        data.resize(size, 0);
        let id = BufferId(engine.next_buffer_id);
        engine.next_buffer_id += 1;
        engine.slots.insert(
            id,
            Slot {
                state: SlotState::Announced,
                buffer: Some(Buffer::new(id, data)),
                transfer_error: false,
            },
        );
        trace!("announced buffer {id} of {size} bytes");
        Ok(id)
    }

    fn revoke_buffer(&self, id: BufferId) -> Result<()> {
        let mut engine = self.shared.engine.lock();
        let state = engine.slot_mut(id)?.state;
        if state != SlotState::Announced {
            return Err(Error::InvalidState(format!(
                "cannot revoke buffer {id} while {state:?}"
            )));
        }
        engine.slots.remove(&id);
        trace!("revoked buffer {id}");
        Ok(())
    }

    fn queue_buffer(&self, buffer: Buffer) -> Result<()> {
        let id = buffer.id();
        let mut engine = self.shared.engine.lock();
        let slot = engine.slot_mut(id)?;
        if slot.state != SlotState::Delivered {
            return Err(Error::InvalidState(format!(
                "buffer {id} queued while {:?}",
                slot.state
            )));
        }
        slot.state = SlotState::Input;
        slot.buffer = Some(buffer);
        engine.input.push_back(id);
        self.shared.cond.notify_all();
        Ok(())
    }

    fn get_buffer(&self, timeout: Timeout) -> std::result::Result<Buffer, FetchError> {
        let deadline = timeout.duration().map(|d| Instant::now() + d);
        let mut engine = self.shared.engine.lock();
        loop {
            if engine.cancel_pending {
                engine.cancel_pending = false;
                return Err(Error::Aborted.into());
            }
            if let Some(id) = engine.output.pop_front() {
                let slot = engine.slot_mut(id)?;
                slot.state = SlotState::Delivered;
                let transfer_error = std::mem::replace(&mut slot.transfer_error, false);
                let buffer = slot.buffer.take().ok_or(Error::InvalidBuffer(id))?;
                engine.delivered += 1;
                if transfer_error {
                    return Err(FetchError {
                        error: Error::IpxCamError {
                            msg: format!("transfer error on frame {}", buffer.frame_id()),
                        },
                        buffer: Some(buffer),
                    });
                }
                return Ok(buffer);
            }
            match deadline {
                None => self.shared.cond.wait(&mut engine),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(Error::Timeout.into());
                    }
                    self.shared.cond.wait_until(&mut engine, deadline);
                }
            }
        }
    }

    fn cancel_buffer(&self) -> Result<()> {
        let mut engine = self.shared.engine.lock();
        engine.cancel_pending = true;
        self.shared.cond.notify_all();
        Ok(())
    }

    fn flush_buffers(&self, op: FlushOperation) -> Result<()> {
        let mut engine = self.shared.engine.lock();
        match op {
            FlushOperation::OutputDiscard => {
                let ids: Vec<_> = engine.output.drain(..).collect();
                engine.discard(ids);
            }
            FlushOperation::AllToInput => {
                let ids: Vec<_> = engine.output.drain(..).collect();
                engine.discard(ids);
                engine.queue_unqueued();
            }
            FlushOperation::UnqueuedToInput => engine.queue_unqueued(),
            FlushOperation::AllDiscard => {
                let mut ids: Vec<_> = engine.output.drain(..).collect();
                ids.extend(engine.input.drain(..));
                engine.discard(ids);
            }
        }
        debug!("flushed {} with {op}", self.shared.name);
        Ok(())
    }

    fn start_acquisition(&self, num_frames: Option<u64>) -> Result<()> {
        if self.shared.faults.is_set(Fault::StreamStart) {
            return Err(Error::IpxCamError {
                msg: "injected failure starting stream".into(),
            });
        }
        let geometry = self.geometry()?;
        let mut engine = self.shared.engine.lock();
        if engine.started {
            return Err(Error::InvalidState("stream already started".into()));
        }
        if engine.slots.len() < self.min_num_buffers {
            return Err(Error::InvalidState(format!(
                "{} buffers announced, at least {} required",
                engine.slots.len(),
                self.min_num_buffers
            )));
        }
        engine.queue_unqueued();
        engine.started = true;
        engine.frames_left = num_frames;
        engine.cancel_pending = false;
        engine.frame_index = 0;
        engine.script_pos = 0;
        engine.geometry = Some(geometry);

        let (flag, control) = thread_control::make_pair();
        let shared = self.shared.clone();
        let thread_builder =
            std::thread::Builder::new().name(format!("ipxcam-sim-{}", self.shared.name));
        let join_handle = match thread_builder.spawn(move || produce(shared, flag)) {
            Ok(h) => h,
            Err(e) => {
                engine.started = false;
                return Err(e.into());
            }
        };
        engine.producer = Some((control, join_handle));
        debug!("stream {} started", self.shared.name);
        Ok(())
    }

    fn stop_acquisition(&self) -> Result<()> {
        {
            let mut engine = self.shared.engine.lock();
            if !engine.started {
                return Err(Error::InvalidState("stream not started".into()));
            }
            engine.started = false;
        }
        self.join_producer();
        debug!("stream {} stopped", self.shared.name);
        Ok(())
    }

    fn is_grabbing(&self) -> bool {
        self.shared.engine.lock().started
    }

    fn info(&self) -> StreamInfo {
        let engine = self.shared.engine.lock();
        StreamInfo {
            delivered: engine.delivered,
            underrun: engine.underrun,
            announced: engine.slots.len(),
            queued: engine.count(SlotState::Input),
            await_delivery: engine.count(SlotState::Output),
            started: engine.started,
        }
    }
}
