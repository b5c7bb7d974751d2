use std::sync::Arc;

use tracing::{debug, error, warn};

use ipxcam::{BufferId, Error, FlushOperation, Result, Stream};

/// The buffers announced to one stream.
///
/// Created buffers stay announced until [BufferPool::release], which also
/// runs on drop. The stream must be stopped before the pool is released,
/// otherwise the engine still owns some buffers and revoking them fails.
pub struct BufferPool<S: Stream + ?Sized> {
    stream: Arc<S>,
    ids: Vec<BufferId>,
    buffer_size: usize,
}

impl<S: Stream + ?Sized> BufferPool<S> {
    /// Announce `count` buffers of [Stream::buffer_size] bytes.
    ///
    /// On failure every buffer created so far is revoked before the error is
    /// returned.
    pub fn allocate(stream: Arc<S>, count: usize) -> Result<Self> {
        let min = stream.min_num_buffers()?;
        if count < min {
            return Err(Error::InvalidArgument(format!(
                "{count} buffers requested, stream needs at least {min}"
            )));
        }
        let buffer_size = stream.buffer_size()?;
        let mut pool = Self {
            stream,
            ids: Vec::with_capacity(count),
            buffer_size,
        };
        for _ in 0..count {
            match pool.stream.create_buffer(buffer_size) {
                Ok(id) => pool.ids.push(id),
                Err(e) => {
                    warn!(
                        "allocating buffer {} of {count} failed: {e}",
                        pool.ids.len() + 1
                    );
                    if let Err(e2) = pool.release() {
                        error!("while unwinding buffer allocation: {e2}");
                    }
                    return Err(e);
                }
            }
        }
        debug!("announced {count} buffers of {buffer_size} bytes");
        Ok(pool)
    }

    /// Announce exactly [Stream::min_num_buffers] buffers.
    pub fn allocate_default(stream: Arc<S>) -> Result<Self> {
        let count = stream.min_num_buffers()?;
        Self::allocate(stream, count)
    }

    /// Put every announced buffer which is not queued into the input queue.
    pub fn queue_all(&self) -> Result<()> {
        self.stream.flush_buffers(FlushOperation::UnqueuedToInput)
    }

    /// Discard all queued buffers and revoke every buffer of the pool.
    ///
    /// Every revocation is attempted. The first error encountered is
    /// returned. Calling this on an empty pool does nothing.
    pub fn release(&mut self) -> Result<()> {
        if self.ids.is_empty() {
            return Ok(());
        }
        let mut first_err = self.stream.flush_buffers(FlushOperation::AllDiscard).err();
        for id in self.ids.drain(..) {
            if let Err(e) = self.stream.revoke_buffer(id) {
                warn!("revoking buffer {id}: {e}");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => {
                debug!("buffer pool released");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[BufferId] {
        &self.ids
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn stream(&self) -> &Arc<S> {
        &self.stream
    }
}

impl<S: Stream + ?Sized> Drop for BufferPool<S> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("releasing buffer pool: {e}");
        }
    }
}
