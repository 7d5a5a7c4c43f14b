use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::block_pool::{AudioBlock, BlockPool};
use crate::models::error::MixError;

/// Upper bound on a single queue's block arena. Queue creation beyond this
/// fails with `OutOfMemory` instead of growing without limit.
pub const MAX_POOL_BYTES: usize = 1 << 20;

/// Non-blocking enqueue failed. Carries the rejected block back to the
/// caller, which must release it to its pool (or otherwise dispose of it)
/// rather than letting the frame stall the pipeline.
#[derive(Debug, Error)]
#[error("audio queue full")]
pub struct QueueFull(pub AudioBlock);

/// The layout every cooperating queue in a mixing session shares.
///
/// `item_count` bounds both the FIFO depth and the pool capacity, so at most
/// `item_count` blocks of a stream are ever in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueShape {
    pub item_count: usize,
    pub sampling_freq_hz: u32,
    pub frame_duration_us: u32,
    pub channel_count: usize,
}

impl QueueShape {
    /// Samples per channel in one frame, `sampling_freq * duration` with
    /// integer truncation.
    pub fn samples_per_frame(&self) -> usize {
        (u64::from(self.sampling_freq_hz) * u64::from(self.frame_duration_us) / 1_000_000) as usize
    }

    /// Bytes of PCM in one frame across all channels.
    pub fn frame_bytes(&self) -> usize {
        self.samples_per_frame() * self.channel_count * std::mem::size_of::<i16>()
    }

    /// Same timing triple, different channel layout.
    pub fn with_channels(mut self, channel_count: usize) -> Self {
        self.channel_count = channel_count;
        self
    }

    pub fn validate(&self) -> Result<(), MixError> {
        if self.item_count == 0 {
            return Err(MixError::InvalidArgument("queue item count is zero".into()));
        }
        if !(1..=2).contains(&self.channel_count) {
            return Err(MixError::InvalidArgument(format!(
                "unsupported channel count {}",
                self.channel_count
            )));
        }
        if self.samples_per_frame() == 0 {
            return Err(MixError::InvalidArgument(format!(
                "frame of {} us at {} Hz holds no samples",
                self.frame_duration_us, self.sampling_freq_hz
            )));
        }
        Ok(())
    }
}

/// Bounded FIFO of audio blocks backed by its own fixed [`BlockPool`].
///
/// Producers acquire a block from `pool()`, fill it and `try_enqueue` it;
/// the consumer takes blocks in arrival order and releases them back to the
/// pool when done. The enqueue side never blocks; the dequeue side offers
/// both a blocking wait (the mixer's input) and non-blocking variants.
#[derive(Debug)]
pub struct AudioQueue {
    shape: QueueShape,
    pool: BlockPool,
    fifo: Mutex<VecDeque<AudioBlock>>,
    ready: Condvar,
}

impl AudioQueue {
    pub fn new(shape: QueueShape) -> Result<Arc<Self>, MixError> {
        shape.validate()?;
        let arena_bytes = shape.item_count * shape.frame_bytes();
        if arena_bytes > MAX_POOL_BYTES {
            return Err(MixError::OutOfMemory(format!(
                "queue arena of {arena_bytes} bytes exceeds the {MAX_POOL_BYTES} byte limit"
            )));
        }
        Ok(Arc::new(Self {
            shape,
            pool: BlockPool::new(shape.item_count, shape.channel_count, shape.samples_per_frame()),
            fifo: Mutex::new(VecDeque::with_capacity(shape.item_count)),
            ready: Condvar::new(),
        }))
    }

    pub fn shape(&self) -> QueueShape {
        self.shape
    }

    /// The pool all of this queue's blocks live in.
    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.fifo.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.lock().is_empty()
    }

    /// Append a block without waiting. Fails when the FIFO is at capacity or
    /// the block does not belong to this queue's pool; either way the block
    /// comes back to the caller inside [`QueueFull`].
    pub fn try_enqueue(&self, block: AudioBlock) -> Result<(), QueueFull> {
        if block.pool_tag() != self.pool.tag() {
            log::warn!(
                "rejecting enqueue of block from foreign pool (tag {} != {})",
                block.pool_tag(),
                self.pool.tag()
            );
            return Err(QueueFull(block));
        }
        {
            let mut fifo = self.fifo.lock();
            if fifo.len() >= self.shape.item_count {
                return Err(QueueFull(block));
            }
            fifo.push_back(block);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Pop the oldest block, or `None` when the queue is empty.
    pub fn try_dequeue(&self) -> Option<AudioBlock> {
        self.fifo.lock().pop_front()
    }

    /// Pop the oldest block, waiting as long as it takes for one to arrive.
    /// Spurious wakeups are absorbed internally.
    pub fn dequeue_wait(&self) -> AudioBlock {
        let mut fifo = self.fifo.lock();
        loop {
            if let Some(block) = fifo.pop_front() {
                return block;
            }
            self.ready.wait(&mut fifo);
        }
    }

    /// Pop the oldest block, waiting at most `timeout` for one to arrive.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<AudioBlock> {
        let deadline = Instant::now() + timeout;
        let mut fifo = self.fifo.lock();
        loop {
            if let Some(block) = fifo.pop_front() {
                return Some(block);
            }
            if self.ready.wait_until(&mut fifo, deadline).timed_out() {
                return fifo.pop_front();
            }
        }
    }
}
