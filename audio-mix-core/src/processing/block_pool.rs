use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

/// Non-blocking acquire failed: every block in the pool is in flight.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("block pool exhausted")]
pub struct PoolExhausted;

/// Copy between two blocks whose layouts do not match.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("block shape mismatch")]
pub struct ShapeMismatch;

static NEXT_POOL_TAG: AtomicU32 = AtomicU32::new(1);

/// One fixed-duration chunk of multi-channel PCM audio.
///
/// Samples are stored planar, one `i16` array per channel, all channels the
/// same length. The layout is fixed when the owning [`BlockPool`] is built
/// and is identical for every block of that pool. The provenance tag records
/// which pool the block was acquired from so a release to the wrong pool can
/// be detected.
#[derive(Debug)]
pub struct AudioBlock {
    channels: Vec<Vec<i16>>,
    pool_tag: u32,
}

impl AudioBlock {
    fn new(channel_count: usize, samples_per_channel: usize, pool_tag: u32) -> Self {
        Self {
            channels: vec![vec![0i16; samples_per_channel]; channel_count],
            pool_tag,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn samples_per_channel(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Total sample count across all channels.
    pub fn total_samples(&self) -> usize {
        self.channel_count() * self.samples_per_channel()
    }

    pub fn channel(&self, channel: usize) -> &[i16] {
        &self.channels[channel]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [i16] {
        &mut self.channels[channel]
    }

    /// Read the block as if it were channel-interleaved: flat index `i` maps
    /// to `channel(i % channel_count)[i / channel_count]`. For a stereo block
    /// even indices are left samples and odd indices are right samples; for a
    /// mono block this is plain sequential order.
    pub fn sample_at(&self, index: usize) -> i16 {
        let cc = self.channel_count();
        self.channels[index % cc][index / cc]
    }

    /// Tag of the pool this block was acquired from.
    pub fn pool_tag(&self) -> u32 {
        self.pool_tag
    }

    pub fn same_shape(&self, other: &AudioBlock) -> bool {
        self.channel_count() == other.channel_count()
            && self.samples_per_channel() == other.samples_per_channel()
    }

    /// Typed whole-block copy. Both blocks must have the same layout; shape
    /// is validated here rather than assumed by the caller.
    pub fn copy_from(&mut self, src: &AudioBlock) -> Result<(), ShapeMismatch> {
        if !self.same_shape(src) {
            return Err(ShapeMismatch);
        }
        for (dst, src) in self.channels.iter_mut().zip(&src.channels) {
            dst.copy_from_slice(src);
        }
        Ok(())
    }
}

/// Fixed-capacity acquire/release allocator for [`AudioBlock`]s.
///
/// All blocks are allocated up front; `acquire` and `release` only move
/// blocks between the free list and the caller. There is no blocking and no
/// resizing. Every successful acquire must be paired with exactly one
/// release, on every exit path, or the pool leaks toward permanent
/// starvation.
#[derive(Debug)]
pub struct BlockPool {
    tag: u32,
    capacity: usize,
    channel_count: usize,
    samples_per_channel: usize,
    free: Mutex<Vec<AudioBlock>>,
}

impl BlockPool {
    pub fn new(capacity: usize, channel_count: usize, samples_per_channel: usize) -> Self {
        let tag = NEXT_POOL_TAG.fetch_add(1, Ordering::Relaxed);
        let free = (0..capacity)
            .map(|_| AudioBlock::new(channel_count, samples_per_channel, tag))
            .collect();
        Self {
            tag,
            capacity,
            channel_count,
            samples_per_channel,
            free: Mutex::new(free),
        }
    }

    /// Mint a block carrying this pool's tag without touching the free list.
    /// Lets tests fill a FIFO to capacity while leaving pool blocks free;
    /// minted blocks must be dropped, not released.
    #[cfg(test)]
    pub(crate) fn mint_extra_block(&self) -> AudioBlock {
        AudioBlock::new(self.channel_count, self.samples_per_channel, self.tag)
    }

    /// Take a free block. Fails immediately when every block is in flight.
    pub fn acquire(&self) -> Result<AudioBlock, PoolExhausted> {
        self.free.lock().pop().ok_or(PoolExhausted)
    }

    /// Return a block to the free list.
    ///
    /// A block acquired from a different pool is logged and discarded instead
    /// of being mixed into this pool's free list.
    pub fn release(&self, block: AudioBlock) {
        if block.pool_tag != self.tag {
            log::warn!(
                "discarding block released to foreign pool (tag {} != {})",
                block.pool_tag,
                self.tag
            );
            return;
        }
        debug_assert_eq!(block.channel_count(), self.channel_count);
        debug_assert_eq!(block.samples_per_channel(), self.samples_per_channel);
        let mut free = self.free.lock();
        debug_assert!(free.len() < self.capacity);
        free.push(block);
    }

    /// Number of blocks currently free.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }
}
