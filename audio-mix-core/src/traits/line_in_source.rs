use std::sync::Arc;

use crate::models::error::MixError;
use crate::processing::audio_queue::AudioQueue;

/// A source of line-in audio blocks (e.g. an I2S codec input).
///
/// The source acquires blocks from the queue's pool, fills them and
/// enqueues them at its own cadence; the mixer consumes them in arrival
/// order.
pub trait LineInSource: Send + Sync {
    /// Bind the source to `queue` and start delivering blocks into it.
    fn configure(&self, queue: Arc<AudioQueue>) -> Result<(), MixError>;
}
