use std::sync::Arc;

use crate::processing::audio_queue::AudioQueue;

/// Downstream consumer of mixed audio blocks (e.g. an LC3 encoder).
///
/// The sink owns the queue the mixer pushes into; its shape is the template
/// the session derives the mic and line-in queues from.
pub trait EncoderSink: Send + Sync {
    /// The sink's current input queue, if one has been negotiated.
    fn input_queue(&self) -> Option<Arc<AudioQueue>>;
}
