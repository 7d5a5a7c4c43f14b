//! # audio-mix-core
//!
//! Real-time microphone mixing core.
//!
//! Fuses a line-in capture stream and a PDM microphone stream sample-by-
//! sample under hard real-time constraints: fixed pre-allocated block pools,
//! bounded non-blocking queues, and a lossy-by-design backpressure policy
//! (a frame that cannot be forwarded is dropped, never retried). Platform
//! hardware backends implement the `PdmDevice` / `LineInSource` /
//! `EncoderSink` traits and plug into the generic `MicMixSession`.
//!
//! ## Architecture
//!
//! ```text
//! audio-mix-core (this crate)
//! ├── traits/       ← PdmDevice, LineInSource, EncoderSink
//! ├── models/       ← MixError, MicMixConfig
//! ├── processing/   ← BlockPool, AudioQueue, fixed-point mixing math
//! ├── pdm/          ← capture driver adapter (mode lookup, FIR/IIR setup)
//! └── session/      ← MicMixSession (orchestrator + mixer thread)
//! ```

pub mod models;
pub mod pdm;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::MicMixConfig;
pub use models::error::MixError;
pub use pdm::{pdm_mode_for_rate, PdmChannelConfig, PdmStreamConfig, FIR_COEFFICIENTS};
pub use processing::audio_queue::{AudioQueue, QueueFull, QueueShape};
pub use processing::block_pool::{AudioBlock, BlockPool, PoolExhausted, ShapeMismatch};
pub use session::MicMixSession;
pub use traits::encoder_sink::EncoderSink;
pub use traits::line_in_source::LineInSource;
pub use traits::pdm_device::PdmDevice;
