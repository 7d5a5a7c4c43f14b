use thiserror::Error;

/// Errors that can occur while setting up the mixing pipeline.
///
/// These are configuration-time failures only. Steady-state conditions on the
/// real-time path (`PoolExhausted`, `QueueFull`, a mic snapshot not being
/// ready) are expected non-blocking signals, carried by their own types in
/// `processing`, and are never surfaced through this enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MixError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("required device or queue not available")]
    NoDevice,

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("device error: {0}")]
    DeviceError(String),
}
