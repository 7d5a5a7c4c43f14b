use crate::models::error::MixError;
use crate::pdm::{PdmChannelConfig, PdmStreamConfig};
use crate::processing::block_pool::AudioBlock;

/// Interface to the PDM microphone capture hardware.
///
/// Implemented by platform backends; the core only drives the register-level
/// sequence (stream binding, per-channel phase/gain/filters, decimator mode)
/// and polls completed capture blocks. All methods may be called from the
/// configuration context; `read` is additionally called from the mixer
/// thread and must never block.
pub trait PdmDevice: Send + Sync {
    /// Bind the capture stream to its receive arena and channel map.
    fn configure_stream(&self, config: &PdmStreamConfig) -> Result<(), MixError>;

    fn set_channel_phase(&self, channel: u8, phase: u8) -> Result<(), MixError>;

    fn set_channel_gain(&self, channel: u8, gain: u16) -> Result<(), MixError>;

    /// Load the FIR/IIR decimation coefficient block for one channel.
    fn apply_channel_filter(&self, config: &PdmChannelConfig) -> Result<(), MixError>;

    /// Select the discrete oversampling mode derived from the sampling rate.
    fn set_decimator_mode(&self, mode: u8) -> Result<(), MixError>;

    /// Start continuous capture into the bound arena.
    fn start(&self) -> Result<(), MixError>;

    /// The most recently completed capture block, or `None` if nothing is
    /// ready. Non-blocking. The caller owns the returned block and must
    /// release it to the mic queue's pool after use.
    fn read(&self) -> Option<AudioBlock>;
}
