use serde::{Deserialize, Serialize};

use super::error::MixError;

/// Configuration for a microphone mixing session.
///
/// Covers the PDM capture hardware knobs plus the mixing level. Queue sizing
/// is not configured here; it is negotiated from the encoder sink's input
/// queue at configure time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicMixConfig {
    /// Percentage of the line-in signal retained while mic audio is mixed
    /// over it (default: 50). The mic signal is always added at full scale.
    pub input_volume_level: u8,

    /// Microphone gain. Written to the hardware shifted left by 4 bits.
    pub microphone_gain: u8,

    /// PDM channel phase register value, applied to both channels.
    pub pdm_phase: u8,

    /// IIR decimation filter coefficient, applied to both channels.
    pub iir_coefficient: u32,

    /// Hardware channel index for the left microphone (default: 0).
    pub left_channel: u8,

    /// Hardware channel index for the right microphone (default: 1).
    pub right_channel: u8,
}

impl MicMixConfig {
    pub fn validate(&self) -> Result<(), MixError> {
        if self.input_volume_level > 100 {
            return Err(MixError::InvalidArgument(format!(
                "input volume level {}% exceeds 100%",
                self.input_volume_level
            )));
        }
        if self.left_channel == self.right_channel {
            return Err(MixError::InvalidArgument(format!(
                "left and right mic channels both map to {}",
                self.left_channel
            )));
        }
        if self.left_channel >= 8 || self.right_channel >= 8 {
            return Err(MixError::InvalidArgument(
                "mic channel index out of range (0..8)".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MicMixConfig {
    fn default() -> Self {
        Self {
            input_volume_level: 50,
            microphone_gain: 16,
            pdm_phase: 0,
            iir_coefficient: 4,
            left_channel: 0,
            right_channel: 1,
        }
    }
}
