//! PDM capture driver adapter.
//!
//! Translates a mixing session's negotiated queue shape into the concrete
//! capture configuration the hardware expects: oversampling mode from the
//! sampling rate, per-channel gain/phase, and the fixed FIR plus configured
//! IIR decimation coefficients. Nothing here touches registers directly;
//! the [`PdmDevice`] trait is the seam to the platform backend.

use std::sync::Arc;

use crate::models::config::MicMixConfig;
use crate::models::error::MixError;
use crate::processing::audio_queue::AudioQueue;
use crate::traits::pdm_device::PdmDevice;

/// PCM channels delivered by the PDM microphone pair.
pub const MIC_CHANNEL_COUNT: usize = 2;

/// Fixed 18-tap FIR decimation coefficient set, loaded into both channels.
pub const FIR_COEFFICIENTS: [u32; 18] = [
    0x0000_0001,
    0x0000_0003,
    0x0000_0003,
    0x0000_07F4,
    0x0000_0004,
    0x0000_07ED,
    0x0000_07F5,
    0x0000_07F4,
    0x0000_07D3,
    0x0000_07FE,
    0x0000_07BC,
    0x0000_07E5,
    0x0000_07D9,
    0x0000_0793,
    0x0000_0029,
    0x0000_072C,
    0x0000_0072,
    0x0000_02FD,
];

/// Map a sampling frequency to the decimator's discrete oversampling mode.
///
/// Only the six listed rates exist in hardware; anything else is rejected
/// before any device call is made.
pub fn pdm_mode_for_rate(sampling_freq_hz: u32) -> Option<u8> {
    match sampling_freq_hz {
        192_000 => Some(9),
        96_000 => Some(8),
        48_000 => Some(6),
        32_000 => Some(5),
        16_000 => Some(2),
        8_000 => Some(1),
        _ => None,
    }
}

/// Stream-level capture binding handed to the device.
///
/// The queue's pool is the receive arena: the device acquires blocks from
/// it as captures complete and hands them out through `PdmDevice::read`.
#[derive(Clone)]
pub struct PdmStreamConfig {
    pub queue: Arc<AudioQueue>,
    pub channel_count: usize,
    /// Bitmap of hardware channel indices to enable.
    pub channel_map: u32,
    /// Bytes of interleaved PCM per completed capture block.
    pub block_bytes: usize,
}

/// Decimation filter block for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdmChannelConfig {
    pub channel: u8,
    pub fir: [u32; 18],
    pub iir: u32,
}

/// Configure `dev` for continuous capture into `queue`.
///
/// Sampling-rate lookup happens first; an unsupported rate fails with
/// `InvalidArgument` and the device is never touched. Any device refusal
/// afterwards surfaces as-is (a `DeviceError` from the backend).
pub fn configure_pdm_source(
    dev: &dyn PdmDevice,
    queue: &Arc<AudioQueue>,
    config: &MicMixConfig,
) -> Result<(), MixError> {
    let shape = queue.shape();
    let mode = pdm_mode_for_rate(shape.sampling_freq_hz).ok_or_else(|| {
        log::error!("unsupported sampling frequency {}", shape.sampling_freq_hz);
        MixError::InvalidArgument(format!(
            "unsupported sampling frequency {}",
            shape.sampling_freq_hz
        ))
    })?;

    let stream = PdmStreamConfig {
        queue: Arc::clone(queue),
        channel_count: MIC_CHANNEL_COUNT,
        channel_map: (1 << config.left_channel) | (1 << config.right_channel),
        block_bytes: shape.samples_per_frame() * MIC_CHANNEL_COUNT * std::mem::size_of::<i16>(),
    };
    dev.configure_stream(&stream).map_err(|e| {
        log::error!("failed to configure PDM stream: {e}");
        e
    })?;

    for &channel in &[config.left_channel, config.right_channel] {
        dev.set_channel_phase(channel, config.pdm_phase)?;
        dev.set_channel_gain(channel, u16::from(config.microphone_gain) << 4)?;
        dev.apply_channel_filter(&PdmChannelConfig {
            channel,
            fir: FIR_COEFFICIENTS,
            iir: config.iir_coefficient,
        })?;
    }

    dev.set_decimator_mode(mode)?;

    dev.start().map_err(|e| {
        log::error!("failed to start PDM capture: {e}");
        e
    })
}
