//! Fixed-point sample mixing.
//!
//! The mic signal is dominant: line-in samples are attenuated to a
//! percentage of their value and the full-scale mic sample is added on top.
//! All arithmetic is done in `i32` and the result is wrapped back to `i16`
//! with no saturation check — a sufficiently loud combined signal wraps.
//! This matches the capture hardware path bit-exactly and is a known
//! limitation.

use super::block_pool::AudioBlock;

/// Scale `sample` to `percent` of its value.
///
/// Integer division truncates toward zero, so `scale_level(-50, 30) == -15`.
pub fn scale_level(sample: i16, percent: u32) -> i16 {
    (i32::from(sample) * percent as i32 / 100) as i16
}

/// One mixed sample: full-scale `mic` plus `line` attenuated to `percent`.
pub fn mix_sample(mic: i16, line: i16, percent: u32) -> i16 {
    (i32::from(mic) + i32::from(line) * percent as i32 / 100) as i16
}

/// Merge a channel-interleaved mic snapshot into `line` in place.
///
/// The mic block is walked in interleaved order (even flat index = left,
/// odd = right). A sample at an odd index is summed into the line-in right
/// channel only when the line-in block actually has one; every other sample
/// is summed into the left channel, and the left cursor advances each time.
/// With a mono line-in block this folds both mic channels onto the single
/// channel at twice the frame rate; the cursors clamp at the channel length
/// instead of running past it.
pub fn mix_snapshot_into(line: &mut AudioBlock, mic: &AudioBlock, level_percent: u32) {
    let line_has_right = line.channel_count() > 1;
    let total = mic.total_samples();
    let mut left_cursor = 0usize;
    let mut right_cursor = 0usize;

    for index in 0..total {
        let mic_sample = mic.sample_at(index);
        if index & 1 == 1 && line_has_right {
            if let Some(slot) = line.channel_mut(1).get_mut(right_cursor) {
                *slot = mix_sample(mic_sample, *slot, level_percent);
            }
            right_cursor += 1;
        } else {
            if let Some(slot) = line.channel_mut(0).get_mut(left_cursor) {
                *slot = mix_sample(mic_sample, *slot, level_percent);
            }
            left_cursor += 1;
        }
    }
}
