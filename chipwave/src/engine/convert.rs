//! U8 PCM to planar f32 conversion

use crate::decoder::SILENCE_U8;

/// Map an unsigned 8-bit sample to [-1.0, 0.992]
#[inline]
pub fn u8_to_f32(value: u8) -> f32 {
    (value as f32 - SILENCE_U8 as f32) / 128.0
}

/// Convert an interleaved U8 block to planar left/right
///
/// Mono duplicates channel 0 into both outputs. `block` must hold at least
/// `left.len() * channels` bytes.
pub fn to_planar(block: &[u8], channels: usize, left: &mut [f32], right: &mut [f32]) {
    match channels {
        1 => {
            for ((l, r), &b) in left.iter_mut().zip(right.iter_mut()).zip(block) {
                let v = u8_to_f32(b);
                *l = v;
                *r = v;
            }
        }
        _ => {
            for ((l, r), pair) in left
                .iter_mut()
                .zip(right.iter_mut())
                .zip(block.chunks_exact(2))
            {
                *l = u8_to_f32(pair[0]);
                *r = u8_to_f32(pair[1]);
            }
        }
    }
}
