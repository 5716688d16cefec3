//! Grayscale effect.
//!
//! Replaces every pixel with its luma, using Rec. 709 weights:
//! `Y = 0.2126 R + 0.7152 G + 0.0722 B`. The buffer is B, G, R ordered.

use super::FrameHook;

const WEIGHT_B: f32 = 0.0722;
const WEIGHT_G: f32 = 0.7152;
const WEIGHT_R: f32 = 0.2126;

#[derive(Debug, Default, Clone, Copy)]
pub struct Grayscale;

/// Luma of one BGR pixel.
#[inline]
pub fn luma(bgr: &[u8]) -> u8 {
    (bgr[0] as f32 * WEIGHT_B + bgr[1] as f32 * WEIGHT_G + bgr[2] as f32 * WEIGHT_R) as u8
}

impl FrameHook for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn update(&mut self, width: usize, height: usize, buffer: &mut [u8]) {
        let len = (width * height * 3).min(buffer.len());
        for pixel in buffer[..len].chunks_exact_mut(3) {
            let y = luma(pixel);
            pixel.fill(y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(&[0, 0, 255]), 54);
        assert_eq!(luma(&[0, 255, 0]), 182);
        assert_eq!(luma(&[255, 0, 0]), 18);
    }

    #[test]
    fn test_every_pixel_is_converted() {
        let mut buffer = vec![0, 0, 255, 0, 255, 0, 255, 0, 0];
        Grayscale.update(3, 1, &mut buffer);
        assert_eq!(buffer, vec![54, 54, 54, 182, 182, 182, 18, 18, 18]);
    }
}
