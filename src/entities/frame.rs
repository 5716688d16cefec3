//! Pixel buffers of the playback pipeline.
//!
//! - [`DisplayBuffer`]: what the panel shows. 3 bytes per pixel in B, G, R
//!   order (the order the receiver card expects), allocated once per session.
//! - [`DecodedFrame`]: one animation frame at the source's canvas resolution,
//!   RGBA, alive for a single loop iteration.

use image::RgbaImage;
use std::time::Duration;

/// Bytes per pixel in the display buffer.
pub const DISPLAY_CHANNELS: usize = 3;

/// Fixed-size BGR pixel grid sent to the panel.
///
/// Dimensions never change after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayBuffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl DisplayBuffer {
    /// Allocate a black buffer.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * DISPLAY_CHANNELS],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// (width, height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Bytes of one display row.
    pub fn stride(&self) -> usize {
        self.width * DISPLAY_CHANNELS
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Iterate rows top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.stride().max(1))
    }

    /// Channel triple at (x, y), in buffer order (B, G, R).
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * DISPLAY_CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// One decoded animation frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// RGBA pixels at canvas resolution.
    pub pixels: RgbaImage,
    /// End of this frame, relative to the start of the animation.
    pub timestamp: Duration,
}

impl DecodedFrame {
    pub fn new(pixels: RgbaImage, timestamp: Duration) -> Self {
        Self { pixels, timestamp }
    }

    /// (width, height) of the canvas.
    pub fn resolution(&self) -> (usize, usize) {
        (self.pixels.width() as usize, self.pixels.height() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_split_by_stride() {
        let mut buffer = DisplayBuffer::new(4, 3);
        buffer.as_mut_slice()[12..24].fill(9);

        let rows: Vec<&[u8]> = buffer.rows().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.len() == 12));
        assert_eq!(rows[1], &[9u8; 12][..]);
        assert_eq!(rows[2], &[0u8; 12][..]);
    }
}
