//! Frame compositor - mixes a decoded frame into the display buffer.
//!
//! Frames are cropped, not scaled: display pixel (x, y) reads canvas pixel
//! (x, y). Each channel is blended with what the panel showed before:
//!
//! ```text
//! out = (previous * old + source * (MIX_MAXIMUM - old)) / MIX_MAXIMUM
//! ```
//!
//! `old` is the mix percentage, or 0 for the very first frame of a session so
//! the panel does not fade in from black. Source RGBA is written as B, G, R;
//! alpha is ignored.

use super::frame::{DISPLAY_CHANNELS, DecodedFrame, DisplayBuffer};

/// Denominator of the mix percentage.
pub const MIX_MAXIMUM: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositeError {
    #[error("canvas {canvas:?} is smaller than display {display:?}")]
    Undersized {
        canvas: (usize, usize),
        display: (usize, usize),
    },
    #[error("mix must be below {MIX_MAXIMUM}, got {0}")]
    Mix(u32),
}

/// Blend one channel value.
#[inline]
pub fn blend_channel(previous: u8, source: u8, old_factor: u32) -> u8 {
    let new_factor = MIX_MAXIMUM - old_factor;
    ((previous as u32 * old_factor + source as u32 * new_factor) / MIX_MAXIMUM) as u8
}

/// True if a canvas of `canvas` size covers the whole display.
pub fn covers(canvas: (usize, usize), display: (usize, usize)) -> bool {
    canvas.0 >= display.0 && canvas.1 >= display.1
}

/// Mix `frame` into `buffer` in place.
///
/// # Errors
/// [`CompositeError::Undersized`] if the canvas does not cover the display,
/// [`CompositeError::Mix`] if `mix` is out of range. The buffer is untouched
/// in both cases.
pub fn composite(
    buffer: &mut DisplayBuffer,
    frame: &DecodedFrame,
    mix: u32,
    first_frame: bool,
) -> Result<(), CompositeError> {
    if mix >= MIX_MAXIMUM {
        return Err(CompositeError::Mix(mix));
    }

    let display = buffer.resolution();
    let canvas = frame.resolution();
    if !covers(canvas, display) {
        return Err(CompositeError::Undersized { canvas, display });
    }

    let old_factor = if first_frame { 0 } else { mix };
    let (width, height) = display;
    let source_stride = canvas.0 * 4;
    let source = frame.pixels.as_raw();
    let stride = buffer.stride();
    let destination = buffer.as_mut_slice();

    for y in 0..height {
        let src_row = &source[y * source_stride..y * source_stride + width * 4];
        let dst_row = &mut destination[y * stride..(y + 1) * stride];

        for (dst, src) in dst_row
            .chunks_exact_mut(DISPLAY_CHANNELS)
            .zip(src_row.chunks_exact(4))
        {
            dst[0] = blend_channel(dst[0], src[2], old_factor);
            dst[1] = blend_channel(dst[1], src[1], old_factor);
            dst[2] = blend_channel(dst[2], src[0], old_factor);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> DecodedFrame {
        DecodedFrame::new(RgbaImage::from_pixel(width, height, Rgba(rgba)), Duration::ZERO)
    }

    #[test]
    fn test_blend_half_mix() {
        let mut buffer = DisplayBuffer::new(2, 2);
        buffer.as_mut_slice().fill(100);

        composite(&mut buffer, &solid(2, 2, [0, 0, 0, 255]), 50, false).unwrap();
        assert!(buffer.as_slice().iter().all(|&v| v == 50));
    }

    #[test]
    fn test_first_frame_overwrites_regardless_of_mix() {
        let mut buffer = DisplayBuffer::new(2, 2);
        buffer.as_mut_slice().fill(100);

        composite(&mut buffer, &solid(2, 2, [0, 0, 0, 255]), 99, true).unwrap();
        assert!(buffer.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_channels_are_swapped_and_alpha_ignored() {
        let mut buffer = DisplayBuffer::new(1, 1);
        composite(&mut buffer, &solid(1, 1, [10, 20, 30, 0]), 0, false).unwrap();
        assert_eq!(buffer.pixel(0, 0), [30, 20, 10]);
    }

    #[test]
    fn test_larger_canvas_is_cropped_top_left() {
        let mut image = RgbaImage::from_pixel(4, 3, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 1, Rgba([255, 0, 0, 255]));
        image.put_pixel(3, 2, Rgba([0, 255, 0, 255]));
        let frame = DecodedFrame::new(image, Duration::ZERO);

        let mut buffer = DisplayBuffer::new(2, 2);
        composite(&mut buffer, &frame, 0, true).unwrap();

        assert_eq!(buffer.pixel(1, 1), [0, 0, 255]);
        assert_eq!(buffer.pixel(0, 0), [0, 0, 0]);
        assert_eq!(buffer.pixel(0, 1), [0, 0, 0]);
    }

    #[test]
    fn test_undersized_canvas_is_rejected() {
        let mut buffer = DisplayBuffer::new(4, 4);
        buffer.as_mut_slice().fill(7);

        let err = composite(&mut buffer, &solid(4, 3, [1, 1, 1, 1]), 0, true).unwrap_err();
        assert_eq!(
            err,
            CompositeError::Undersized {
                canvas: (4, 3),
                display: (4, 4)
            }
        );
        assert!(buffer.as_slice().iter().all(|&v| v == 7));
    }

    #[test]
    fn test_mix_out_of_range() {
        let mut buffer = DisplayBuffer::new(1, 1);
        assert_eq!(
            composite(&mut buffer, &solid(1, 1, [0; 4]), 100, false),
            Err(CompositeError::Mix(100))
        );
    }
}
