//! Animation decoding on top of the `image` crate.
//!
//! Turns the bytes of one source into its canvas size and a lazy, forward-only
//! sequence of [`DecodedFrame`]s. Animated GIF, WebP and APNG go through
//! `image`'s `AnimationDecoder`; any other format `image` can read plays as a
//! single frame.
//!
//! Timestamps accumulate frame delays, so each frame carries the time at which
//! it stops being shown.

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, Frames, ImageDecoder, ImageError, ImageFormat, RgbaImage};
use log::debug;
use std::io::Cursor;
use std::time::Duration;

use super::frame::DecodedFrame;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to decode file: {0}")]
    Image(#[from] ImageError),
    #[error("source has no frames")]
    Empty,
}

enum FrameSource<'a> {
    Animated(Frames<'a>),
    Still(Option<RgbaImage>),
}

/// Decoded view of one source.
pub struct Animation<'a> {
    format: Option<ImageFormat>,
    width: u32,
    height: u32,
    frame_count: Option<usize>,
    source: FrameSource<'a>,
    elapsed: Duration,
    started: bool,
}

impl<'a> Animation<'a> {
    /// Open `bytes` for decoding. Header errors surface here, frame errors
    /// surface from the iterator.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let format = image::guess_format(bytes).ok();

        let (width, height, source) = match format {
            Some(ImageFormat::Gif) => {
                let decoder = GifDecoder::new(Cursor::new(bytes))?;
                let (w, h) = decoder.dimensions();
                (w, h, FrameSource::Animated(decoder.into_frames()))
            }
            Some(ImageFormat::WebP) => {
                let decoder = WebPDecoder::new(Cursor::new(bytes))?;
                let (w, h) = decoder.dimensions();
                if decoder.has_animation() {
                    (w, h, FrameSource::Animated(decoder.into_frames()))
                } else {
                    Self::still(bytes)?
                }
            }
            Some(ImageFormat::Png) => {
                let decoder = PngDecoder::new(Cursor::new(bytes))?;
                let (w, h) = decoder.dimensions();
                if decoder.is_apng()? {
                    (w, h, FrameSource::Animated(decoder.apng()?.into_frames()))
                } else {
                    Self::still(bytes)?
                }
            }
            _ => Self::still(bytes)?,
        };

        let frame_count = match &source {
            FrameSource::Still(_) => Some(1),
            FrameSource::Animated(_) => None,
        };

        debug!(
            "Opened {:?} source: {}x{}, {} frame(s)",
            format,
            width,
            height,
            frame_count.map_or_else(|| "?".to_string(), |n| n.to_string())
        );

        Ok(Self {
            format,
            width,
            height,
            frame_count,
            source,
            elapsed: Duration::ZERO,
            started: false,
        })
    }

    fn still(bytes: &'a [u8]) -> Result<(u32, u32, FrameSource<'a>), DecodeError> {
        let image = image::load_from_memory(bytes)?.into_rgba8();
        Ok((image.width(), image.height(), FrameSource::Still(Some(image))))
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// (width, height) of the canvas.
    pub fn canvas(&self) -> (usize, usize) {
        (self.width as usize, self.height as usize)
    }

    /// Frame count when the container declares it up front. Animated formats
    /// are decoded lazily and report `None`.
    pub fn frame_count(&self) -> Option<usize> {
        self.frame_count
    }
}

impl Iterator for Animation<'_> {
    type Item = Result<DecodedFrame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            FrameSource::Still(image) => image
                .take()
                .map(|pixels| Ok(DecodedFrame::new(pixels, Duration::ZERO))),
            FrameSource::Animated(frames) => {
                let Some(next) = frames.next() else {
                    // An animation without a single frame is an error, once
                    if self.started {
                        return None;
                    }
                    self.started = true;
                    return Some(Err(DecodeError::Empty));
                };
                self.started = true;
                let frame = match next {
                    Ok(frame) => frame,
                    Err(e) => return Some(Err(e.into())),
                };
                let (numer, denom) = frame.delay().numer_denom_ms();
                self.elapsed += Duration::from_millis(u64::from(numer)) / denom.max(1);
                Some(Ok(DecodedFrame::new(frame.into_buffer(), self.elapsed)))
            }
        }
    }
}
