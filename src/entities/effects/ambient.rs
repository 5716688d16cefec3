//! Ambient effect - mirrors the top edge of the panel onto a serial LED strip.
//!
//! Every [`STEP`] pixels along the top edge, a 9×9 neighbourhood is averaged
//! in squared space, split into RGBW and eased into the strip buffer with
//! [`BLEND`]. The strip is only rewritten once the controller has echoed the
//! checksum of the previous packet, or after [`TIMEOUT`] frames without an
//! answer.
//!
//! The display buffer is not modified.

use log::warn;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use super::{ExtensionError, FrameHook};
use crate::output::nanoled::{MAX_DATA, NanoLed};

/// Output pin of the strip on the controller.
const PIN: u8 = 0;
/// Neighbourhood radius around each sample point.
const DISTANCE: usize = 4;
/// Share of the previous strip value kept per frame.
const BLEND: f32 = 0.9;
/// Frames to wait for an echo before writing anyway.
const TIMEOUT: u32 = 4;
/// Horizontal spacing of sample points in pixels.
const STEP: f32 = 1000.0 / 60.0 / 2.0;
/// Bytes per strip LED (G, R, B, W).
const LED_BYTES: usize = 4;

pub struct Ambient<D = File> {
    strip: NanoLed<D>,
    leds: Vec<u8>,
    expected: Option<u8>,
    attempts: u32,
}

impl Ambient<File> {
    /// Open the strip controller at `path`.
    pub fn open(path: &Path) -> Result<Self, ExtensionError> {
        let strip = NanoLed::open(path).map_err(|source| ExtensionError::Device {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(strip))
    }
}

impl<D: Read + Write> Ambient<D> {
    pub fn new(strip: NanoLed<D>) -> Self {
        Self {
            strip,
            leds: vec![0; MAX_DATA],
            expected: None,
            attempts: 0,
        }
    }

    pub fn strip(&self) -> &NanoLed<D> {
        &self.strip
    }

    /// Average the neighbourhood of (cx, cy) and blend it into the LED at
    /// byte `index`. Returns the index of the next LED.
    fn sample(&mut self, index: usize, cx: usize, cy: usize, width: usize, frame: &[u8]) -> usize {
        let (mut r, mut g, mut b) = (0u32, 0u32, 0u32);

        for y in cy - DISTANCE..=cy + DISTANCE {
            for x in cx - DISTANCE..=cx + DISTANCE {
                let p = (y * width + x) * 3;
                r += u32::from(frame[p + 2]).pow(2);
                g += u32::from(frame[p + 1]).pow(2);
                b += u32::from(frame[p]).pow(2);
            }
        }

        let count = ((DISTANCE * 2 + 1) * (DISTANCE * 2 + 1)) as u32;
        let (r, g, b) = (r / (count * 255), g / (count * 255), b / (count * 255));
        let w = r.min(g).min(b);

        for (led, value) in self.leds[index..index + LED_BYTES]
            .iter_mut()
            .zip([g - w, r - w, b - w, w])
        {
            *led = (*led as f32 * BLEND + value as f32 * (1.0 - BLEND)) as u8;
        }

        index + LED_BYTES
    }
}

impl<D: Read + Write> FrameHook for Ambient<D> {
    fn name(&self) -> &str {
        "ambient"
    }

    fn update(&mut self, width: usize, height: usize, buffer: &mut [u8]) {
        if width <= DISTANCE * 2 || height <= DISTANCE * 2 {
            return;
        }

        let echoed = self.strip.read().ok().flatten();
        if echoed != self.expected {
            self.attempts += 1;
            if self.attempts < TIMEOUT {
                return;
            }
            warn!("Failed to get response from strip controller!");
        }
        self.attempts = 0;

        let mut index = 0;
        let mut x = DISTANCE as f32;
        while x < (width - DISTANCE) as f32 && index + LED_BYTES <= self.leds.len() {
            index = self.sample(index, x as usize, DISTANCE, width, buffer);
            x += STEP;
        }

        self.expected = match self.strip.write(PIN, &self.leds[..index]) {
            Ok(checksum) => Some(checksum),
            Err(e) => {
                warn!("Failed to write strip packet: {}", e);
                None
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::nanoled::tests::MockDevice;
    use std::io::Cursor;

    fn ambient(echo: Vec<u8>) -> Ambient<MockDevice> {
        Ambient::new(NanoLed::new(MockDevice {
            input: Cursor::new(echo),
            ..Default::default()
        }))
    }

    #[test]
    fn test_white_frame_eases_into_white_channel() {
        let (width, height) = (40, 10);
        let mut frame = vec![255u8; width * height * 3];
        let mut hook = ambient(Vec::new());

        hook.update(width, height, &mut frame);

        // x = 4, 12.33, 20.67, 29 (< 36): four LEDs of 4 bytes
        let written = &hook.strip().device().written;
        assert_eq!(written.len(), 1);
        let leds = &hook.leds[..16];
        for led in leds.chunks(4) {
            assert_eq!(led, &[0, 0, 0, 25]);
        }
        assert!(frame.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_waits_for_echo_then_times_out() {
        let (width, height) = (20, 9);
        let mut frame = vec![10u8; width * height * 3];
        let mut hook = ambient(Vec::new());

        hook.update(width, height, &mut frame);
        assert_eq!(hook.strip().device().written.len(), 1);

        // No echo: three frames skipped, the fourth writes anyway
        for _ in 0..3 {
            hook.update(width, height, &mut frame);
        }
        assert_eq!(hook.strip().device().written.len(), 1);
        hook.update(width, height, &mut frame);
        assert_eq!(hook.strip().device().written.len(), 2);
    }

    #[test]
    fn test_small_frame_is_ignored() {
        let mut frame = vec![0u8; 8 * 8 * 3];
        let mut hook = ambient(Vec::new());
        hook.update(8, 8, &mut frame);
        assert!(hook.strip().device().written.is_empty());
    }
}
