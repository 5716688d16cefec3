//! Serial LED strip controller ("nanoled") framing.
//!
//! Packets are byte-stuffed so that `0x00` only ever appears as the frame
//! delimiter:
//!
//! ```text
//! 0x00 | code | data... | code | data... | ...
//! ```
//!
//! Each `code` byte is the distance to the next code byte. A block closes on a
//! zero value (which is dropped) or after 254 data bytes (code `0xFF`). A
//! trailing virtual zero closes the last block.
//!
//! Payload: 16-bit big-endian header `(pin << 12) | (len - 1)`, then the data.
//! The controller echoes the XOR of all payload bytes once the packet is
//! shown.
//!
//! Port configuration (baud rate, raw mode) is left to the OS; the device is
//! opened non-blocking and used as is.

use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Largest data length one packet can carry (12-bit length field).
pub const MAX_DATA: usize = 4096;

const BLOCK_LIMIT: usize = 255;

/// Iterative byte-stuffing encoder with a reusable output buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    out: Vec<u8>,
    block: usize,
    checksum: u8,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one packet for `pin` and return (frame bytes, checksum).
    ///
    /// `data` must hold 1..=[`MAX_DATA`] bytes.
    pub fn encode(&mut self, pin: u8, data: &[u8]) -> (&[u8], u8) {
        debug_assert!(!data.is_empty() && data.len() <= MAX_DATA);

        self.out.clear();
        self.out.push(0);
        self.block = self.out.len();
        self.out.push(0);
        self.checksum = 0;

        let header = (u16::from(pin & 0x0F) << 12) | ((data.len() - 1) as u16 & 0x0FFF);
        for byte in header.to_be_bytes().into_iter().chain(data.iter().copied()) {
            self.checksum ^= byte;
            self.push(byte);
        }
        self.push(0);

        // The last push opened a block that is never written
        self.out.pop();
        (self.out.as_slice(), self.checksum)
    }

    fn push(&mut self, value: u8) {
        loop {
            let distance = self.out.len() - self.block;
            if value == 0 || distance == BLOCK_LIMIT {
                self.out[self.block] = distance as u8;
                self.block = self.out.len();
                self.out.push(0);
            }

            if value != 0 {
                self.out.push(value);
                return;
            }
            if distance != BLOCK_LIMIT {
                return;
            }
            // A full block closed right before a zero: close the zero's own block
        }
    }
}

/// Serial strip controller.
pub struct NanoLed<D> {
    device: D,
    encoder: Encoder,
}

impl NanoLed<File> {
    /// Open a serial device such as `/dev/ttyACM0`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)?;
        debug!("Opened strip controller at {}", path.display());
        Ok(Self::new(device))
    }
}

impl<D: Read + Write> NanoLed<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            encoder: Encoder::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Send `data` to the strip on `pin`. Returns the checksum the controller
    /// will echo.
    pub fn write(&mut self, pin: u8, data: &[u8]) -> io::Result<u8> {
        let (frame, checksum) = self.encoder.encode(pin, data);
        let written = self.device.write(frame)?;
        if written != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, frame.len()),
            ));
        }
        Ok(checksum)
    }

    /// Drain pending input and return the last byte, if any arrived.
    pub fn read(&mut self) -> io::Result<Option<u8>> {
        let mut last = None;
        let mut byte = [0u8; 1];
        loop {
            match self.device.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => last = Some(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Failed to read from strip controller: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(last)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory device: reads from `input`, records writes.
    #[derive(Debug, Default)]
    pub(crate) struct MockDevice {
        pub input: Cursor<Vec<u8>>,
        pub written: Vec<Vec<u8>>,
    }

    impl Read for MockDevice {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_encode_small_packet() {
        let mut encoder = Encoder::new();
        // header = (1 << 12) | 2 = 0x1002
        let (frame, checksum) = encoder.encode(1, &[0x05, 0x00, 0x07]);

        assert_eq!(frame, &[0x00, 0x04, 0x10, 0x02, 0x05, 0x02, 0x07]);
        assert_eq!(checksum, 0x10 ^ 0x02 ^ 0x05 ^ 0x07);
    }

    #[test]
    fn test_encode_zero_header_byte() {
        let mut encoder = Encoder::new();
        // header = 0x0000 for pin 0 and one byte
        let (frame, _) = encoder.encode(0, &[0xAA]);
        assert_eq!(frame, &[0x00, 0x01, 0x01, 0x02, 0xAA]);
    }

    #[test]
    fn test_encode_long_run_splits_blocks() {
        let mut encoder = Encoder::new();
        let data = vec![0x11; 300];
        let (frame, _) = encoder.encode(1, &data);

        // header 0x112B: 2 header bytes + 252 data bytes fill the first block
        assert_eq!(frame[0], 0x00);
        assert_eq!(frame[1], 0xFF);
        assert_eq!(&frame[2..4], &[0x11, 0x2B]);
        assert_eq!(frame[256], 48 + 1);
        assert_eq!(frame.len(), 1 + 1 + 254 + 1 + 48);
        assert!(frame[1..].iter().all(|&b| b != 0));
    }

    #[test]
    fn test_encode_full_block_then_zero() {
        let mut encoder = Encoder::new();
        let mut data = vec![0x22; 252];
        data.push(0);
        let (frame, _) = encoder.encode(1, &data);

        // 254 non-zero bytes close with 0xFF, the zero gets a block of its own
        assert_eq!(frame[1], 0xFF);
        assert_eq!(&frame[256..], &[0x01, 0x01]);
    }

    #[test]
    fn test_write_and_read_echo() {
        let device = MockDevice {
            input: Cursor::new(vec![0x01, 0x7E]),
            ..Default::default()
        };
        let mut strip = NanoLed::new(device);

        let checksum = strip.write(0, &[1, 2, 3]).unwrap();
        assert_eq!(checksum, 0x00 ^ 0x02 ^ 1 ^ 2 ^ 3);
        assert_eq!(strip.device().written.len(), 1);

        assert_eq!(strip.read().unwrap(), Some(0x7E));
        assert_eq!(strip.read().unwrap(), None);
    }
}
