//! Colorlight receiver card protocol.
//!
//! Every packet is a raw Ethernet frame made of up to three segments, sent with
//! a single gather write:
//!
//! ```text
//! [ link header, 12 bytes ][ row header / control packet ][ pixel data ]
//! ```
//!
//! # Row packet
//!
//! A row is split into chunks of at most [`MAX_PIXELS`] pixels (the largest
//! payload that fits the link MTU). Row header:
//!
//! | byte | value |
//! |------|-------|
//! | 0    | `0x55` |
//! | 1-2  | row index, big-endian |
//! | 3-4  | pixel offset within the row, big-endian |
//! | 5-6  | pixel count of the chunk, big-endian |
//! | 7-8  | `0x08 0x88` |
//!
//! # Control packets
//!
//! - Update (100 bytes): latches the rows sent so far and sets brightness.
//! - Brightness (65 bytes): brightness only, for firmware that expects it.
//!
//! Send errors are logged and the packet is dropped; a lost packet degrades
//! one frame but never stops playback.

use log::warn;
use std::io;

use crate::entities::frame::{DISPLAY_CHANNELS, DisplayBuffer};

/// Largest number of pixels carried by one row packet.
pub const MAX_PIXELS: usize = 497;

/// Destination and source MAC addresses the receiver card listens for.
pub const LINK_HEADER: [u8; 12] = [
    0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x22, 0x22, 0x33, 0x44, 0x55, 0x66,
];

pub const ROW_HEADER_LEN: usize = 9;
pub const UPDATE_LEN: usize = 100;
pub const BRIGHTNESS_LEN: usize = 65;

/// Sink for complete packets, given as ordered segments.
///
/// Implemented by the raw socket; tests substitute a recorder.
pub trait Link {
    /// Send one packet made of `segments`. Returns the number of bytes sent.
    fn send(&mut self, segments: &[&[u8]]) -> io::Result<usize>;
}

/// Control packet sent after each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ControlPacket {
    /// 100-byte latch + brightness packet.
    #[default]
    Update,
    /// 65-byte brightness packet.
    Brightness,
}

/// Send counters, for verbose statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub packets: u64,
    pub failed: u64,
}

/// Serializes display rows and control packets onto a [`Link`].
///
/// Owns reusable packet buffers; nothing is allocated per frame.
pub struct Transmitter<L: Link> {
    link: L,
    row_header: [u8; ROW_HEADER_LEN],
    update: [u8; UPDATE_LEN],
    brightness: [u8; BRIGHTNESS_LEN],
    stats: TransmitStats,
}

impl<L: Link> Transmitter<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            row_header: [0x55, 0, 0, 0, 0, 0, 0, 0x08, 0x88],
            update: [0; UPDATE_LEN],
            brightness: [0; BRIGHTNESS_LEN],
            stats: TransmitStats::default(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn stats(&self) -> TransmitStats {
        self.stats
    }

    /// Send one display row of `width` pixels as one or more row packets.
    ///
    /// `pixels` must hold at least `width * 3` bytes.
    pub fn send_row(&mut self, row: u16, width: u16, pixels: &[u8]) {
        let width = width as usize;
        debug_assert!(pixels.len() >= width * DISPLAY_CHANNELS);

        self.row_header[1..3].copy_from_slice(&row.to_be_bytes());

        let mut offset = 0;
        while offset < width {
            let count = (width - offset).min(MAX_PIXELS);

            self.row_header[3..5].copy_from_slice(&(offset as u16).to_be_bytes());
            self.row_header[5..7].copy_from_slice(&(count as u16).to_be_bytes());

            let data = &pixels[offset * DISPLAY_CHANNELS..(offset + count) * DISPLAY_CHANNELS];
            let segments: [&[u8]; 3] = [&LINK_HEADER, &self.row_header, data];
            Self::deliver(&mut self.link, &mut self.stats, &segments, "row data");

            offset += count;
        }
    }

    /// Send every row of `buffer`.
    pub fn send_frame(&mut self, buffer: &DisplayBuffer) {
        let width = buffer.width() as u16;
        for (y, row) in buffer.rows().enumerate() {
            self.send_row(y as u16, width, row);
        }
    }

    /// Latch the transmitted rows and set global brightness.
    pub fn send_update(&mut self, red: u8, green: u8, blue: u8) {
        let packet = &mut self.update;
        packet.fill(0);
        packet[0] = 0x01;
        packet[1] = 0x07;
        packet[23] = red.max(green).max(blue);
        packet[24] = 0x05;
        packet[26] = red;
        packet[27] = green;
        packet[28] = blue;

        let segments: [&[u8]; 2] = [&LINK_HEADER, &self.update];
        Self::deliver(&mut self.link, &mut self.stats, &segments, "update");
    }

    /// Set global brightness without latching.
    pub fn send_brightness(&mut self, red: u8, green: u8, blue: u8) {
        let packet = &mut self.brightness;
        packet.fill(0);
        packet[0] = 0x0A;
        packet[1] = red;
        packet[2] = green;
        packet[3] = blue;
        packet[4] = 0xFF;

        let segments: [&[u8]; 2] = [&LINK_HEADER, &self.brightness];
        Self::deliver(&mut self.link, &mut self.stats, &segments, "brightness");
    }

    /// Send the configured control packet with equal channel brightness.
    pub fn send_control(&mut self, kind: ControlPacket, level: u8) {
        match kind {
            ControlPacket::Update => self.send_update(level, level, level),
            ControlPacket::Brightness => self.send_brightness(level, level, level),
        }
    }

    fn deliver(link: &mut L, stats: &mut TransmitStats, segments: &[&[u8]], what: &str) {
        let expected: usize = segments.iter().map(|s| s.len()).sum();
        stats.packets += 1;

        match link.send(segments) {
            Ok(sent) if sent == expected => {}
            Ok(sent) => {
                stats.failed += 1;
                warn!("Short write of {} packet: {} of {} bytes", what, sent, expected);
            }
            Err(e) => {
                stats.failed += 1;
                warn!("Failed to send {} packet: {}", what, e);
            }
        }
    }
}
