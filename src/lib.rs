//! PANELPLAYER - animated image player for Colorlight LED panels
//!
//! Re-exports all modules for use by the binary target.

// Core engine (loader, pacing, player)
pub mod core;

// Frames, decoding, compositing and effects
pub mod entities;

// Panel link and serial devices
pub mod output;

// App modules
pub mod cli;
pub mod config;

// Re-export commonly used types
pub use config::{PlaybackSettings, PlayerConfig};
pub use core::loader::Loader;
pub use core::player::Player;
pub use entities::{DecodedFrame, DisplayBuffer, Extension, Hook};
pub use output::{RawSocket, Transmitter};
