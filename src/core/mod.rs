//! Core engine modules - loader, pacing, player
//!
//! These modules form the playback engine, independent of the output device.

pub mod loader;
pub mod pacing;
pub mod player;

// Re-exports for convenience
pub use loader::{Loader, LoaderError, Payload};
pub use pacing::{Pacer, PacingPolicy};
pub use player::{PlayError, PlaybackSummary, Player};
