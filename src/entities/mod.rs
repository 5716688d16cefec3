//! Entities module - frames and the transforms applied to them
//!
//! Data flows through these in order:
//! - [`decoder`] turns file bytes into [`DecodedFrame`]s
//! - [`compositor`] mixes each frame into the [`DisplayBuffer`]
//! - [`effects`] post-process the buffer before it goes out

pub mod compositor;
pub mod decoder;
pub mod effects;
pub mod frame;

pub use compositor::{CompositeError, composite};
pub use decoder::{Animation, DecodeError};
pub use effects::{Extension, ExtensionError, ExtensionSource, FrameHook, Hook};
pub use frame::{DecodedFrame, DisplayBuffer};
