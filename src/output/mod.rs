//! Output devices - the LED panel link and the ambient strip controller.

pub mod colorlight;
pub mod nanoled;
pub mod socket;

pub use colorlight::{ControlPacket, Link, Transmitter};
pub use nanoled::NanoLed;
pub use socket::{RawSocket, SocketError};
