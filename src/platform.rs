//! Hardware collaborators of the update engine.
//!
//! The engine only ever talks to flash through [`Flash`] and to the host
//! through [`Transport`]. Host-side implementations are provided so that the
//! whole protocol can run against a simulated device over a real serial port
//! or a scripted in-memory link.

mod flash;
mod transport;

pub use flash::{Flash, FlashError, FlashStats, SimFlash};
pub use transport::{MemoryTransport, SerialTransport, Transport, TransportError};
