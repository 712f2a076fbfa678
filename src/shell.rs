//! The bootloader shell, serving one command line at a time over the
//! transport.
//!
//! **Example** - Running a shell over a scripted link:
//! ```
//! use bootshell::{
//!     platform::{MemoryTransport, SimFlash},
//!     shell, Session, SettingsBuilder,
//! };
//!
//! let settings = SettingsBuilder::new().finalize();
//! let flash = SimFlash::new(settings.layout.sectors.clone());
//! let host = MemoryTransport::new();
//! host.push("version\r\nexit\r\n");
//!
//! let mut shell = shell::factory(Session::new(settings, Box::new(flash), Box::new(host.clone())));
//! assert_eq!(shell.run(), 0);
//! assert!(host.output_text().ends_with("Exiting\r\n\r\n"));
//! ```

mod events;
mod state_machine;
mod states;

pub use state_machine::{factory, Shell, Stats};
pub use states::host_message;
