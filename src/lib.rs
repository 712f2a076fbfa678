//! Bootshell is the firmware-update engine of a serial bootloader for a
//! microcontroller with two application slots.
//!
//! A host talks to the bootloader over a serial line, one CR LF terminated
//! command per line (`name arg=value ...`). Through these commands it can
//! erase and read flash, write raw data in checksummed chunks, stage a new
//! application image in the pending slot and finally promote it into the
//! active slot. Promotion decodes the staged image according to its
//! container format: raw binary, Intel HEX or Motorola S-record.
//!
//! Both slots are described by a boot record persisted in a flash sector of
//! its own. The record is always rewritten in full, so that a reset in the
//! middle of an update leaves either the old or the new record behind.
//!
//! The shell driving everything is a state machine implemented in terms of
//! **states** and **transitions** between them:
//!
//! * It is only ever in one state, which may carry its own data.
//! * Data shared by all states lives next to the current state.
//! * Transitions are triggered by typed **events** and are implemented with
//!   `From` conversions from events to states. A transition that has no such
//!   conversion does not compile.
//! * Entering a state consumes the previous one.
//!
//! The engine only touches hardware through the [`Flash`](platform::Flash)
//! and [`Transport`](platform::Transport) traits. The crate comes with a
//! simulated flash and with serial and in-memory transports, so the whole
//! protocol can be exercised from a host.

pub mod boot_record;
pub mod checksum;
pub mod commands;
pub mod decoder;
pub mod error;
pub mod layout;
pub mod parser;
pub mod platform;
pub mod session;
mod settings;
pub mod shell;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorKind, Result};
pub use session::Session;
pub use settings::{Settings, SettingsBuilder};
pub use shell::Shell;
