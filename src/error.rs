//! Error values returned by every component of the update engine.
//!
//! Components never format protocol text for their failures. They return an
//! [`Error`] and the shell's error state decides what the host gets to see.

use thiserror::Error;

use crate::platform::{FlashError, TransportError};

/// Broad classification of an [`Error`], used by the shell to decide how loud
/// a failure is and whether the session can go on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed or unknown command, missing argument, overflowed line.
    Protocol,
    /// Unsupported checksum, length not divisible as required, digest mismatch.
    Checksum,
    /// Address or length outside of the allowed region.
    Address,
    /// Malformed firmware container or unsupported record.
    Container,
    /// Flash or transport failure.
    Hardware,
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum Error {
    // Protocol ================================================================
    #[error("received an empty command")]
    CommandTooShort,

    #[error("unknown command `{0}`")]
    CommandUnknown(String),

    #[error("command line longer than {0} bytes")]
    ReadOverflow(usize),

    #[error("missing parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("invalid value `{value}` for parameter `{name}`")]
    InvalidParameter { name: &'static str, value: String },

    #[error("number `{0}` contains invalid digits")]
    NotDigit(String),

    #[error("hex number `{0}` has `x` at index 1 but no leading `0`")]
    FirstNotZero(String),

    // Checksum ================================================================
    #[error("unsupported checksum `{0}`")]
    UnsupportedChecksum(String),

    #[error("length {len} is not a multiple of {multiple} as required by the checksum")]
    ChecksumLengthInvalid { len: usize, multiple: usize },

    #[error("checksum mismatch")]
    ChecksumMismatch,

    // Address =================================================================
    #[error("address range 0x{address:08x}+{len} is out of range")]
    AddressOutOfRange { address: u32, len: u32 },

    #[error("transfer length must be greater than zero")]
    InvalidLength,

    #[error("image of {len} bytes exceeds region capacity of {capacity} bytes")]
    ImageTooLarge { len: u32, capacity: u32 },

    #[error("sector {0} does not exist")]
    InvalidSector(u32),

    #[error("sector run {first}+{count} passes the last sector")]
    InvalidSectorCount { first: u32, count: u32 },

    // Container ===============================================================
    #[error("malformed image at offset {offset}: {reason}")]
    InvalidContainer { offset: usize, reason: &'static str },

    #[error("unsupported record type `{0}`")]
    UnsupportedRecordType(String),

    #[error("application type is undefined")]
    AppTypeUndefined,

    // Hardware ================================================================
    #[error("flash programming failed at 0x{address:08x}")]
    FlashWriteFailed { address: u32 },

    #[error("flash erase of sectors {first}+{count} failed")]
    FlashEraseFailed { first: u32, count: u32 },

    #[error("flash access out of bounds at 0x{0:08x}")]
    FlashOutOfBounds(u32),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            CommandTooShort
            | CommandUnknown(_)
            | ReadOverflow(_)
            | MissingParameter(_)
            | InvalidParameter { .. }
            | NotDigit(_)
            | FirstNotZero(_) => ErrorKind::Protocol,
            UnsupportedChecksum(_) | ChecksumLengthInvalid { .. } | ChecksumMismatch => {
                ErrorKind::Checksum
            }
            AddressOutOfRange { .. }
            | InvalidLength
            | ImageTooLarge { .. }
            | InvalidSector(_)
            | InvalidSectorCount { .. } => ErrorKind::Address,
            InvalidContainer { .. } | UnsupportedRecordType(_) | AppTypeUndefined => {
                ErrorKind::Container
            }
            FlashWriteFailed { .. } | FlashEraseFailed { .. } | FlashOutOfBounds(_) | Transport(_) => {
                ErrorKind::Hardware
            }
        }
    }

    /// Only a lost link ends the shell. Everything else, including a flash
    /// failure in the middle of a transfer, is reported and the shell goes on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Io(_)))
    }
}

impl From<FlashError> for Error {
    fn from(e: FlashError) -> Self {
        match e {
            FlashError::ProgramFailed { address } => Error::FlashWriteFailed { address },
            FlashError::EraseFailed { first, count } => Error::FlashEraseFailed { first, count },
            FlashError::OutOfBounds { address } => Error::FlashOutOfBounds(address),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn only_link_loss_is_fatal() {
    assert!(Error::Transport(TransportError::Io("broken pipe".into())).is_fatal());
    assert!(!Error::Transport(TransportError::Timeout).is_fatal());
    assert!(!Error::FlashWriteFailed { address: 0x0801_0000 }.is_fatal());
    assert!(!Error::ChecksumMismatch.is_fatal());
}

#[test]
fn flash_errors_keep_their_address() {
    let e: Error = FlashError::ProgramFailed { address: 0x0808_0010 }.into();
    assert_eq!(e, Error::FlashWriteFailed { address: 0x0808_0010 });
    assert_eq!(e.kind(), ErrorKind::Hardware);
}

#[test]
fn kinds_follow_taxonomy() {
    assert_eq!(Error::ReadOverflow(128).kind(), ErrorKind::Protocol);
    assert_eq!(
        Error::ChecksumLengthInvalid { len: 3, multiple: 4 }.kind(),
        ErrorKind::Checksum
    );
    assert_eq!(Error::ImageTooLarge { len: 2, capacity: 1 }.kind(), ErrorKind::Address);
    assert_eq!(
        Error::UnsupportedRecordType("S1".into()).kind(),
        ErrorKind::Container
    );
}
