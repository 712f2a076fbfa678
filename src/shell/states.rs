//! States for the shell state machine.
//!
//! This module is private and restricted to the [`shell`](crate::shell)
//! scope. Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use log::{debug, error, info, warn};

use super::{events::*, state_machine::Stats};
use crate::{
    commands::{self, Outcome},
    error::{Error, Result},
    parser::ParsedCommand,
    platform::TransportError,
    session::{Session, TXT_FAREWELL, TXT_PROMPT},
};

// =============================================================================
// Public Interface
// =============================================================================

/// The text sent to the host when `error` ends a command, or `None` when the
/// host gets no message for it.
pub fn host_message(error: &Error) -> Option<String> {
    use Error::*;

    let text = match error {
        CommandTooShort => return None,
        CommandUnknown(_) => "Invalid command".to_owned(),
        ReadOverflow(_) => "Command too long".to_owned(),
        MissingParameter(_) => "Missing parameter(s)".to_owned(),
        InvalidParameter { name, value } => {
            format!("Invalid value '{}' for parameter '{}'", value, name)
        }
        NotDigit(_) => "Number parameter contains letters".to_owned(),
        FirstNotZero(_) => {
            "Number parameter must have '0' at the start when 'x' is present".to_owned()
        }
        UnsupportedChecksum(_) => "Unsupported checksum type".to_owned(),
        ChecksumLengthInvalid { multiple, .. } => {
            format!("Length must be a multiple of {} for this checksum", multiple)
        }
        ChecksumMismatch => {
            "Data corrupted during transport (Invalid CRC). Retry last message.".to_owned()
        }
        AddressOutOfRange { .. } => "Invalid address range entered".to_owned(),
        InvalidLength => "Length must be greater than zero".to_owned(),
        ImageTooLarge { capacity, .. } => {
            format!("Image does not fit in {} bytes", capacity)
        }
        InvalidSector(_) => "Wrong sector given".to_owned(),
        InvalidSectorCount { .. } => "Wrong sector count given".to_owned(),
        InvalidContainer { offset, reason } => {
            format!("Invalid image at offset {}: {}", offset, reason)
        }
        UnsupportedRecordType(record) => format!("Unsupported record type {}", record),
        AppTypeUndefined => "No application type recorded for the pending image".to_owned(),
        FlashWriteFailed { .. } => "Error while writing to flash. Retry last message.".to_owned(),
        FlashEraseFailed { .. } => "HAL error while erasing sectors".to_owned(),
        FlashOutOfBounds(_) => "Invalid address".to_owned(),
        Transport(TransportError::Timeout) => "Timed out waiting for data".to_owned(),
        Transport(TransportError::Io(_)) => return None,
    };
    Some(format!("\r\nERROR: {}\r\n", text))
}

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// Do the work of the state, then request the next transition by
    /// returning the matching `event`. The shell statistics travel with the
    /// event.
    fn run(&mut self, session: &mut Session, stats: Stats) -> Event;
}

// Operational State ===========================================================

/// The initial state of the shell. Prompts the host, reads one line, and runs
/// the command it names.
///
///  * **[`ResumeEvent`] => [`OperationalState`]** after the command completed,
///  * **[`FailureEvent`] => [`ErrorState`]** when anything on the way failed,
///  * **[`ExitRequestedEvent`] => [`ExitState`]** when the command asked the
///    shell to stop.
#[derive(Debug)]
pub(crate) struct OperationalState {}
impl Runnable for OperationalState {
    fn run(&mut self, session: &mut Session, mut stats: Stats) -> Event {
        info!("=> Operational");

        let outcome = read_line(session).and_then(|line| {
            if line.is_empty() {
                return Err(Error::CommandTooShort);
            }
            debug!("command line: {:?}", line);
            commands::dispatch(session, &ParsedCommand::parse(&line))
        });

        match outcome {
            Ok(Outcome::Continue) => {
                stats.commands += 1;
                Event::Resume(ResumeEvent { stats })
            }
            Ok(Outcome::Exit) => {
                stats.commands += 1;
                Event::ExitRequested(ExitRequestedEvent {
                    stats,
                    with_error: false,
                })
            }
            Err(error) => {
                stats.errors += 1;
                Event::Failure(FailureEvent { stats, error })
            }
        }
    }
}

// Error State =================================================================

/// Reports a failed command to the host.
///
///  * **[`ResumeEvent`] => [`OperationalState`]** once reported,
///  * **[`ExitRequestedEvent`] => [`ExitState`]** when the link to the host is
///    gone.
#[derive(Debug)]
pub(crate) struct ErrorState {
    pub error: Error,
}
impl Runnable for ErrorState {
    fn run(&mut self, session: &mut Session, stats: Stats) -> Event {
        info!("=> Error");

        let mut fatal = self.error.is_fatal();
        if fatal {
            error!("{}", self.error);
        } else {
            warn!("{} ({:?})", self.error, self.error.kind());
            if let Some(text) = host_message(&self.error) {
                if let Err(e) = session.reply(&text) {
                    error!("could not report the error: {}", e);
                    fatal = e.is_fatal();
                }
            }
        }

        if fatal {
            Event::ExitRequested(ExitRequestedEvent {
                stats,
                with_error: true,
            })
        } else {
            Event::Resume(ResumeEvent { stats })
        }
    }
}

// Exit State ==================================================================

/// Reached when the shell is about to terminate (normally or abnormally).
///
/// Like any other state it runs once to say goodbye, then triggers the
/// [`ExitEvent`] which makes the event loop return.
#[derive(Debug, Copy, Clone)]
pub(crate) struct ExitState {
    /// When `true`, indicates an abnormal completion caused by an error.
    pub with_error: bool,
    /// When `true` instructs the shell to leave its event loop.
    pub should_exit: bool,
}
impl Runnable for ExitState {
    fn run(&mut self, session: &mut Session, stats: Stats) -> Event {
        info!(
            "=> Exit with{}errors",
            if self.with_error { " " } else { " no " }
        );
        if let Err(e) = session.reply(TXT_FAREWELL) {
            debug!("farewell not sent: {}", e);
        }
        info!(
            "{} command(s) served, {} failed",
            stats.commands, stats.errors
        );

        Event::Exit(ExitEvent {
            stats,
            with_error: self.with_error,
        })
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Prompt, then collect bytes until CR LF. The terminator is not part of the
/// returned line. Reading `max_line_len` bytes without a terminator is an
/// overflow.
fn read_line(session: &mut Session) -> Result<String> {
    session.reply(TXT_PROMPT)?;

    let max = session.settings().max_line_len;
    let timeout = session.settings().line_timeout;
    let mut line = Vec::with_capacity(max);
    let mut byte = [0u8; 1];

    while line.len() < max {
        session.receive(&mut byte, timeout)?;
        line.push(byte[0]);
        if line.ends_with(b"\r\n") {
            line.truncate(line.len() - 2);
            return Ok(String::from_utf8_lossy(&line).into_owned());
        }
    }
    Err(Error::ReadOverflow(max))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestBench;

    #[test]
    fn messages_match_the_firmware_wording() {
        assert_eq!(
            host_message(&Error::ReadOverflow(128)).as_deref(),
            Some("\r\nERROR: Command too long\r\n")
        );
        assert_eq!(
            host_message(&Error::CommandUnknown("boot".into())).as_deref(),
            Some("\r\nERROR: Invalid command\r\n")
        );
        assert_eq!(
            host_message(&Error::ChecksumMismatch).as_deref(),
            Some("\r\nERROR: Data corrupted during transport (Invalid CRC). Retry last message.\r\n")
        );
        assert_eq!(
            host_message(&Error::InvalidSector(12)).as_deref(),
            Some("\r\nERROR: Wrong sector given\r\n")
        );
    }

    #[test]
    fn silent_errors() {
        assert_eq!(host_message(&Error::CommandTooShort), None);
        assert_eq!(
            host_message(&Error::Transport(TransportError::Io("gone".into()))),
            None
        );
        assert!(host_message(&Error::Transport(TransportError::Timeout)).is_some());
    }

    #[test]
    fn line_without_terminator_overflows() {
        let mut bench = TestBench::new();
        let max = bench.session.settings().max_line_len;
        bench.host.push(vec![b'a'; max]);
        assert_eq!(read_line(&mut bench.session), Err(Error::ReadOverflow(max)));
    }

    #[test]
    fn line_is_split_at_crlf_only() {
        let mut bench = TestBench::new();
        bench.host.push("mem-read\rstart=0\n\r\nhelp\r\n");
        assert_eq!(read_line(&mut bench.session), Ok("mem-read\rstart=0\n".into()));
        assert_eq!(read_line(&mut bench.session), Ok("help".into()));
        assert_eq!(bench.host.output_text(), TXT_PROMPT.repeat(2));
    }

    #[test]
    fn reporting_resumes() {
        let mut bench = TestBench::new();
        let mut state = ErrorState {
            error: Error::MissingParameter("count"),
        };
        let event = state.run(&mut bench.session, Stats::default());
        assert!(matches!(event, Event::Resume(_)));
        assert_eq!(bench.host.output_text(), "\r\nERROR: Missing parameter(s)\r\n");
    }

    #[test]
    fn lost_link_ends_the_shell() {
        let mut bench = TestBench::new();
        let mut state = ErrorState {
            error: Error::FlashWriteFailed { address: 0x0801_0000 },
        };
        bench.host.hang_up();
        let event = state.run(&mut bench.session, Stats::default());
        assert!(matches!(
            event,
            Event::ExitRequested(ExitRequestedEvent { with_error: true, .. })
        ));
    }
}
