//! Shell state machine.
//!
//! The shell starts operational and serves commands until one of them asks
//! to exit or until the link to the host is lost. Every failure goes through
//! the error state, the single place where errors turn into host messages.
//!
//! ```text
//!                  Resume
//!               +---------+
//!               |         |
//!               v         |
//!  (start) -> Operational +------ Failure ------> Error
//!               |    ^                              |
//!               |    +----------- Resume -----------+
//!               |                                   |
//!        ExitRequested                     ExitRequested (fatal)
//!               |                                   |
//!               +--------------> Exit <-------------+
//!                                 |  ^
//!                                 +--+ Exit
//! ```

use super::events::*;
use super::states::*;
use crate::session::Session;

// =============================================================================
// Public Interface
// =============================================================================

/// Counters kept across the whole shell session.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Stats {
    /// Commands that completed.
    pub commands: usize,
    /// Lines that ended in an error, empty lines included.
    pub errors: usize,
}

/// The shell serving one [`Session`]. Use the [`factory()`] function to get an
/// instance then run it by calling its [`run()`](Shell::run) method.
pub struct Shell {
    session: Session,
    sm: ShellStates,
}
impl Shell {
    /// The event loop runs until the `Exit` state is reached and its
    /// `should_exit` flag is set. It then returns **`0`** after a normal
    /// termination and **`1`** when a fatal error ended the session.
    pub fn run(&mut self) -> i8 {
        loop {
            self.sm = self.sm.step(&mut self.session);
            if let ShellStates::Exit(sm) = &self.sm {
                if sm.state.should_exit {
                    return if sm.state.with_error { 1 } else { 0 };
                }
            }
        }
    }

    pub fn stats(&self) -> Stats {
        self.sm.stats()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Give the session back, e.g. to inspect the flash after the shell ran.
    pub fn into_session(self) -> Session {
        self.session
    }
}

/// Factory function for the shell. The shell starts in the `Operational`
/// state.
pub fn factory(session: Session) -> Shell {
    Shell {
        session,
        sm: ShellStates::Operational(ShellSM::new()),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine. The generic type holds the current state, next to
/// data shared by all states.
#[derive(Debug)]
struct ShellSM<S: Runnable> {
    stats: Stats,
    state: S,
}
impl<S: Runnable> ShellSM<S> {
    fn run(&mut self, session: &mut Session) -> Event {
        self.state.run(session, self.stats)
    }
}

/// The state machine starts in the `OperationalState`.
impl ShellSM<OperationalState> {
    fn new() -> Self {
        ShellSM {
            stats: Stats::default(),
            state: OperationalState {},
        }
    }
}

enum ShellStates {
    Operational(ShellSM<OperationalState>),
    Error(ShellSM<ErrorState>),
    Exit(ShellSM<ExitState>),
}
impl ShellStates {
    /// Run the current state and take the transition matching the event it
    /// returned. Transitions are `From` conversions from events to states.
    fn step(&mut self, session: &mut Session) -> Self {
        match self {
            ShellStates::Operational(sm) => {
                let event = sm.run(session);
                match event {
                    Event::Resume(ev) => ShellStates::Operational(ev.into()),
                    Event::Failure(ev) => ShellStates::Error(ev.into()),
                    Event::ExitRequested(ev) => ShellStates::Exit(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ShellStates::Error(sm) => {
                let event = sm.run(session);
                match event {
                    Event::Resume(ev) => ShellStates::Operational(ev.into()),
                    Event::ExitRequested(ev) => ShellStates::Exit(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ShellStates::Exit(sm) => {
                let event = sm.run(session);
                match event {
                    Event::Exit(ev) => ShellStates::Exit(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }

    fn stats(&self) -> Stats {
        match self {
            ShellStates::Operational(sm) => sm.stats,
            ShellStates::Error(sm) => sm.stats,
            ShellStates::Exit(sm) => sm.stats,
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<ResumeEvent> for ShellSM<OperationalState> {
    fn from(event: ResumeEvent) -> ShellSM<OperationalState> {
        ShellSM {
            stats: event.stats,
            state: OperationalState {},
        }
    }
}

impl From<FailureEvent> for ShellSM<ErrorState> {
    fn from(event: FailureEvent) -> ShellSM<ErrorState> {
        ShellSM {
            stats: event.stats,
            state: ErrorState { error: event.error },
        }
    }
}

impl From<ExitRequestedEvent> for ShellSM<ExitState> {
    fn from(event: ExitRequestedEvent) -> ShellSM<ExitState> {
        ShellSM {
            stats: event.stats,
            state: ExitState {
                with_error: event.with_error,
                should_exit: false,
            },
        }
    }
}
impl From<ExitEvent> for ShellSM<ExitState> {
    fn from(event: ExitEvent) -> ShellSM<ExitState> {
        ShellSM {
            stats: event.stats,
            state: ExitState {
                with_error: event.with_error,
                should_exit: true,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
