//! Events for the shell state machine.
//!
//! This module is private and restricted to the [`shell`](crate::shell)
//! scope. Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use super::state_machine::Stats;
use crate::error::Error;

// =============================================================================
// Crate-Public Interface
// =============================================================================

// ResumeEvent =================================================================

/// Event fired to go (back) to [`OperationalState`](super::states::OperationalState).
///
/// This event can happen under one of the following circumstances:
///
///  1. While at the `OperationalState` after a command completed.
///  2. While at the `ErrorState` once a non-fatal error was reported to the
///     host.
#[derive(Debug)]
pub(crate) struct ResumeEvent {
    pub stats: Stats,
}

// FailureEvent ================================================================

/// Event fired when reading, parsing or running a command failed. It triggers
/// a transition to the `Error` state, which owns the error from then on.
#[derive(Debug)]
pub(crate) struct FailureEvent {
    pub stats: Stats,
    pub error: Error,
}

// ExitRequestedEvent ==========================================================

/// Event fired when the shell should wind down, either because the host
/// asked for it or because of a fatal error.
#[derive(Debug)]
pub(crate) struct ExitRequestedEvent {
    pub stats: Stats,
    /// When `true`, indicates an abnormal completion caused by an error.
    pub with_error: bool,
}

// ExitEvent ===================================================================

/// The last event of the shell. The event loop terminates and hands back an
/// exit status to whoever started it.
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub stats: Stats,
    pub with_error: bool,
}

// Events enum =================================================================

#[derive(Debug)]
pub(crate) enum Event {
    Resume(ResumeEvent),
    Failure(FailureEvent),
    ExitRequested(ExitRequestedEvent),
    Exit(ExitEvent),
}
