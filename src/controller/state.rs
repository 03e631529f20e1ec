//! # Lifecycle states.
//!
//! Two granularities:
//!
//! - [`State`] — the coarse six-valued projection reported to listeners and
//!   status snapshots.
//! - [`Substate`] — the fine-grained fourteen-valued automaton state.
//!
//! [`Transition`] names every legal arc between substates. The decision of
//! *which* arc to take lives in [`automaton`](super::automaton); the side
//! effects of taking one live in the controller.
//!
//! ```text
//! NEW ──commit──► DOWN ◄──────────────┐
//!                  │ ▲                │
//!        ┌─────────┼─┼──────┐     STOPPING
//!        ▼         ▼ │      ▼         ▲
//!   WONT_START  PROBLEM  START_REQUESTED
//!        │         │        │         │
//!        ▼         ▼        ▼         │
//!     REMOVING ◄─ START_INITIATING    │
//!        │              │             │
//!        ▼              ▼             │
//!     REMOVED       STARTING ─► UP ─► STOP_REQUESTED
//!                       │
//!                       ▼
//!                  START_FAILED
//! ```

/// Coarse lifecycle state, as observed by listeners and status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Installed but not running.
    Down,
    /// Start has been initiated.
    Starting,
    /// The last start attempt failed and has not been cleared.
    StartFailed,
    /// Running.
    Up,
    /// Stop has been initiated.
    Stopping,
    /// Removed from the container. Terminal.
    Removed,
}

/// Fine-grained automaton state.
///
/// The ordering of the first two variants matters: notifications received
/// before installation commits (`New`) or after a cancelled install
/// (`Cancelled`) are recorded but emit nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Substate {
    /// Created but not yet committed.
    New,
    /// Removed while still installing. Terminal.
    Cancelled,
    /// Down; eligible to start when the counters allow.
    Down,
    /// Down and barred from starting (`Mode::Never`).
    WontStart,
    /// Wants to start but a dependency problem prevents it.
    Problem,
    /// Wants to start; waiting for dependencies to come up.
    StartRequested,
    /// Start granted; notifying dependencies before invoking `start`.
    StartInitiating,
    /// `Service::start` is executing (or pending asynchronously).
    Starting,
    /// The start attempt failed.
    StartFailed,
    /// Running.
    Up,
    /// Running but asked to stop; waiting on running dependents.
    StopRequested,
    /// `Service::stop` is executing (or pending asynchronously).
    Stopping,
    /// Unregistering from the graph.
    Removing,
    /// Gone. Terminal.
    Removed,
}

impl Substate {
    /// Projects onto the coarse [`State`].
    pub fn state(self) -> State {
        match self {
            Substate::New
            | Substate::Down
            | Substate::WontStart
            | Substate::Problem
            | Substate::StartRequested
            | Substate::Removing => State::Down,
            Substate::Cancelled | Substate::Removed => State::Removed,
            Substate::StartInitiating | Substate::Starting => State::Starting,
            Substate::StartFailed => State::StartFailed,
            Substate::Up | Substate::StopRequested => State::Up,
            Substate::Stopping => State::Stopping,
        }
    }

    /// True for `New` and `Cancelled`: the controller is not live in the
    /// graph and inbound notifications must not produce effects.
    #[inline]
    pub(crate) fn is_dormant(self) -> bool {
        matches!(self, Substate::New | Substate::Cancelled)
    }
}

/// A legal arc between two substates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub(crate) enum Transition {
    StartRequestedToDown,
    StartRequestedToWontStart,
    StartRequestedToProblem,
    StartRequestedToStartInitiating,
    StartRequestedToRemoving,
    ProblemToDown,
    ProblemToWontStart,
    ProblemToStartRequested,
    ProblemToStartInitiating,
    ProblemToRemoving,
    StartInitiatingToStarting,
    StartingToUp,
    StartingToStartFailed,
    StartFailedToStarting,
    StartFailedToDown,
    StartFailedToWontStart,
    UpToStopRequested,
    StopRequestedToUp,
    StopRequestedToStopping,
    StoppingToDown,
    StoppingToWontStart,
    RemovingToRemoved,
    DownToRemoving,
    DownToStartRequested,
    DownToStartInitiating,
    DownToProblem,
    DownToWontStart,
    WontStartToDown,
    WontStartToProblem,
    WontStartToRemoving,
    WontStartToStartRequested,
    WontStartToStartInitiating,
}

impl Transition {
    /// The substate this arc lands in.
    pub(crate) fn after(self) -> Substate {
        use Transition::*;
        match self {
            StartRequestedToDown | ProblemToDown | StartFailedToDown | StoppingToDown
            | WontStartToDown => Substate::Down,
            StartRequestedToWontStart | ProblemToWontStart | StartFailedToWontStart
            | StoppingToWontStart | DownToWontStart => Substate::WontStart,
            StartRequestedToProblem | DownToProblem | WontStartToProblem => Substate::Problem,
            ProblemToStartRequested | DownToStartRequested | WontStartToStartRequested => {
                Substate::StartRequested
            }
            StartRequestedToStartInitiating
            | ProblemToStartInitiating
            | DownToStartInitiating
            | WontStartToStartInitiating
            | StartFailedToStarting => Substate::StartInitiating,
            StartInitiatingToStarting => Substate::Starting,
            StartingToUp | StopRequestedToUp => Substate::Up,
            StartingToStartFailed => Substate::StartFailed,
            UpToStopRequested => Substate::StopRequested,
            StopRequestedToStopping => Substate::Stopping,
            StartRequestedToRemoving | ProblemToRemoving | DownToRemoving
            | WontStartToRemoving => Substate::Removing,
            RemovingToRemoved => Substate::Removed,
        }
    }
}
