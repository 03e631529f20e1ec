//! # The substate automaton.
//!
//! Two pure tables, kept free of side effects so they can be tested as
//! plain functions:
//!
//! - [`next_transition`] — given a counter snapshot, which arc (if any) to
//!   take. Movement is only possible at quiescence (`async_tasks == 0`).
//! - [`apply_mode`] — the old×new mode table: adjusts `upper` and the mode
//!   field, and reports which demand/notification effects the caller must
//!   schedule.
//!
//! The side effects of *taking* a transition (listener notifications,
//! neighbor propagation, start/stop scheduling) are emitted by the
//! controller, not here.

use crate::controller::counters::CounterBlock;
use crate::controller::mode::Mode;
use crate::controller::state::{Substate, Transition};
use crate::error::ServiceError;
use crate::name::ServiceName;

/// Effects the caller must schedule after a mode change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ModeActions {
    /// Propagate a demand to every dependency and the parent.
    pub demand_parents: bool,
    /// Retract a previously propagated demand.
    pub undemand_parents: bool,
    /// Notify listeners that removal was requested.
    pub remove_requested: bool,
}

/// Identifies the transition to take, or `None` if no movement is possible.
///
/// Reads the counters as one consistent snapshot; call under the controller
/// lock.
pub(crate) fn next_transition(c: &CounterBlock, listeners_empty: bool) -> Option<Transition> {
    if c.async_tasks != 0 {
        // no movement possible
        return None;
    }
    match c.substate {
        Substate::Down => {
            if c.mode == Mode::Remove {
                Some(Transition::DownToRemoving)
            } else if c.mode == Mode::Never {
                Some(Transition::DownToWontStart)
            } else if c.upper > 0 && (c.mode != Mode::Passive || c.down_dependencies == 0) {
                if listeners_empty {
                    if c.has_problem() {
                        Some(Transition::DownToProblem)
                    } else if c.down_dependencies == 0 {
                        Some(Transition::DownToStartInitiating)
                    } else {
                        None
                    }
                } else {
                    Some(Transition::DownToStartRequested)
                }
            } else {
                None
            }
        }
        Substate::WontStart => {
            if c.mode == Mode::Remove {
                Some(Transition::WontStartToRemoving)
            } else if c.upper > 0 && (c.mode != Mode::Passive || c.down_dependencies == 0) {
                if listeners_empty {
                    if c.has_problem() {
                        Some(Transition::WontStartToProblem)
                    } else if c.down_dependencies == 0 {
                        Some(Transition::WontStartToStartInitiating)
                    } else {
                        None
                    }
                } else {
                    Some(Transition::WontStartToStartRequested)
                }
            } else if c.mode != Mode::Never {
                Some(Transition::WontStartToDown)
            } else {
                None
            }
        }
        Substate::Stopping => {
            if c.mode == Mode::Never {
                Some(Transition::StoppingToWontStart)
            } else {
                Some(Transition::StoppingToDown)
            }
        }
        Substate::StopRequested => {
            if c.upper > 0 && c.down_dependencies == 0 {
                Some(Transition::StopRequestedToUp)
            } else if c.running_dependents == 0 {
                Some(Transition::StopRequestedToStopping)
            } else {
                None
            }
        }
        Substate::Up => {
            if c.upper <= 0 || c.down_dependencies > 0 {
                Some(Transition::UpToStopRequested)
            } else {
                None
            }
        }
        Substate::StartFailed => {
            if c.upper > 0 {
                if c.down_dependencies == 0 {
                    if c.start_error.is_none() {
                        Some(Transition::StartFailedToStarting)
                    } else {
                        None
                    }
                } else {
                    Some(Transition::StartFailedToDown)
                }
            } else if c.mode == Mode::Never {
                Some(Transition::StartFailedToWontStart)
            } else {
                Some(Transition::StartFailedToDown)
            }
        }
        Substate::StartInitiating => Some(Transition::StartInitiatingToStarting),
        Substate::Starting => {
            if c.start_error.is_none() {
                Some(Transition::StartingToUp)
            } else {
                Some(Transition::StartingToStartFailed)
            }
        }
        Substate::StartRequested => {
            if c.upper > 0 {
                if c.has_problem() {
                    Some(Transition::StartRequestedToProblem)
                } else if c.down_dependencies == 0 {
                    Some(Transition::StartRequestedToStartInitiating)
                } else {
                    None
                }
            } else if c.mode == Mode::Never {
                Some(Transition::StartRequestedToWontStart)
            } else if listeners_empty && c.mode == Mode::Remove {
                Some(Transition::StartRequestedToRemoving)
            } else {
                Some(Transition::StartRequestedToDown)
            }
        }
        Substate::Problem => {
            if c.upper == 0 {
                if c.mode == Mode::Remove && listeners_empty {
                    Some(Transition::ProblemToRemoving)
                } else if c.mode == Mode::Never {
                    Some(Transition::ProblemToWontStart)
                } else {
                    Some(Transition::ProblemToDown)
                }
            } else if !c.has_problem() {
                if c.down_dependencies > 0 {
                    Some(Transition::ProblemToStartRequested)
                } else {
                    Some(Transition::ProblemToStartInitiating)
                }
            } else {
                None
            }
        }
        Substate::Removing => Some(Transition::RemovingToRemoved),
        // no possible movement
        Substate::New | Substate::Cancelled | Substate::Removed => None,
    }
}

/// Applies a mode change to the counter block.
///
/// Adjusts `upper` per the old×new table, stores the new mode, and returns
/// the effects the caller must schedule. A change away from `Remove` is
/// rejected. Call under the controller lock.
pub(crate) fn apply_mode(
    c: &mut CounterBlock,
    name: &ServiceName,
    new_mode: Mode,
) -> Result<ModeActions, ServiceError> {
    let mut actions = ModeActions::default();
    let old_mode = c.mode;
    if old_mode == new_mode {
        return Ok(actions);
    }
    match old_mode {
        Mode::Remove => {
            return Err(ServiceError::Removed { name: name.clone() });
        }
        Mode::Never => match new_mode {
            Mode::Remove => {
                actions.remove_requested = true;
            }
            Mode::OnDemand => {
                if c.demanded_by > 0 {
                    debug_assert!(c.upper < 1);
                    c.upper += 1;
                    actions.demand_parents = true;
                }
            }
            Mode::Passive => {
                debug_assert!(c.upper < 1);
                c.upper += 1;
                if c.demanded_by > 0 {
                    actions.demand_parents = true;
                }
            }
            Mode::Active => {
                actions.demand_parents = true;
                debug_assert!(c.upper < 1);
                c.upper += 1;
            }
            Mode::Never => unreachable!(),
        },
        Mode::OnDemand => match new_mode {
            Mode::Remove | Mode::Never => {
                actions.remove_requested = new_mode == Mode::Remove;
                if c.demanded_by > 0 {
                    c.upper -= 1;
                    actions.undemand_parents = true;
                }
            }
            Mode::Passive => {
                if c.demanded_by == 0 {
                    debug_assert!(c.upper < 1);
                    c.upper += 1;
                }
            }
            Mode::Active => {
                actions.demand_parents = true;
                if c.demanded_by == 0 {
                    debug_assert!(c.upper < 1);
                    c.upper += 1;
                }
            }
            Mode::OnDemand => unreachable!(),
        },
        Mode::Passive => match new_mode {
            Mode::Remove | Mode::Never => {
                actions.remove_requested = new_mode == Mode::Remove;
                if c.demanded_by > 0 {
                    actions.undemand_parents = true;
                }
                c.upper -= 1;
            }
            Mode::OnDemand => {
                if c.demanded_by == 0 {
                    c.upper -= 1;
                }
            }
            Mode::Active => {
                actions.demand_parents = true;
            }
            Mode::Passive => unreachable!(),
        },
        Mode::Active => match new_mode {
            Mode::Remove | Mode::Never => {
                actions.remove_requested = new_mode == Mode::Remove;
                actions.undemand_parents = true;
                c.upper -= 1;
            }
            Mode::OnDemand => {
                if c.demanded_by == 0 {
                    c.upper -= 1;
                    actions.undemand_parents = true;
                }
            }
            Mode::Passive => {
                if c.demanded_by == 0 {
                    actions.undemand_parents = true;
                }
            }
            Mode::Active => unreachable!(),
        },
    }
    c.mode = new_mode;
    Ok(actions)
}
