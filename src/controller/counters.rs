//! # The per-controller counter block.
//!
//! [`CounterBlock`] is the bag of counters and flags that encodes a
//! controller's readiness. It has no behavior beyond field access and the
//! [`has_problem`](CounterBlock::has_problem) helper; every mutation happens
//! under the controller lock, and the automaton reads it as one consistent
//! snapshot.
//!
//! ## Rules
//! - `upper` stays in `{0, 1}`; the mode table adjusts it by ±1 only.
//! - `down_dependencies` counts immediate dependencies not currently up,
//!   plus one for an installed parent that is not up.
//! - `fail_count` and `transitive_unavailable` are edge-triggered: only the
//!   0↔1 crossings emit notifications, larger values suppress duplicates.
//! - A transition may be computed only while `async_tasks == 0`.

use std::collections::HashSet;
use std::time::Instant;

use crate::controller::mode::Mode;
use crate::controller::state::Substate;
use crate::error::StartError;
use crate::name::ServiceName;

/// Counters and flags encoding one controller's readiness.
#[derive(Debug)]
pub(crate) struct CounterBlock {
    /// Current user-facing policy. `Remove` is terminal.
    pub mode: Mode,
    /// Current automaton state.
    pub substate: Substate,
    /// Signed readiness. Start is permitted only while positive.
    pub upper: i32,
    /// Immediate dependencies (and parent) not currently up.
    pub down_dependencies: i32,
    /// Dependents currently demanding this service.
    pub demanded_by: i32,
    /// Dependents currently running and holding this service up.
    pub running_dependents: i32,
    /// Unresolved start failures on this subtree (self or dependencies).
    pub fail_count: i32,
    /// Unavailable transitive dependencies.
    pub transitive_unavailable: i32,
    /// Names of immediate dependencies currently absent.
    pub immediate_unavailable: HashSet<ServiceName>,
    /// Outstanding tasks: executor-queued work, in-flight listener
    /// invocations, and placeholder tokens.
    pub async_tasks: i32,
    /// Failure captured from the last start attempt.
    pub start_error: Option<StartError>,
    /// Moment of the most recent lifecycle-initiating transition.
    pub lifecycle_at: Instant,
}

impl CounterBlock {
    /// A fresh block for a controller with `dependency_count` dependencies
    /// and optionally a parent (which counts as one more down dependency).
    pub(crate) fn new(dependency_count: usize, has_parent: bool) -> Self {
        CounterBlock {
            mode: Mode::Never,
            substate: Substate::New,
            upper: 0,
            down_dependencies: dependency_count as i32 + i32::from(has_parent),
            demanded_by: 0,
            running_dependents: 0,
            fail_count: 0,
            transitive_unavailable: 0,
            immediate_unavailable: HashSet::new(),
            async_tasks: 0,
            start_error: None,
            lifecycle_at: Instant::now(),
        }
    }

    /// True while the subtree holds any unresolved problem: an absent
    /// immediate dependency, an unavailable transitive dependency, or an
    /// uncleared failure.
    #[inline]
    pub(crate) fn has_problem(&self) -> bool {
        !self.immediate_unavailable.is_empty()
            || self.transitive_unavailable > 0
            || self.fail_count > 0
    }
}
