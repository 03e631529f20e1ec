//! # Controller tasks.
//!
//! Transitions and inbound callbacks never perform side effects under the
//! controller lock; they emit [`Task`] values — a kind tag plus the payload
//! snapshot the effect needs — which the controller submits to the executor
//! after releasing the lock. Each task runs its outbound effects, then
//! re-enters the lock to decrement the outstanding-task counter and drive
//! the automaton again.
//!
//! Dependent snapshots are captured at emission time (under the appropriate
//! locks), so a task observes the graph as it was when its transition fired.

use std::sync::Arc;

use crate::controller::core::ServiceController;
use crate::controller::state::State;
use crate::graph::dependency::Dependent;
use crate::listener::ServiceListener;
use crate::name::ServiceName;

/// A flattened snapshot of every dependent to notify, children included.
pub(crate) type DependentSnapshot = Vec<Arc<dyn Dependent>>;

/// Dependents grouped by the name they depend on (primary and aliases),
/// plus children, which are notified under the primary name.
pub(crate) struct AvailabilitySnapshot {
    pub by_name: Vec<(ServiceName, Vec<Arc<dyn Dependent>>)>,
    pub children: Vec<Arc<dyn Dependent>>,
    pub primary: ServiceName,
}

impl AvailabilitySnapshot {
    /// A snapshot addressing a single dependent under one name.
    pub(crate) fn single(name: ServiceName, dependent: Arc<dyn Dependent>) -> Self {
        AvailabilitySnapshot {
            primary: name.clone(),
            by_name: vec![(name, vec![dependent])],
            children: Vec::new(),
        }
    }
}

/// Work emitted by a transition or inbound callback.
pub(crate) enum Task {
    /// Place a demand on every dependency and the parent.
    DemandParents,
    /// Retract a demand from every dependency and the parent.
    UndemandParents,
    /// Report to every dependency and the parent that this service started
    /// running.
    DependentStarted,
    /// Report to every dependency and the parent that this service stopped
    /// running.
    DependentStopped,
    /// Tell dependents this service is available under its names again.
    ServiceAvailable(AvailabilitySnapshot),
    /// Tell dependents this service is no longer available under its names.
    ServiceUnavailable(AvailabilitySnapshot),
    /// Tell dependents their immediate dependency came up.
    DependencyStarted(DependentSnapshot),
    /// Tell dependents their immediate dependency went down.
    DependencyStopped(DependentSnapshot),
    /// Tell dependents a failure occurred in this subtree.
    DependencyFailed(DependentSnapshot),
    /// Tell dependents the failures in this subtree cleared.
    DependencyRetrying(DependentSnapshot),
    /// Tell dependents a transitive dependency became available.
    DependencyAvailable(DependentSnapshot),
    /// Tell dependents a transitive dependency became unavailable.
    DependencyUnavailable(DependentSnapshot),
    /// Invoke `Service::start`, performing injections first when `inject`.
    Start { inject: bool },
    /// Invoke `Service::stop`, or only retract injections.
    Stop { only_uninject: bool },
    /// Drive every child to `Mode::Remove`. The emitting transition holds a
    /// placeholder token that the last removed child releases.
    RemoveChildren(Vec<Arc<ServiceController>>),
    /// Unregister this controller from the graph.
    Remove,
    /// Deliver one notification to one listener.
    Listener {
        listener: Arc<dyn ServiceListener>,
        notice: Notice,
    },
}

/// What a listener task tells its listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notice {
    Added,
    State(State),
    StartRequested,
    StartRequestCleared,
    StopRequested,
    StopRequestCleared,
    DependencyFailure,
    DependencyFailureClear,
    ImmediateUnavailable,
    ImmediateAvailable,
    TransitiveUnavailable,
    TransitiveAvailable,
    DependencyProblem,
    DependencyProblemClear,
    RemoveRequested,
    FailedStarting,
    FailedStopped,
}
