//! # Optional dependency edges.
//!
//! [`OptionalDependency`] sits between a dependent and a real dependency and
//! inverts the availability semantics of the edge: from the dependent's
//! point of view, an *absent* dependency appears **up**.
//!
//! ## Rules
//! - While the real dependency is missing, the dependent is told the edge is
//!   up and hears nothing further.
//! - Once the real dependency is installed and the dependent has **not**
//!   demanded the edge, the wrapper starts forwarding notifications in both
//!   directions, first synthesizing `immediate_dependency_down` so the
//!   dependent re-evaluates.
//! - If the dependent demanded the edge before the real dependency was
//!   installed, no demand is forwarded and forwarding is deferred until the
//!   demand is retracted.
//! - A `dependent_stopped` is forwarded only if the matching
//!   `dependent_started` was; forwarding can begin between the two.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::ServiceError;
use crate::graph::dependency::{Dependency, Dependent};
use crate::name::ServiceName;
use crate::service::ServiceValue;

/// The real dependency's condition, as seen from its notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DependencyState {
    /// Not installed.
    Missing,
    /// Installed but not up. Initial.
    Installed,
    /// Last start attempt failed.
    Failed,
    /// Up.
    Up,
}

impl DependencyState {
    #[inline]
    fn is_installed(self) -> bool {
        !matches!(self, DependencyState::Missing)
    }
}

struct OptionalInner {
    dep_state: DependencyState,
    /// The real dependency reported a missing transitive dependency.
    dependency_missing: bool,
    /// A transitive-missing report arrived while not forwarding; replay it
    /// when forwarding begins.
    pending_transitive_missing: bool,
    dependent: Option<Arc<dyn Dependent>>,
    demanded_by_dependent: bool,
    forward: bool,
    /// A `dependent_started` was forwarded and awaits its `dependent_stopped`.
    started_notified: bool,
}

/// Adapter giving one edge optional semantics. One wrapper per edge.
pub(crate) struct OptionalDependency {
    me: Weak<OptionalDependency>,
    real: Arc<dyn Dependency>,
    inner: Mutex<OptionalInner>,
}

impl OptionalDependency {
    pub(crate) fn new(real: Arc<dyn Dependency>) -> Arc<Self> {
        Arc::new_cyclic(|me| OptionalDependency {
            me: me.clone(),
            real,
            inner: Mutex::new(OptionalInner {
                dep_state: DependencyState::Installed,
                dependency_missing: false,
                pending_transitive_missing: false,
                dependent: None,
                demanded_by_dependent: false,
                forward: false,
                started_notified: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, OptionalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn as_dependent(&self) -> Option<Arc<dyn Dependent>> {
        self.me.upgrade().map(|me| me as Arc<dyn Dependent>)
    }
}

impl Dependency for OptionalDependency {
    fn name(&self) -> &ServiceName {
        self.real.name()
    }

    fn add_dependent(&self, dependent: Arc<dyn Dependent>) {
        // Register with the real dependency first: an absent slot reports
        // back synchronously and seeds dep_state before we decide whether
        // to forward.
        if let Some(me) = self.as_dependent() {
            self.real.add_dependent(me);
        }
        let (forwarding, state, pending_missing) = {
            let mut g = self.lock();
            debug_assert!(g.dependent.is_none());
            g.dependent = Some(dependent.clone());
            g.forward = g.dep_state.is_installed();
            (g.forward, g.dep_state, g.pending_transitive_missing)
        };
        if forwarding {
            match state {
                DependencyState::Failed => dependent.dependency_failed(),
                DependencyState::Up => dependent.immediate_dependency_up(),
                _ => {}
            }
            if pending_missing {
                dependent.transitive_dependency_unavailable();
            }
        } else {
            // The edge appears up while the real dependency is missing.
            dependent.immediate_dependency_up();
        }
    }

    fn remove_dependent(&self, _dependent: &Arc<dyn Dependent>) {
        {
            let mut g = self.lock();
            g.dependent = None;
            g.forward = false;
        }
        if let Some(me) = self.as_dependent() {
            self.real.remove_dependent(&me);
        }
    }

    fn add_demand(&self) {
        let forward_demand = {
            let mut g = self.lock();
            g.demanded_by_dependent = true;
            g.forward
        };
        if forward_demand {
            self.real.add_demand();
        }
    }

    fn remove_demand(&self) {
        let (start_forwarding, forward_removal, state, pending_missing, dependent) = {
            let mut g = self.lock();
            g.demanded_by_dependent = false;
            let state = g.dep_state;
            let pending = g.pending_transitive_missing;
            if g.forward {
                (false, true, state, pending, g.dependent.clone())
            } else {
                g.forward = state.is_installed();
                (g.forward, false, state, pending, g.dependent.clone())
            }
        };
        if start_forwarding {
            if let Some(d) = &dependent {
                match state {
                    DependencyState::Installed => d.immediate_dependency_down(),
                    DependencyState::Failed => d.dependency_failed(),
                    _ => {}
                }
                // Missing and failed conditions surface only now that the
                // edge is connected through.
                if pending_missing {
                    d.transitive_dependency_unavailable();
                }
            }
        } else if forward_removal {
            self.real.remove_demand();
        }
    }

    fn dependent_started(&self) {
        let forward = {
            let mut g = self.lock();
            g.started_notified = g.forward;
            g.forward
        };
        if forward {
            self.real.dependent_started();
        }
    }

    fn dependent_stopped(&self) {
        // Forwarding may have begun (via remove_demand) between a
        // started/stopped pair; started_notified keeps the callbacks
        // balanced from the real dependency's point of view.
        let forward = {
            let mut g = self.lock();
            let forward = g.forward && g.started_notified;
            g.started_notified = false;
            forward
        };
        if forward {
            self.real.dependent_stopped();
        }
    }

    fn value(&self) -> Result<Option<ServiceValue>, ServiceError> {
        let forwarding = self.lock().forward;
        if forwarding {
            self.real.value()
        } else {
            Ok(None)
        }
    }
}

impl Dependent for OptionalDependency {
    fn immediate_dependency_available(&self, _name: &ServiceName) {
        // The real dependency is installed again.
        let notify = {
            let mut g = self.lock();
            g.dep_state = DependencyState::Installed;
            g.forward = !g.demanded_by_dependent && g.dependent.is_some();
            if g.forward {
                g.dependent.clone()
            } else {
                None
            }
        };
        if let Some(d) = notify {
            // The dependent saw the edge as up while it was missing.
            d.immediate_dependency_down();
        }
    }

    fn immediate_dependency_unavailable(&self, _name: &ServiceName) {
        // The real dependency is gone; the edge reverts to appearing up.
        let (was_forwarding, demand_forwarded, state, was_missing, dependent) = {
            let mut g = self.lock();
            let was_forwarding = g.forward;
            let state = g.dep_state;
            let was_missing = g.dependency_missing;
            g.forward = false;
            g.dep_state = DependencyState::Missing;
            (
                was_forwarding,
                g.demanded_by_dependent,
                state,
                was_missing,
                g.dependent.clone(),
            )
        };
        if was_forwarding {
            if let Some(d) = &dependent {
                if state == DependencyState::Failed {
                    d.dependency_failure_cleared();
                }
                if was_missing {
                    d.transitive_dependency_available();
                }
                d.immediate_dependency_up();
            }
            if demand_forwarded {
                self.real.remove_demand();
            }
        }
    }

    fn immediate_dependency_up(&self) {
        let notify = {
            let mut g = self.lock();
            g.dep_state = DependencyState::Up;
            if g.forward { g.dependent.clone() } else { None }
        };
        if let Some(d) = notify {
            d.immediate_dependency_up();
        }
    }

    fn immediate_dependency_down(&self) {
        let notify = {
            let mut g = self.lock();
            g.dep_state = DependencyState::Installed;
            if g.forward { g.dependent.clone() } else { None }
        };
        if let Some(d) = notify {
            d.immediate_dependency_down();
        }
    }

    fn transitive_dependency_available(&self) {
        let notify = {
            let mut g = self.lock();
            g.pending_transitive_missing = false;
            g.dependency_missing = false;
            if g.forward { g.dependent.clone() } else { None }
        };
        if let Some(d) = notify {
            d.transitive_dependency_available();
        }
    }

    fn transitive_dependency_unavailable(&self) {
        let notify = {
            let mut g = self.lock();
            g.dependency_missing = true;
            if g.forward {
                g.pending_transitive_missing = false;
                g.dependent.clone()
            } else {
                g.pending_transitive_missing = true;
                None
            }
        };
        if let Some(d) = notify {
            d.transitive_dependency_unavailable();
        }
    }

    fn dependency_failed(&self) {
        let notify = {
            let mut g = self.lock();
            g.dep_state = DependencyState::Failed;
            if g.forward { g.dependent.clone() } else { None }
        };
        if let Some(d) = notify {
            d.dependency_failed();
        }
    }

    fn dependency_failure_cleared(&self) {
        let notify = {
            let mut g = self.lock();
            g.dep_state = DependencyState::Installed;
            if g.forward { g.dependent.clone() } else { None }
        };
        if let Some(d) = notify {
            d.dependency_failure_cleared();
        }
    }
}
