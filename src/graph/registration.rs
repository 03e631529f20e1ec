//! # Service registrations.
//!
//! A [`ServiceRegistration`] is the named slot a service occupies in the
//! container. Dependents register against the *name*; whatever instance is
//! installed under it (now or later) receives their demands and
//! started/stopped reports, and they are notified as instances come and go.
//!
//! ## Rules
//! - The dependent set has its own lock; snapshots are taken under it and
//!   iterated outside.
//! - Demands placed while the slot is empty accumulate and are forwarded in
//!   one batch when an instance is installed.
//! - A dependent registering against an empty slot is immediately told the
//!   dependency is unavailable.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::controller::core::ServiceController;
use crate::error::ServiceError;
use crate::graph::dependency::{Dependency, Dependent};
use crate::name::ServiceName;
use crate::service::ServiceValue;

struct RegistrationInner {
    /// The installed controller, if any.
    instance: Option<Arc<ServiceController>>,
    /// Dependents to notify of changes under this name.
    dependents: Vec<Arc<dyn Dependent>>,
    /// Demands placed against this name, installed instance or not.
    demanded_by: i32,
}

/// A named slot routing dependents and demands to the installed instance.
pub struct ServiceRegistration {
    name: ServiceName,
    inner: Mutex<RegistrationInner>,
}

impl ServiceRegistration {
    pub(crate) fn new(name: ServiceName) -> Arc<Self> {
        Arc::new(ServiceRegistration {
            name,
            inner: Mutex::new(RegistrationInner {
                instance: None,
                dependents: Vec::new(),
                demanded_by: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RegistrationInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The installed controller, if any.
    pub(crate) fn instance(&self) -> Option<Arc<ServiceController>> {
        self.lock().instance.clone()
    }

    /// Claims this slot for `controller` and forwards any accumulated
    /// demands to it.
    pub(crate) fn set_instance(&self, controller: Arc<ServiceController>) -> Result<(), ServiceError> {
        let pending;
        {
            let mut g = self.lock();
            if g.instance.is_some() {
                return Err(ServiceError::DuplicateService {
                    name: self.name.clone(),
                });
            }
            g.instance = Some(controller.clone());
            pending = g.demanded_by;
        }
        if pending > 0 {
            controller.add_demands(pending);
        }
        Ok(())
    }

    /// Releases the slot, if `controller` still owns it.
    pub(crate) fn clear_instance(&self, controller: &Arc<ServiceController>) {
        let mut g = self.lock();
        if g
            .instance
            .as_ref()
            .is_some_and(|cur| Arc::ptr_eq(cur, controller))
        {
            g.instance = None;
        }
    }

    /// Snapshot of the current dependents, taken under the set's lock.
    pub(crate) fn dependents_snapshot(&self) -> Vec<Arc<dyn Dependent>> {
        self.lock().dependents.clone()
    }

    /// Adds a dependent on behalf of the installed controller, which holds
    /// its own lock across this call.
    pub(crate) fn push_dependent(&self, dependent: Arc<dyn Dependent>) {
        self.lock().dependents.push(dependent);
    }
}

impl Dependency for ServiceRegistration {
    fn name(&self) -> &ServiceName {
        &self.name
    }

    fn add_dependent(&self, dependent: Arc<dyn Dependent>) {
        // With an installed instance, the set mutation happens under the
        // controller lock (via attach_dependent) so it is atomic with the
        // controller's dependent snapshots.
        let instance = {
            let mut g = self.lock();
            match g.instance.clone() {
                Some(controller) => Some(controller),
                None => {
                    g.dependents.push(dependent.clone());
                    None
                }
            }
        };
        match instance {
            Some(controller) => controller.attach_dependent(self, dependent),
            None => dependent.immediate_dependency_unavailable(&self.name),
        }
    }

    fn remove_dependent(&self, dependent: &Arc<dyn Dependent>) {
        let mut g = self.lock();
        g.dependents.retain(|d| !Arc::ptr_eq(d, dependent));
    }

    fn add_demand(&self) {
        let instance = {
            let mut g = self.lock();
            g.demanded_by += 1;
            g.instance.clone()
        };
        if let Some(controller) = instance {
            controller.add_demand();
        }
    }

    fn remove_demand(&self) {
        let instance = {
            let mut g = self.lock();
            g.demanded_by -= 1;
            g.instance.clone()
        };
        if let Some(controller) = instance {
            controller.remove_demand();
        }
    }

    fn dependent_started(&self) {
        if let Some(controller) = self.instance() {
            controller.dependent_started();
        }
    }

    fn dependent_stopped(&self) {
        if let Some(controller) = self.instance() {
            controller.dependent_stopped();
        }
    }

    fn value(&self) -> Result<Option<ServiceValue>, ServiceError> {
        match self.instance() {
            Some(controller) => controller.value(),
            None => Err(ServiceError::NotStarted {
                name: self.name.clone(),
            }),
        }
    }
}
