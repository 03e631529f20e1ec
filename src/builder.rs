//! # Service builders.
//!
//! [`ServiceBuilder`] accumulates everything a service needs — dependencies
//! (plain or optional), aliases, listeners, injections, the initial mode —
//! and [`install`](ServiceBuilder::install)s it into the container in one
//! step: wire the edges, claim the names, commit the automaton.
//!
//! [`ChildTarget`] is the restricted builder factory handed to a starting
//! service for installing children. It is invalidated when the parent
//! leaves the up states; children are removed with their parent.
//!
//! ## Rules
//! - A failed claim (duplicate name or alias) unwinds the partial wiring;
//!   the cancelled controller never emits a notification.
//! - Cycle detection is out of scope: a dependency cycle is not rejected,
//!   its members simply never start.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::container::ServiceContainer;
use crate::controller::core::{ServiceController, ServiceRef};
use crate::controller::mode::Mode;
use crate::error::ServiceError;
use crate::graph::dependency::Dependency;
use crate::graph::optional::OptionalDependency;
use crate::injection::{InjectionSource, Injector, ValueInjection};
use crate::listener::ServiceListener;
use crate::name::ServiceName;
use crate::service::{Service, ServiceValue};

struct DependencySpec {
    name: ServiceName,
    optional: bool,
}

/// Accumulates one service's definition; consumed by
/// [`install`](Self::install).
///
/// ```rust,no_run
/// use servisor::{Mode, ServiceContainer, ServiceFn, ServiceName};
///
/// let container = ServiceContainer::new()?;
/// let controller = container
///     .add_service("app.worker", ServiceFn::null())
///     .dependency("app.database")
///     .optional_dependency("app.metrics")
///     .initial_mode(Mode::Active)
///     .install()?;
/// # Ok::<(), servisor::ServiceError>(())
/// ```
pub struct ServiceBuilder {
    container: Arc<ServiceContainer>,
    target: Option<Arc<ChildTarget>>,
    name: ServiceName,
    service: Arc<dyn Service>,
    location: Option<String>,
    initial_mode: Mode,
    aliases: Vec<ServiceName>,
    dependencies: Vec<DependencySpec>,
    listeners: Vec<Arc<dyn ServiceListener>>,
    dependency_injections: Vec<(ServiceName, Arc<dyn Injector>)>,
    value_injections: Vec<ValueInjection>,
    out_injections: Vec<ValueInjection>,
}

impl ServiceBuilder {
    pub(crate) fn new(
        container: Arc<ServiceContainer>,
        target: Option<Arc<ChildTarget>>,
        name: ServiceName,
        service: Arc<dyn Service>,
    ) -> Self {
        ServiceBuilder {
            container,
            target,
            name,
            service,
            location: None,
            initial_mode: Mode::Active,
            aliases: Vec::new(),
            dependencies: Vec::new(),
            listeners: Vec::new(),
            dependency_injections: Vec::new(),
            value_injections: Vec::new(),
            out_injections: Vec::new(),
        }
    }

    /// Sets the mode the service is committed with. Default: `Active`.
    pub fn initial_mode(mut self, mode: Mode) -> Self {
        self.initial_mode = mode;
        self
    }

    /// Records where this service is defined, for diagnostics.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Adds an alias name routing to the same controller.
    pub fn alias(mut self, name: impl Into<ServiceName>) -> Self {
        self.aliases.push(name.into());
        self
    }

    /// Adds a dependency on `name`.
    pub fn dependency(mut self, name: impl Into<ServiceName>) -> Self {
        self.push_dependency(name.into(), false);
        self
    }

    /// Adds an optional dependency on `name`: while nothing is installed
    /// under it, the edge appears up.
    pub fn optional_dependency(mut self, name: impl Into<ServiceName>) -> Self {
        self.push_dependency(name.into(), true);
        self
    }

    fn push_dependency(&mut self, name: ServiceName, optional: bool) {
        if !self.dependencies.iter().any(|d| d.name == name) {
            self.dependencies.push(DependencySpec { name, optional });
        }
    }

    /// Registers an initial listener.
    pub fn listener(mut self, listener: Arc<dyn ServiceListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Injects the value of dependency `name` into `target` around
    /// start/stop. Adds the dependency edge if not declared yet.
    pub fn inject_dependency(
        mut self,
        name: impl Into<ServiceName>,
        target: Arc<dyn Injector>,
    ) -> Self {
        let name = name.into();
        self.push_dependency(name.clone(), false);
        self.dependency_injections.push((name, target));
        self
    }

    /// Injects a fixed value into `target` around start/stop.
    pub fn inject_value(mut self, value: ServiceValue, target: Arc<dyn Injector>) -> Self {
        self.value_injections
            .push(ValueInjection::new(InjectionSource::Value(value), target));
        self
    }

    /// Publishes the service's own value into `target` once started.
    pub fn out_injection(mut self, target: Arc<dyn Injector>) -> Self {
        self.out_injections
            .push(ValueInjection::new(InjectionSource::OwnValue, target));
        self
    }

    /// Installs the service: wires dependency edges, claims the primary and
    /// alias names, and commits the initial mode.
    pub fn install(self) -> Result<ServiceRef, ServiceError> {
        let ServiceBuilder {
            container,
            target,
            name,
            service,
            location,
            initial_mode,
            aliases,
            dependencies,
            listeners,
            dependency_injections,
            mut value_injections,
            out_injections,
        } = self;

        if container.is_shutdown() {
            return Err(ServiceError::ShuttingDown);
        }
        let parent = match &target {
            Some(target) => {
                if !target.is_valid() {
                    return Err(ServiceError::InvalidTarget);
                }
                Some(target.parent().clone())
            }
            None => None,
        };

        let mut edges: Vec<Arc<dyn Dependency>> = Vec::with_capacity(dependencies.len());
        for spec in &dependencies {
            let registration = container.registration(&spec.name);
            let edge: Arc<dyn Dependency> = if spec.optional {
                OptionalDependency::new(registration)
            } else {
                registration
            };
            edges.push(edge);
        }
        for (dep_name, injector) in dependency_injections {
            let edge = edges
                .iter()
                .find(|e| e.name() == &dep_name)
                .cloned()
                .unwrap_or_else(|| container.registration(&dep_name) as Arc<dyn Dependency>);
            value_injections.push(ValueInjection::new(
                InjectionSource::Dependency(edge),
                injector,
            ));
        }

        let primary = container.registration(&name);
        let alias_registrations = aliases
            .iter()
            .map(|alias| container.registration(alias))
            .collect();

        let controller = ServiceController::new(
            container.clone(),
            service,
            location,
            edges,
            value_injections,
            out_injections,
            primary,
            alias_registrations,
            listeners,
            parent,
        );
        if let Err(error) = controller.start_installation() {
            controller.rollback_installation();
            return Err(error);
        }
        controller.commit_installation(initial_mode)?;
        Ok(controller)
    }
}

/// Install target bound to a parent service, obtained from
/// [`StartContext::child_target`](crate::StartContext::child_target).
///
/// Valid only while the parent is starting or up; children installed
/// through it are removed when the parent stops or fails.
pub struct ChildTarget {
    container: Arc<ServiceContainer>,
    parent: ServiceRef,
    valid: AtomicBool,
}

impl ChildTarget {
    pub(crate) fn new(container: Arc<ServiceContainer>, parent: ServiceRef) -> Arc<Self> {
        Arc::new(ChildTarget {
            container,
            parent,
            valid: AtomicBool::new(true),
        })
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub(crate) fn parent(&self) -> &ServiceRef {
        &self.parent
    }

    /// Begins installing a child service under `name`.
    pub fn add_service(
        self: &Arc<Self>,
        name: impl Into<ServiceName>,
        service: Arc<dyn Service>,
    ) -> ServiceBuilder {
        ServiceBuilder::new(
            self.container.clone(),
            Some(self.clone()),
            name.into(),
            service,
        )
    }
}
