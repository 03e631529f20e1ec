//! # Edge capability traits.
//!
//! An edge in the service graph has two ends:
//!
//! - the [`Dependency`] end, offered by the thing depended on (a
//!   registration, or an [`OptionalDependency`] wrapper);
//! - the [`Dependent`] end, offered by the thing depending (a controller,
//!   or again the wrapper, which sits on both sides).
//!
//! ## Rules
//! - Callbacks on either trait are invoked **off** the caller's own lock;
//!   an implementation may take its own lock and submit work.
//! - `immediate_*` callbacks describe the direct neighbor;
//!   `transitive_*` callbacks describe something deeper in the subtree.
//! - Edge identity is pointer identity of the `Arc` handle.

use std::sync::Arc;

use crate::error::ServiceError;
use crate::name::ServiceName;
use crate::service::ServiceValue;

/// The depended-on end of an edge.
pub trait Dependency: Send + Sync + 'static {
    /// The name this dependency is known by.
    fn name(&self) -> &ServiceName;

    /// Registers a dependent to be notified of this dependency's changes.
    ///
    /// The dependent is immediately brought up to date: told the dependency
    /// is unavailable if nothing is installed, or given the installed
    /// instance's current condition.
    fn add_dependent(&self, dependent: Arc<dyn Dependent>);

    /// Unregisters a dependent (by handle identity).
    fn remove_dependent(&self, dependent: &Arc<dyn Dependent>);

    /// Places a demand-to-start on this dependency.
    fn add_demand(&self);

    /// Retracts a previously placed demand.
    fn remove_demand(&self);

    /// Reports that a dependent began running.
    fn dependent_started(&self);

    /// Reports that a dependent stopped running.
    fn dependent_stopped(&self);

    /// The value provided by the installed instance.
    ///
    /// `Ok(None)` means the edge legitimately has no value (an absent
    /// optional dependency); `Err` means the value was required but the
    /// instance is missing or not started.
    fn value(&self) -> Result<Option<ServiceValue>, ServiceError>;
}

/// The depending end of an edge: the inbound notification protocol.
///
/// Each callback follows the same skeleton in implementations: take the own
/// lock, update counters, decide whether the change is edge-triggered,
/// collect tasks, release the lock, submit.
pub trait Dependent: Send + Sync + 'static {
    /// An immediate dependency is installed again under `name`.
    fn immediate_dependency_available(&self, name: &ServiceName);

    /// An immediate dependency named `name` is no longer installed.
    fn immediate_dependency_unavailable(&self, name: &ServiceName);

    /// An immediate dependency came up.
    fn immediate_dependency_up(&self);

    /// An immediate dependency went down.
    fn immediate_dependency_down(&self);

    /// Somewhere below an immediate dependency, a service became available.
    fn transitive_dependency_available(&self);

    /// Somewhere below an immediate dependency, a service became
    /// unavailable.
    fn transitive_dependency_unavailable(&self);

    /// A dependency (at any depth) failed to start.
    fn dependency_failed(&self);

    /// All failures below this edge were cleared and are being retried.
    fn dependency_failure_cleared(&self);
}
