//! # Service listeners.
//!
//! [`ServiceListener`] is the extension point for observing one service's
//! lifecycle. Every method has an empty default, so implementations override
//! only what they care about.
//!
//! ## Rules
//! - Notifications run on worker threads, never under the controller lock.
//! - Notifications for a single service are delivered in the order their
//!   transitions occurred.
//! - A panicking listener is logged and isolated; it cannot wedge the
//!   controller.
//! - Listeners are identified by pointer: registering the same `Arc` twice
//!   is rejected.
//! - A listener added after removal still receives `listener_added` and
//!   `service_removed`.

use crate::controller::core::ServiceRef;
use crate::error::StartError;

/// Observer of a single service's lifecycle and dependency health.
///
/// Four notification dimensions beyond plain lifecycle states:
/// availability (`immediate_*`/`transitive_*`), failure
/// (`dependency_failed`/`dependency_failure_cleared`), the aggregated
/// problem flag (`dependency_problem`/`dependency_problem_cleared`), and
/// start/stop/remove request edges.
#[allow(unused_variables)]
pub trait ServiceListener: Send + Sync + 'static {
    /// The listener has been registered on `service`.
    fn listener_added(&self, service: &ServiceRef) {}

    /// The service was asked to start and is waiting for its dependencies.
    fn service_start_requested(&self, service: &ServiceRef) {}

    /// The pending start request was withdrawn.
    fn service_start_request_cleared(&self, service: &ServiceRef) {}

    /// The service began starting.
    fn service_starting(&self, service: &ServiceRef) {}

    /// The service is up.
    fn service_started(&self, service: &ServiceRef) {}

    /// The start attempt failed.
    fn service_failed(&self, service: &ServiceRef, error: &StartError) {}

    /// The service was asked to stop.
    fn service_stop_requested(&self, service: &ServiceRef) {}

    /// The pending stop request was withdrawn (the service recovered to up).
    fn service_stop_request_cleared(&self, service: &ServiceRef) {}

    /// The service began stopping.
    fn service_stopping(&self, service: &ServiceRef) {}

    /// The service is down.
    fn service_stopped(&self, service: &ServiceRef) {}

    /// Removal was requested (`Mode::Remove` set).
    fn service_remove_requested(&self, service: &ServiceRef) {}

    /// The service has been removed. Terminal.
    fn service_removed(&self, service: &ServiceRef) {}

    /// A previously failed service is attempting to start again.
    fn failed_service_starting(&self, service: &ServiceRef) {}

    /// A previously failed service is now stopped.
    fn failed_service_stopped(&self, service: &ServiceRef) {}

    /// A dependency (or transitive dependency) failed to start.
    fn dependency_failed(&self, service: &ServiceRef) {}

    /// All dependency failures are cleared.
    fn dependency_failure_cleared(&self, service: &ServiceRef) {}

    /// An immediate dependency is unavailable (absent from the container).
    fn immediate_dependency_unavailable(&self, service: &ServiceRef) {}

    /// All previously absent immediate dependencies are available again.
    fn immediate_dependency_available(&self, service: &ServiceRef) {}

    /// A transitive dependency is unavailable.
    fn transitive_dependency_unavailable(&self, service: &ServiceRef) {}

    /// All previously unavailable transitive dependencies are available.
    fn transitive_dependency_available(&self, service: &ServiceRef) {}

    /// One or more dependencies will not start due to a problem.
    fn dependency_problem(&self, service: &ServiceRef) {}

    /// All dependency problems are cleared.
    fn dependency_problem_cleared(&self, service: &ServiceRef) {}
}
