//! # Service abstraction.
//!
//! Defines the core [`Service`] trait for lifecycle-managed units of work.
//!
//! - **[`Service`]** — trait with synchronous `start`/`stop` callbacks
//! - **[`ServiceValue`]** — type-erased value a started service provides
//! - **[`ServiceFn`]** — closure-backed implementation for simple services
//!
//! ## Rules
//! - `start`/`stop` run on worker threads, never under the controller lock.
//! - A callback that needs to finish later arms its context with
//!   [`asynchronous`](crate::StartContext::asynchronous) and completes
//!   through the returned handle; otherwise returning completes the
//!   lifecycle step synchronously.
//! - Returning `Err` from `start` captures the failure on the controller
//!   (cleared by `retry()` or removal). Errors from `stop` are logged and
//!   treated as completion.

use std::any::Any;
use std::sync::Arc;

use crate::controller::context::{StartContext, StopContext};
use crate::error::{StartError, StopError};

/// Type-erased value provided by a started service.
pub type ServiceValue = Arc<dyn Any + Send + Sync>;

/// A lifecycle-managed unit of work.
///
/// ## Example
///
/// ```rust
/// use servisor::{Service, StartContext, StopContext, StartError, StopError};
///
/// struct Listener;
///
/// impl Service for Listener {
///     fn start(&self, _ctx: &StartContext) -> Result<(), StartError> {
///         // bind sockets, spawn workers...
///         Ok(())
///     }
///
///     fn stop(&self, _ctx: &StopContext) -> Result<(), StopError> {
///         // drain and release...
///         Ok(())
///     }
/// }
/// ```
pub trait Service: Send + Sync + 'static {
    /// Starts the service.
    ///
    /// Runs on a worker thread. For asynchronous completion, call
    /// [`StartContext::asynchronous`] before returning `Ok` and finish via
    /// the handle from another thread.
    fn start(&self, ctx: &StartContext) -> Result<(), StartError>;

    /// Stops the service.
    ///
    /// Runs on a worker thread. Errors are logged; the service proceeds to
    /// `DOWN` regardless.
    fn stop(&self, ctx: &StopContext) -> Result<(), StopError>;

    /// Returns the value this service provides while started.
    ///
    /// Queried through [`ServiceController::value`] and dependency
    /// injections. Defaults to `None` for services that are pure behavior.
    ///
    /// [`ServiceController::value`]: crate::ServiceController::value
    fn value(&self) -> Option<ServiceValue> {
        None
    }
}

type StartFn = dyn Fn(&StartContext) -> Result<(), StartError> + Send + Sync;
type StopFn = dyn Fn(&StopContext) -> Result<(), StopError> + Send + Sync;

/// Closure-backed [`Service`].
///
/// ```rust
/// use servisor::ServiceFn;
///
/// let svc = ServiceFn::arc(
///     |_ctx| {
///         println!("up");
///         Ok(())
///     },
///     |_ctx| Ok(()),
/// );
/// ```
pub struct ServiceFn {
    start: Box<StartFn>,
    stop: Box<StopFn>,
}

impl ServiceFn {
    /// Wraps a start and a stop closure as a shared service handle.
    pub fn arc(
        start: impl Fn(&StartContext) -> Result<(), StartError> + Send + Sync + 'static,
        stop: impl Fn(&StopContext) -> Result<(), StopError> + Send + Sync + 'static,
    ) -> Arc<dyn Service> {
        Arc::new(ServiceFn {
            start: Box::new(start),
            stop: Box::new(stop),
        })
    }

    /// A service that does nothing on start and stop.
    ///
    /// Useful as a pure dependency-grouping node.
    pub fn null() -> Arc<dyn Service> {
        ServiceFn::arc(|_| Ok(()), |_| Ok(()))
    }
}

impl Service for ServiceFn {
    fn start(&self, ctx: &StartContext) -> Result<(), StartError> {
        (self.start)(ctx)
    }

    fn stop(&self, ctx: &StopContext) -> Result<(), StopError> {
        (self.stop)(ctx)
    }
}
