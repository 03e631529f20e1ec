//! # Lifecycle contexts.
//!
//! Every `start`/`stop` invocation receives a context. A callback that can
//! finish synchronously just returns; one that needs to finish later arms
//! the context with `asynchronous()` **before returning** and completes
//! through the returned handle from any thread.
//!
//! ## Context protocol
//! ```text
//! SYNC ──asynchronous()──► ASYNC ──complete()──► COMPLETE
//!   │                        └─────fail(e)─────► FAILED (start only)
//!   └──(callback returns)──► COMPLETE | FAILED
//! ```
//! Calling `complete()`/`fail()` outside `ASYNC`, or `asynchronous()`
//! twice, is a protocol violation and returns
//! [`ServiceError::InvalidContext`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::builder::ChildTarget;
use crate::controller::core::{ServiceController, ServiceRef};
use crate::error::{ServiceError, StartError};

/// Per-invocation completion protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextState {
    Sync,
    Async,
    Complete,
    Failed,
}

/// Shared cell for one invocation's protocol state.
///
/// Mutated only while the owning controller's lock is held, except for the
/// initial `Sync → Async` arming.
pub(crate) type ContextCell = Arc<Mutex<ContextState>>;

pub(crate) fn new_cell() -> ContextCell {
    Arc::new(Mutex::new(ContextState::Sync))
}

pub(crate) fn lock_cell(cell: &ContextCell) -> MutexGuard<'_, ContextState> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Context passed to [`Service::start`](crate::Service::start).
pub struct StartContext {
    controller: ServiceRef,
    cell: ContextCell,
    started_at: Instant,
}

impl StartContext {
    pub(crate) fn new(controller: ServiceRef, started_at: Instant) -> Self {
        StartContext {
            controller,
            cell: new_cell(),
            started_at,
        }
    }

    pub(crate) fn cell(&self) -> &ContextCell {
        &self.cell
    }

    /// Switches this start to asynchronous completion.
    ///
    /// Call before returning from `start`; finish later with the returned
    /// handle. The start stays in flight (and the service in `STARTING`)
    /// until the handle fires.
    pub fn asynchronous(&self) -> Result<StartHandle, ServiceError> {
        let mut state = lock_cell(&self.cell);
        if *state != ContextState::Sync {
            return Err(ServiceError::InvalidContext);
        }
        *state = ContextState::Async;
        Ok(StartHandle {
            controller: self.controller.clone(),
            cell: self.cell.clone(),
            started_at: self.started_at,
        })
    }

    /// The controller being started.
    pub fn controller(&self) -> &ServiceRef {
        &self.controller
    }

    /// Target for installing child services owned by this service.
    ///
    /// Children are removed automatically when this service leaves the up
    /// states. Fails once the start has completed or failed.
    pub fn child_target(&self) -> Result<Arc<ChildTarget>, ServiceError> {
        self.controller.child_target(&self.cell)
    }

    /// Time since this lifecycle step was initiated.
    pub fn elapsed(&self) -> Duration {
        self.controller.lifecycle_elapsed()
    }

    /// Runs `job` on the container's executor.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        self.controller.execute_job(Box::new(job));
    }
}

/// Completion handle for an asynchronous start.
pub struct StartHandle {
    controller: ServiceRef,
    cell: ContextCell,
    started_at: Instant,
}

impl StartHandle {
    /// Marks the start complete; the service proceeds toward `UP`.
    pub fn complete(&self) -> Result<(), ServiceError> {
        ServiceController::start_async_complete(&self.controller, &self.cell, self.started_at)
    }

    /// Marks the start failed; the failure is captured on the controller.
    pub fn fail(&self, error: StartError) -> Result<(), ServiceError> {
        ServiceController::start_async_fail(&self.controller, &self.cell, self.started_at, error)
    }
}

/// Context passed to [`Service::stop`](crate::Service::stop).
pub struct StopContext {
    controller: ServiceRef,
    cell: ContextCell,
    started_at: Instant,
}

impl StopContext {
    pub(crate) fn new(controller: ServiceRef, started_at: Instant) -> Self {
        StopContext {
            controller,
            cell: new_cell(),
            started_at,
        }
    }

    pub(crate) fn cell(&self) -> &ContextCell {
        &self.cell
    }

    /// Switches this stop to asynchronous completion.
    pub fn asynchronous(&self) -> Result<StopHandle, ServiceError> {
        let mut state = lock_cell(&self.cell);
        if *state != ContextState::Sync {
            return Err(ServiceError::InvalidContext);
        }
        *state = ContextState::Async;
        Ok(StopHandle {
            controller: self.controller.clone(),
            cell: self.cell.clone(),
            started_at: self.started_at,
        })
    }

    /// The controller being stopped.
    pub fn controller(&self) -> &ServiceRef {
        &self.controller
    }

    /// Time since this lifecycle step was initiated.
    pub fn elapsed(&self) -> Duration {
        self.controller.lifecycle_elapsed()
    }

    /// Runs `job` on the container's executor.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        self.controller.execute_job(Box::new(job));
    }
}

/// Completion handle for an asynchronous stop.
pub struct StopHandle {
    controller: ServiceRef,
    cell: ContextCell,
    started_at: Instant,
}

impl StopHandle {
    /// Marks the stop complete; the service proceeds toward `DOWN`.
    pub fn complete(&self) -> Result<(), ServiceError> {
        ServiceController::stop_async_complete(&self.controller, &self.cell, self.started_at)
    }
}
