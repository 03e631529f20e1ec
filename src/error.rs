//! # Error types used by the container and service lifecycles.
//!
//! This module defines three error surfaces:
//!
//! - [`ServiceError`] errors raised by the container/controller API itself.
//! - [`StartError`] a failed start attempt, captured on the controller until
//!   it is cleared by `retry()` or removal.
//! - [`StopError`] a failed stop attempt; logged and treated as completion,
//!   never propagated.
//!
//! [`ServiceError`] provides `as_label()` returning a short stable string
//! for logs and metrics.

use std::io;

use thiserror::Error;

use crate::name::ServiceName;

/// # Errors produced by the container and controller API.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A service is already installed under this name.
    #[error("service '{name}' is already installed")]
    DuplicateService {
        /// The contested name (primary or alias).
        name: ServiceName,
    },
    /// The listener is already registered on this controller.
    #[error("listener already registered on '{name}'")]
    DuplicateListener { name: ServiceName },
    /// The controller mode is `REMOVE`; no further mode changes are allowed.
    #[error("service '{name}' is removed")]
    Removed { name: ServiceName },
    /// The container is shutting down; only `REMOVE` is accepted.
    #[error("container is shutting down")]
    ShuttingDown,
    /// The service value was requested while the service is not up.
    #[error("service '{name}' is not started")]
    NotStarted { name: ServiceName },
    /// A lifecycle context method was called outside its legal state.
    #[error("lifecycle context is no longer valid")]
    InvalidContext,
    /// A child install was attempted through an invalidated target.
    #[error("child target is no longer valid")]
    InvalidTarget,
    /// Children may only be added while the parent is starting or up.
    #[error("children cannot be added to '{name}' in its current state")]
    ChildRejected { name: ServiceName },
    /// The worker pool could not be created.
    #[error("failed to create worker pool: {0}")]
    WorkerPool(#[from] io::Error),
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::DuplicateService { .. } => "duplicate_service",
            ServiceError::DuplicateListener { .. } => "duplicate_listener",
            ServiceError::Removed { .. } => "service_removed",
            ServiceError::ShuttingDown => "container_shutting_down",
            ServiceError::NotStarted { .. } => "service_not_started",
            ServiceError::InvalidContext => "invalid_context",
            ServiceError::InvalidTarget => "invalid_target",
            ServiceError::ChildRejected { .. } => "child_rejected",
            ServiceError::WorkerPool(_) => "worker_pool",
        }
    }
}

/// # A captured start failure.
///
/// Produced by [`Service::start`](crate::Service::start) (returned, or passed
/// to the asynchronous [`StartHandle::fail`](crate::StartHandle::fail)) and
/// held on the controller as its start error until cleared by `retry()` or
/// removal.
#[derive(Error, Debug, Clone)]
#[error("start failed{}: {reason}", service.as_ref().map(|n| format!(" for '{n}'")).unwrap_or_default())]
pub struct StartError {
    /// Human-readable failure reason.
    pub reason: String,
    /// The failing service; filled in by the controller when captured.
    pub service: Option<ServiceName>,
}

impl StartError {
    /// Creates a start failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        StartError {
            reason: reason.into(),
            service: None,
        }
    }

    pub(crate) fn with_service(mut self, name: ServiceName) -> Self {
        if self.service.is_none() {
            self.service = Some(name);
        }
        self
    }
}

/// Lets `start` implementations use `?` on context operations.
impl From<ServiceError> for StartError {
    fn from(error: ServiceError) -> Self {
        StartError::new(error.to_string())
    }
}

/// # A failed stop attempt.
///
/// Stop failures are logged and then treated as completion; the service
/// proceeds to `DOWN` regardless.
#[derive(Error, Debug, Clone)]
#[error("stop failed: {reason}")]
pub struct StopError {
    /// Human-readable failure reason.
    pub reason: String,
}

impl StopError {
    /// Creates a stop failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        StopError {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_display_includes_service() {
        let e = StartError::new("boom").with_service(ServiceName::of("a"));
        assert_eq!(e.to_string(), "start failed for 'a': boom");
    }

    #[test]
    fn with_service_keeps_existing_name() {
        let e = StartError::new("boom")
            .with_service(ServiceName::of("first"))
            .with_service(ServiceName::of("second"));
        assert_eq!(e.service, Some(ServiceName::of("first")));
    }
}
