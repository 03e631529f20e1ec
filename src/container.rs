//! # The service container.
//!
//! [`ServiceContainer`] owns the name registry, the worker executor, and the
//! shutdown flag shared by every controller installed in it.
//!
//! ## Rules
//! - Names are registered lazily: depending on an absent name creates its
//!   slot, and the dependency resolves when something installs under it.
//! - Once [`shutdown`](ServiceContainer::shutdown) is called, only
//!   `Mode::Remove` changes are accepted and no new services install.
//! - Rejected executor submissions run inline on the submitting thread.
//! - Tear down with `shutdown()`; installed services pin their registrations
//!   (and through them the container) until they are removed.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use dashmap::DashMap;

use crate::builder::ServiceBuilder;
use crate::controller::core::ServiceRef;
use crate::controller::mode::Mode;
use crate::error::ServiceError;
use crate::executor::{Executor, Job, ThreadPoolExecutor};
use crate::graph::registration::ServiceRegistration;
use crate::name::ServiceName;
use crate::service::Service;

/// Configuration for a [`ServiceContainer`].
///
/// ## Field semantics
/// - `worker_threads`: size of the default worker pool (`0` = pool default)
/// - `profile_output`: sink for tab-separated lifecycle timings
///   (`<name>\t<S|X|F|L>\t<startOffsetNanos>\t<durationNanos>`)
/// - `executor`: executor override; when set, `worker_threads` is ignored
#[derive(Default)]
pub struct ContainerConfig {
    /// Number of worker threads for the default pool (`0` = pool default).
    pub worker_threads: usize,
    /// Optional profile sink. `S` start, `X` stop, `F` failed start,
    /// `L` listener invocation; offsets are relative to container start.
    pub profile_output: Option<Box<dyn Write + Send>>,
    /// Optional executor override (tests inject deterministic or rejecting
    /// executors here).
    pub executor: Option<Arc<dyn Executor>>,
}

/// In-process registry and runtime shared by a set of services.
pub struct ServiceContainer {
    registry: DashMap<ServiceName, Arc<ServiceRegistration>>,
    executor: Arc<dyn Executor>,
    down: AtomicBool,
    started_at: Instant,
    profile: Option<Mutex<Box<dyn Write + Send>>>,
}

impl ServiceContainer {
    /// Creates a container with the default worker pool.
    pub fn new() -> Result<Arc<Self>, ServiceError> {
        Self::with_config(ContainerConfig::default())
    }

    /// Creates a container from `config`.
    pub fn with_config(config: ContainerConfig) -> Result<Arc<Self>, ServiceError> {
        let executor: Arc<dyn Executor> = match config.executor {
            Some(executor) => executor,
            None => Arc::new(ThreadPoolExecutor::with_threads(config.worker_threads)?),
        };
        Ok(Arc::new(ServiceContainer {
            registry: DashMap::new(),
            executor,
            down: AtomicBool::new(false),
            started_at: Instant::now(),
            profile: config.profile_output.map(Mutex::new),
        }))
    }

    /// Begins installing a service under `name`.
    pub fn add_service(
        self: &Arc<Self>,
        name: impl Into<ServiceName>,
        service: Arc<dyn Service>,
    ) -> ServiceBuilder {
        ServiceBuilder::new(self.clone(), None, name.into(), service)
    }

    /// The slot for `name`, created on first use.
    pub(crate) fn registration(&self, name: &ServiceName) -> Arc<ServiceRegistration> {
        self.registry
            .entry(name.clone())
            .or_insert_with(|| ServiceRegistration::new(name.clone()))
            .clone()
    }

    /// The controller installed under `name`, if any.
    pub fn service(&self, name: &ServiceName) -> Option<ServiceRef> {
        self.registry.get(name).and_then(|r| r.instance())
    }

    /// Names with a service currently installed under them.
    pub fn installed_services(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self
            .registry
            .iter()
            .filter(|entry| entry.value().instance().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// True once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.down.load(Ordering::Acquire)
    }

    /// Marks the container as shutting down and drives every installed
    /// service to `Mode::Remove`.
    ///
    /// Returns immediately; removal drains on the executor. Services with
    /// asynchronous stops in flight finish at their own pace.
    pub fn shutdown(&self) {
        if self.down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("container shutting down");
        let instances: Vec<ServiceRef> = self
            .registry
            .iter()
            .filter_map(|entry| entry.value().instance())
            .collect();
        for controller in instances {
            if let Err(error) = controller.set_mode(Mode::Remove) {
                tracing::debug!(
                    service = %controller.name(),
                    error = %error,
                    "shutdown removal skipped"
                );
            }
        }
    }

    /// Submits `job`, falling back to the calling thread on rejection.
    pub(crate) fn execute_or_inline(&self, job: Job) {
        if let Err(job) = self.executor.execute(job) {
            job();
        }
    }

    pub(crate) fn profile_enabled(&self) -> bool {
        self.profile.is_some()
    }

    /// Appends one profile line; errors are ignored.
    pub(crate) fn write_profile(
        &self,
        name: &ServiceName,
        status: char,
        start: Instant,
        end: Instant,
    ) {
        let Some(profile) = &self.profile else { return };
        let offset = start.saturating_duration_since(self.started_at).as_nanos();
        let duration = end.saturating_duration_since(start).as_nanos();
        let mut sink = profile.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(sink, "{name}\t{status}\t{offset}\t{duration}");
    }
}
