//! Shared test support: a recording, waitable service listener plus small
//! service fabrication helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use servisor::{
    ContainerConfig, InlineExecutor, Service, ServiceContainer, ServiceFn, ServiceListener,
    ServiceName, ServiceRef, StartError, Substate,
};

/// Everything a listener can be told, as a flat recordable kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    ListenerAdded,
    StartRequested,
    StartRequestCleared,
    Starting,
    Started,
    Failed,
    StopRequested,
    StopRequestCleared,
    Stopping,
    Stopped,
    RemoveRequested,
    Removed,
    FailedStarting,
    FailedStopped,
    DependencyFailed,
    DependencyFailureCleared,
    ImmediateUnavailable,
    ImmediateAvailable,
    TransitiveUnavailable,
    TransitiveAvailable,
    DependencyProblem,
    DependencyProblemCleared,
}

enum ExpectationState {
    Pending,
    Fulfilled(ServiceRef),
    Invalidated,
}

/// A one-shot expectation that can be invalidated before it fires.
///
/// Once invalidated it resolves to `None`, even if the expected event
/// arrives afterwards.
#[derive(Clone)]
pub struct Expectation {
    shared: Arc<(Mutex<ExpectationState>, Condvar)>,
}

impl Expectation {
    fn new() -> Self {
        Expectation {
            shared: Arc::new((Mutex::new(ExpectationState::Pending), Condvar::new())),
        }
    }

    fn fulfill(&self, service: &ServiceRef) {
        let (lock, cond) = &*self.shared;
        let mut state = lock.lock().unwrap();
        if matches!(*state, ExpectationState::Pending) {
            *state = ExpectationState::Fulfilled(service.clone());
        }
        cond.notify_all();
    }

    fn invalidate(&self) {
        let (lock, cond) = &*self.shared;
        let mut state = lock.lock().unwrap();
        *state = ExpectationState::Invalidated;
        cond.notify_all();
    }

    /// Waits for resolution; `None` on invalidation or timeout.
    pub fn wait(&self, timeout: Duration) -> Option<ServiceRef> {
        let (lock, cond) = &*self.shared;
        let deadline = Instant::now() + timeout;
        let mut state = lock.lock().unwrap();
        loop {
            match &*state {
                ExpectationState::Fulfilled(service) => return Some(service.clone()),
                ExpectationState::Invalidated => return None,
                ExpectationState::Pending => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    let (next, _timed_out) = cond.wait_timeout(state, remaining).unwrap();
                    state = next;
                }
            }
        }
    }
}

struct ListenerState {
    events: Vec<(ServiceName, Notification)>,
    stop_only: Vec<(ServiceName, Expectation)>,
}

/// Records every notification and lets tests wait for them.
pub struct TestListener {
    state: Mutex<ListenerState>,
    cond: Condvar,
}

impl TestListener {
    pub fn arc() -> Arc<Self> {
        Arc::new(TestListener {
            state: Mutex::new(ListenerState {
                events: Vec::new(),
                stop_only: Vec::new(),
            }),
            cond: Condvar::new(),
        })
    }

    fn record(&self, service: &ServiceRef, notification: Notification) {
        let mut state = self.state.lock().unwrap();
        let name = service.name().clone();
        match notification {
            Notification::Stopping => {
                for (expected, expectation) in &state.stop_only {
                    if *expected == name {
                        expectation.invalidate();
                    }
                }
            }
            Notification::Stopped => {
                for (expected, expectation) in &state.stop_only {
                    if *expected == name {
                        expectation.fulfill(service);
                    }
                }
            }
            _ => {}
        }
        state.events.push((name, notification));
        self.cond.notify_all();
    }

    /// Expects `name` to report `Stopped` without passing through
    /// `Stopping` first; a `Stopping` invalidates the expectation.
    pub fn expect_stopped_only(&self, name: impl Into<ServiceName>) -> Expectation {
        let expectation = Expectation::new();
        self.state
            .lock()
            .unwrap()
            .stop_only
            .push((name.into(), expectation.clone()));
        expectation
    }

    /// All recorded events, in arrival order.
    pub fn events(&self) -> Vec<(ServiceName, Notification)> {
        self.state.lock().unwrap().events.clone()
    }

    /// Events recorded for one service, in arrival order.
    pub fn events_for(&self, name: impl Into<ServiceName>) -> Vec<Notification> {
        let name = name.into();
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, e)| *e)
            .collect()
    }

    /// How often `name` received `notification`.
    pub fn count(&self, name: impl Into<ServiceName>, notification: Notification) -> usize {
        let name = name.into();
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|(n, e)| *n == name && *e == notification)
            .count()
    }

    /// Waits until `name` has received `notification` at least `count`
    /// times.
    pub fn wait_for_count(
        &self,
        name: impl Into<ServiceName>,
        notification: Notification,
        count: usize,
        timeout: Duration,
    ) -> bool {
        let name = name.into();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            let seen = state
                .events
                .iter()
                .filter(|(n, e)| *n == name && *e == notification)
                .count();
            if seen >= count {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (next, _timed_out) = self.cond.wait_timeout(state, remaining).unwrap();
            state = next;
        }
    }

    /// Waits until `name` has received `notification` at least once.
    pub fn wait_for(
        &self,
        name: impl Into<ServiceName>,
        notification: Notification,
        timeout: Duration,
    ) -> bool {
        self.wait_for_count(name, notification, 1, timeout)
    }

    /// Position of the first `(name, notification)` event, if recorded.
    pub fn position(
        &self,
        name: impl Into<ServiceName>,
        notification: Notification,
    ) -> Option<usize> {
        let name = name.into();
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .position(|(n, e)| *n == name && *e == notification)
    }
}

impl ServiceListener for TestListener {
    fn listener_added(&self, service: &ServiceRef) {
        self.record(service, Notification::ListenerAdded);
    }
    fn service_start_requested(&self, service: &ServiceRef) {
        self.record(service, Notification::StartRequested);
    }
    fn service_start_request_cleared(&self, service: &ServiceRef) {
        self.record(service, Notification::StartRequestCleared);
    }
    fn service_starting(&self, service: &ServiceRef) {
        self.record(service, Notification::Starting);
    }
    fn service_started(&self, service: &ServiceRef) {
        self.record(service, Notification::Started);
    }
    fn service_failed(&self, service: &ServiceRef, _error: &StartError) {
        self.record(service, Notification::Failed);
    }
    fn service_stop_requested(&self, service: &ServiceRef) {
        self.record(service, Notification::StopRequested);
    }
    fn service_stop_request_cleared(&self, service: &ServiceRef) {
        self.record(service, Notification::StopRequestCleared);
    }
    fn service_stopping(&self, service: &ServiceRef) {
        self.record(service, Notification::Stopping);
    }
    fn service_stopped(&self, service: &ServiceRef) {
        self.record(service, Notification::Stopped);
    }
    fn service_remove_requested(&self, service: &ServiceRef) {
        self.record(service, Notification::RemoveRequested);
    }
    fn service_removed(&self, service: &ServiceRef) {
        self.record(service, Notification::Removed);
    }
    fn failed_service_starting(&self, service: &ServiceRef) {
        self.record(service, Notification::FailedStarting);
    }
    fn failed_service_stopped(&self, service: &ServiceRef) {
        self.record(service, Notification::FailedStopped);
    }
    fn dependency_failed(&self, service: &ServiceRef) {
        self.record(service, Notification::DependencyFailed);
    }
    fn dependency_failure_cleared(&self, service: &ServiceRef) {
        self.record(service, Notification::DependencyFailureCleared);
    }
    fn immediate_dependency_unavailable(&self, service: &ServiceRef) {
        self.record(service, Notification::ImmediateUnavailable);
    }
    fn immediate_dependency_available(&self, service: &ServiceRef) {
        self.record(service, Notification::ImmediateAvailable);
    }
    fn transitive_dependency_unavailable(&self, service: &ServiceRef) {
        self.record(service, Notification::TransitiveUnavailable);
    }
    fn transitive_dependency_available(&self, service: &ServiceRef) {
        self.record(service, Notification::TransitiveAvailable);
    }
    fn dependency_problem(&self, service: &ServiceRef) {
        self.record(service, Notification::DependencyProblem);
    }
    fn dependency_problem_cleared(&self, service: &ServiceRef) {
        self.record(service, Notification::DependencyProblemCleared);
    }
}

/// Default wait used across the scenario tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Polls until the controller reaches `substate`.
pub fn wait_for_substate(controller: &ServiceRef, substate: Substate, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if controller.substate() == substate {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// A container backed by the default worker pool.
pub fn pool_container() -> Arc<ServiceContainer> {
    ServiceContainer::new().expect("worker pool")
}

/// A deterministic container: every task runs on the submitting thread.
pub fn inline_container() -> Arc<ServiceContainer> {
    ServiceContainer::with_config(ContainerConfig {
        executor: Some(Arc::new(InlineExecutor)),
        ..Default::default()
    })
    .expect("container")
}

/// A service whose start fails `failures` times before succeeding.
pub fn flaky_service(failures: u32) -> Arc<dyn Service> {
    let remaining = Arc::new(AtomicU32::new(failures));
    ServiceFn::arc(
        move |_ctx| {
            let left = remaining.load(Ordering::SeqCst);
            if left > 0 {
                remaining.store(left - 1, Ordering::SeqCst);
                Err(StartError::new("flaky"))
            } else {
                Ok(())
            }
        },
        |_ctx| Ok(()),
    )
}

/// A service that always fails to start.
pub fn failing_service() -> Arc<dyn Service> {
    ServiceFn::arc(|_ctx| Err(StartError::new("always fails")), |_ctx| Ok(()))
}

/// A service whose stop takes `hold` before returning.
pub fn slow_stop_service(hold: Duration) -> Arc<dyn Service> {
    ServiceFn::arc(
        |_ctx| Ok(()),
        move |_ctx| {
            std::thread::sleep(hold);
            Ok(())
        },
    )
}
