//! # The service controller.
//!
//! One [`ServiceController`] per installed service. It owns the per-service
//! lock, holds the [`CounterBlock`], and drives the substate automaton in
//! response to mode changes, inbound dependency notifications, and demand.
//!
//! ## Architecture
//! ```text
//! set_mode / retry / add_listener          inbound Dependent callbacks
//!            │                                        │
//!            ▼                                        ▼
//!      ┌──────────────── controller lock ────────────────┐
//!      │ update counters → next_transition → emit tasks  │
//!      └──────────────────────┬────────────────────────-─┘
//!                             │ (lock released)
//!                             ▼
//!                     executor.execute(task)
//!                             │
//!          run effects (start/stop/listeners/neighbors)
//!                             │
//!                re-enter lock: async_tasks -= 1,
//!                drive the automaton again
//! ```
//!
//! ## Rules
//! - Counters change only under the lock; side effects run only off it.
//! - A transition is computed only at quiescence (`async_tasks == 0`);
//!   emitted tasks are counted before the lock is released.
//! - Rejected executor submissions run inline on the submitting thread.
//! - A task body never lets a panic escape, and always reconciles the
//!   outstanding-task counter.

use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use crate::builder::ChildTarget;
use crate::container::ServiceContainer;
use crate::controller::automaton::{apply_mode, next_transition};
use crate::controller::context::{lock_cell, ContextCell, ContextState, StartContext, StopContext};
use crate::controller::counters::CounterBlock;
use crate::controller::mode::Mode;
use crate::controller::state::{State, Substate, Transition};
use crate::controller::task::{AvailabilitySnapshot, DependentSnapshot, Notice, Task};
use crate::error::{ServiceError, StartError};
use crate::executor::Job;
use crate::graph::dependency::{Dependency, Dependent};
use crate::graph::registration::ServiceRegistration;
use crate::injection::ValueInjection;
use crate::listener::ServiceListener;
use crate::name::ServiceName;
use crate::service::{Service, ServiceValue};
use crate::status::ServiceStatus;

/// Shared handle to a controller.
pub type ServiceRef = Arc<ServiceController>;

struct Inner {
    counters: CounterBlock,
    listeners: Vec<Arc<dyn ServiceListener>>,
    children: Vec<Arc<ServiceController>>,
    child_target: Option<Arc<ChildTarget>>,
}

/// The per-service state machine.
///
/// Guarantees a service never runs while a dependency is down, failed, or
/// missing, and propagates availability, failure, and lifecycle changes
/// through the graph. Obtained from
/// [`ServiceBuilder::install`](crate::ServiceBuilder::install).
pub struct ServiceController {
    me: Weak<ServiceController>,
    container: Arc<ServiceContainer>,
    service: Arc<dyn Service>,
    location: Option<String>,
    dependencies: Vec<Arc<dyn Dependency>>,
    injections: Vec<ValueInjection>,
    out_injections: Vec<ValueInjection>,
    primary: Arc<ServiceRegistration>,
    aliases: Vec<Arc<ServiceRegistration>>,
    parent: Option<Arc<ServiceController>>,
    inner: Mutex<Inner>,
}

impl ServiceController {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        container: Arc<ServiceContainer>,
        service: Arc<dyn Service>,
        location: Option<String>,
        dependencies: Vec<Arc<dyn Dependency>>,
        injections: Vec<ValueInjection>,
        out_injections: Vec<ValueInjection>,
        primary: Arc<ServiceRegistration>,
        aliases: Vec<Arc<ServiceRegistration>>,
        listeners: Vec<Arc<dyn ServiceListener>>,
        parent: Option<Arc<ServiceController>>,
    ) -> Arc<Self> {
        let counters = CounterBlock::new(dependencies.len(), parent.is_some());
        Arc::new_cyclic(|me| ServiceController {
            me: me.clone(),
            container,
            service,
            location,
            dependencies,
            injections,
            out_injections,
            primary,
            aliases,
            parent,
            inner: Mutex::new(Inner {
                counters,
                listeners,
                children: Vec::new(),
                child_target: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---------------------------
    // Identity and snapshots
    // ---------------------------

    /// The primary name of this service.
    pub fn name(&self) -> &ServiceName {
        self.primary.name()
    }

    /// The alias names routing to this controller.
    pub fn aliases(&self) -> Vec<ServiceName> {
        self.aliases.iter().map(|a| a.name().clone()).collect()
    }

    /// The current user-facing mode.
    pub fn mode(&self) -> Mode {
        self.lock().counters.mode
    }

    /// The coarse lifecycle state.
    pub fn state(&self) -> State {
        self.lock().counters.substate.state()
    }

    /// The fine-grained automaton state.
    pub fn substate(&self) -> Substate {
        self.lock().counters.substate
    }

    /// The failure captured from the last start attempt, if any.
    pub fn start_error(&self) -> Option<StartError> {
        self.lock().counters.start_error.clone()
    }

    /// The parent controller, if this service was installed as a child.
    pub fn parent(&self) -> Option<ServiceRef> {
        self.parent.clone()
    }

    /// Where this service was defined, if the installer recorded it.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// The container this service is installed in.
    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    /// Names of immediate dependencies currently absent from the container.
    pub fn immediate_unavailable_dependencies(&self) -> HashSet<ServiceName> {
        self.lock().counters.immediate_unavailable.clone()
    }

    /// The value the service provides.
    ///
    /// Fails unless the service is currently started.
    pub fn value(&self) -> Result<Option<ServiceValue>, ServiceError> {
        let g = self.lock();
        if g.counters.substate.state() != State::Up {
            return Err(ServiceError::NotStarted {
                name: self.name().clone(),
            });
        }
        Ok(self.service.value())
    }

    /// A point-in-time status snapshot.
    pub fn status(&self) -> ServiceStatus {
        let g = self.lock();
        ServiceStatus {
            parent: self.parent.as_ref().map(|p| p.name().clone()),
            name: self.name().clone(),
            aliases: self.aliases(),
            mode: g.counters.mode,
            state: g.counters.substate.state(),
            substate: g.counters.substate,
            dependencies: self.dependencies.iter().map(|d| d.name().clone()).collect(),
            failed: g.counters.fail_count != 0,
            problem: !g.counters.immediate_unavailable.is_empty()
                || g.counters.transitive_unavailable != 0,
        }
    }

    // ---------------------------
    // Public contract
    // ---------------------------

    /// Changes the service mode.
    ///
    /// Rejected with [`ServiceError::ShuttingDown`] for any non-`Remove`
    /// mode once the container is shutting down, and with
    /// [`ServiceError::Removed`] once the mode is `Remove`.
    pub fn set_mode(&self, new_mode: Mode) -> Result<(), ServiceError> {
        self.internal_set_mode(None, new_mode).map(|_| ())
    }

    /// Changes the mode only if the current mode equals `expected`.
    ///
    /// Returns `Ok(false)` when the current mode differs.
    pub fn compare_and_set_mode(&self, expected: Mode, new_mode: Mode) -> Result<bool, ServiceError> {
        self.internal_set_mode(Some(expected), new_mode)
    }

    fn internal_set_mode(&self, expected: Option<Mode>, new_mode: Mode) -> Result<bool, ServiceError> {
        if new_mode != Mode::Remove && self.container.is_shutdown() {
            return Err(ServiceError::ShuttingDown);
        }
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            let old_mode = g.counters.mode;
            if let Some(expected) = expected {
                if expected != old_mode {
                    return Ok(false);
                }
            }
            if old_mode == new_mode {
                return Ok(true);
            }
            self.apply_mode_locked(&mut g, new_mode, &mut tasks)?;
            if tasks.is_empty() {
                // Mode effects pending would gate the automaton anyway.
                self.transition_locked(&mut g, &mut tasks);
            }
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
        Ok(true)
    }

    /// Registers a listener.
    ///
    /// Pre-commit listeners are stored silently; otherwise the listener is
    /// told `listener_added` on the calling thread, and `service_removed`
    /// as well if the service is already gone. Duplicate handles are
    /// rejected.
    pub fn add_listener(&self, listener: Arc<dyn ServiceListener>) -> Result<(), ServiceError> {
        let substate;
        {
            let mut g = self.lock();
            substate = g.counters.substate;
            if substate != Substate::Removed {
                if g.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                    return Err(ServiceError::DuplicateListener {
                        name: self.name().clone(),
                    });
                }
                g.listeners.push(listener.clone());
                if substate == Substate::New {
                    return Ok(());
                }
                g.counters.async_tasks += 1;
            } else {
                g.counters.async_tasks += 2;
            }
        }
        self.invoke_listener(&listener, Notice::Added);
        if substate == Substate::Removed {
            self.invoke_listener(&listener, Notice::State(State::Removed));
        }
        Ok(())
    }

    /// Unregisters a listener (by handle identity).
    pub fn remove_listener(&self, listener: &Arc<dyn ServiceListener>) {
        let mut g = self.lock();
        g.listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Clears a captured start failure and lets the service start again.
    ///
    /// A no-op unless the coarse state is `StartFailed`.
    pub fn retry(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            if g.counters.substate.state() != State::StartFailed {
                return;
            }
            g.counters.fail_count -= 1;
            debug_assert_eq!(g.counters.fail_count, 0);
            g.counters.start_error = None;
            self.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    // ---------------------------
    // Installation
    // ---------------------------

    /// Wires this controller into the graph: dependency edges, parent, and
    /// name registrations. Notifications are recorded but emit nothing
    /// until [`commit_installation`](Self::commit_installation).
    pub(crate) fn start_installation(self: &Arc<Self>) -> Result<(), ServiceError> {
        let dependent: Arc<dyn Dependent> = self.clone();
        for dependency in &self.dependencies {
            dependency.add_dependent(dependent.clone());
        }
        if let Some(parent) = &self.parent {
            parent.add_child(self.clone())?;
        }
        self.primary.set_instance(self.clone())?;
        for alias in &self.aliases {
            alias.set_instance(self.clone())?;
        }
        Ok(())
    }

    /// Finalizes the install: seeds the mode, runs initial listeners, and
    /// releases the automaton from `NEW`.
    pub(crate) fn commit_installation(&self, initial_mode: Mode) -> Result<(), ServiceError> {
        let mut listener_added = Vec::new();
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            debug_assert_eq!(g.counters.substate, Substate::New);
            listener_added.extend(g.listeners.iter().cloned());
            self.apply_mode_locked(&mut g, initial_mode, &mut tasks)?;
            let snapshot = self.availability_snapshot(&g);
            tasks.push(Task::ServiceAvailable(snapshot));
            // One placeholder keeps the automaton parked while the
            // listener_added batch below runs on this thread.
            g.counters.async_tasks += (listener_added.len() + tasks.len() + 1) as i32;
        }
        self.execute_tasks(tasks);
        for listener in listener_added {
            self.run_listener_task(listener, Notice::Added);
        }
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            if !g.counters.immediate_unavailable.is_empty() || g.counters.transitive_unavailable > 0
            {
                tasks.push(Task::DependencyUnavailable(self.dependents_snapshot(&g)));
            }
            if g.counters.fail_count > 0 {
                tasks.push(Task::DependencyFailed(self.dependents_snapshot(&g)));
            }
            g.counters.substate = Substate::Down;
            g.counters.async_tasks -= 1;
            self.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
        Ok(())
    }

    /// Unwinds a partially wired install. The controller lands in
    /// `Cancelled` and is detached from everything it reached.
    pub(crate) fn rollback_installation(&self) {
        {
            let mut g = self.lock();
            g.counters.mode = Mode::Remove;
            g.counters.async_tasks += 1;
            g.counters.substate = Substate::Cancelled;
        }
        self.run_task(Task::Remove);
    }

    // ---------------------------
    // Demand
    // ---------------------------

    pub(crate) fn add_demand(&self) {
        self.add_demands(1);
    }

    /// Places `count` demands at once (accumulated registration demands are
    /// forwarded in one batch at install).
    pub(crate) fn add_demands(&self, count: i32) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            let previous = g.counters.demanded_by;
            g.counters.demanded_by += count;
            let propagate = previous == 0
                && matches!(g.counters.mode, Mode::OnDemand | Mode::Passive | Mode::Active);
            if previous == 0 && g.counters.mode == Mode::OnDemand {
                debug_assert!(g.counters.upper < 1);
                g.counters.upper += 1;
                self.transition_locked(&mut g, &mut tasks);
            }
            if propagate {
                tasks.push(Task::DemandParents);
            }
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    pub(crate) fn remove_demand(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            g.counters.demanded_by -= 1;
            let remaining = g.counters.demanded_by;
            let propagate =
                remaining == 0 && matches!(g.counters.mode, Mode::OnDemand | Mode::Passive);
            if remaining == 0 && g.counters.mode == Mode::OnDemand {
                g.counters.upper -= 1;
                self.transition_locked(&mut g, &mut tasks);
            }
            if propagate {
                tasks.push(Task::UndemandParents);
            }
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    // ---------------------------
    // Running dependents
    // ---------------------------

    pub(crate) fn dependent_started(&self) {
        let mut g = self.lock();
        g.counters.running_dependents += 1;
    }

    pub(crate) fn dependent_stopped(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            g.counters.running_dependents -= 1;
            if g.counters.running_dependents != 0 {
                return;
            }
            self.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    // ---------------------------
    // Children
    // ---------------------------

    /// Registers `child` as a child of this service.
    ///
    /// Only legal while this service is starting or up; the child is
    /// brought up to date like any new dependent.
    pub(crate) fn add_child(&self, child: Arc<ServiceController>) -> Result<(), ServiceError> {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            match g.counters.substate {
                Substate::StartInitiating
                | Substate::Starting
                | Substate::Up
                | Substate::StopRequested => {
                    g.children.push(child.clone());
                    self.new_dependent_tasks(&g, self.name().clone(), child, &mut tasks);
                }
                _ => {
                    return Err(ServiceError::ChildRejected {
                        name: self.name().clone(),
                    })
                }
            }
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
        Ok(())
    }

    /// Detaches a removed child. When the last child goes while this
    /// service waits in `StartFailed` or `Stopping`, the placeholder token
    /// is released and the automaton re-evaluated.
    pub(crate) fn remove_child(&self, child: &Arc<ServiceController>) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            let before = g.children.len();
            g.children.retain(|c| !Arc::ptr_eq(c, child));
            if g.children.len() == before || !g.children.is_empty() {
                return;
            }
            match g.counters.substate {
                Substate::StartFailed | Substate::Stopping => {
                    // Last child removed: release the placeholder.
                    g.counters.async_tasks -= 1;
                    self.transition_locked(&mut g, &mut tasks);
                }
                _ => return,
            }
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    /// Attaches a dependent registered against one of this controller's
    /// names, and brings it up to date.
    ///
    /// The registration set mutation happens under this controller's lock
    /// so it is atomic with the dependent snapshots concurrent transitions
    /// take.
    pub(crate) fn attach_dependent(
        &self,
        registration: &ServiceRegistration,
        dependent: Arc<dyn Dependent>,
    ) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            registration.push_dependent(dependent.clone());
            self.new_dependent_tasks(&g, registration.name().clone(), dependent, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn new_dependent_tasks(
        &self,
        g: &Inner,
        via_name: ServiceName,
        dependent: Arc<dyn Dependent>,
        tasks: &mut Vec<Task>,
    ) {
        let single: DependentSnapshot = vec![dependent.clone()];
        if g.counters.fail_count > 0 {
            tasks.push(Task::DependencyFailed(single.clone()));
        }
        if !g.counters.immediate_unavailable.is_empty() || g.counters.transitive_unavailable > 0 {
            tasks.push(Task::DependencyUnavailable(single.clone()));
        }
        match g.counters.substate {
            // Unavailability was announced before this dependent attached.
            Substate::WontStart
            | Substate::Removing
            | Substate::Removed
            | Substate::Cancelled => {
                tasks.push(Task::ServiceUnavailable(AvailabilitySnapshot::single(
                    via_name, dependent,
                )));
            }
            Substate::Up => tasks.push(Task::DependencyStarted(single)),
            _ => {}
        }
    }

    // ---------------------------
    // Mode plumbing
    // ---------------------------

    fn apply_mode_locked(
        &self,
        g: &mut Inner,
        new_mode: Mode,
        tasks: &mut Vec<Task>,
    ) -> Result<(), ServiceError> {
        let actions = apply_mode(&mut g.counters, self.name(), new_mode)?;
        if actions.remove_requested {
            self.listener_notice_tasks(g, Notice::RemoveRequested, tasks);
        }
        if actions.demand_parents {
            tasks.push(Task::DemandParents);
        }
        if actions.undemand_parents {
            tasks.push(Task::UndemandParents);
        }
        Ok(())
    }

    // ---------------------------
    // The automaton
    // ---------------------------

    /// Computes and takes the next transition, appending its side-effect
    /// tasks. Call under the lock; the caller accounts for the tasks and
    /// submits them after releasing it.
    fn transition_locked(&self, g: &mut Inner, tasks: &mut Vec<Task>) {
        use Transition::*;
        let Some(transition) = next_transition(&g.counters, g.listeners.is_empty()) else {
            return;
        };
        let before = g.counters.substate;
        match transition {
            DownToWontStart => {
                tasks.push(Task::ServiceUnavailable(self.availability_snapshot(g)));
            }
            WontStartToDown => {
                tasks.push(Task::ServiceAvailable(self.availability_snapshot(g)));
            }
            StoppingToWontStart | StoppingToDown => {
                if transition == StoppingToWontStart {
                    tasks.push(Task::ServiceUnavailable(self.availability_snapshot(g)));
                }
                self.listener_notice_tasks(g, Notice::State(transition.after().state()), tasks);
                tasks.push(Task::DependentStopped);
            }
            ProblemToWontStart | ProblemToDown => {
                if transition == ProblemToWontStart {
                    tasks.push(Task::ServiceUnavailable(self.availability_snapshot(g)));
                }
                if !g.counters.immediate_unavailable.is_empty() {
                    self.listener_notice_tasks(g, Notice::ImmediateAvailable, tasks);
                }
                if g.counters.transitive_unavailable > 0 {
                    self.listener_notice_tasks(g, Notice::TransitiveAvailable, tasks);
                }
                if g.counters.fail_count > 0 {
                    self.listener_notice_tasks(g, Notice::DependencyFailureClear, tasks);
                }
                self.listener_notice_tasks(g, Notice::DependencyProblemClear, tasks);
            }
            StartRequestedToWontStart | StartRequestedToDown => {
                if transition == StartRequestedToWontStart {
                    tasks.push(Task::ServiceUnavailable(self.availability_snapshot(g)));
                }
                self.listener_notice_tasks(g, Notice::StartRequestCleared, tasks);
            }
            WontStartToStartInitiating
            | ProblemToStartInitiating
            | DownToStartInitiating
            | StartRequestedToStartInitiating => {
                if transition == WontStartToStartInitiating {
                    tasks.push(Task::ServiceAvailable(self.availability_snapshot(g)));
                }
                if transition != StartRequestedToStartInitiating {
                    // The stamp was already taken when the start request
                    // was granted.
                    g.counters.lifecycle_at = Instant::now();
                }
                tasks.push(Task::DependentStarted);
            }
            WontStartToProblem | DownToProblem | StartRequestedToProblem => {
                if transition == WontStartToProblem {
                    tasks.push(Task::ServiceAvailable(self.availability_snapshot(g)));
                }
                if !g.counters.immediate_unavailable.is_empty() {
                    self.listener_notice_tasks(g, Notice::ImmediateUnavailable, tasks);
                }
                if g.counters.transitive_unavailable > 0 {
                    self.listener_notice_tasks(g, Notice::TransitiveUnavailable, tasks);
                }
                if g.counters.fail_count > 0 {
                    self.listener_notice_tasks(g, Notice::DependencyFailure, tasks);
                }
                self.listener_notice_tasks(g, Notice::DependencyProblem, tasks);
            }
            UpToStopRequested => {
                self.listener_notice_tasks(g, Notice::StopRequested, tasks);
                g.counters.lifecycle_at = Instant::now();
                tasks.push(Task::DependencyStopped(self.dependents_snapshot(g)));
            }
            StartingToUp => {
                self.listener_notice_tasks(g, Notice::State(State::Up), tasks);
                tasks.push(Task::DependencyStarted(self.dependents_snapshot(g)));
            }
            StartingToStartFailed => {
                self.schedule_child_removal(g, tasks);
                self.listener_notice_tasks(g, Notice::State(State::StartFailed), tasks);
                tasks.push(Task::DependencyFailed(self.dependents_snapshot(g)));
            }
            StartFailedToStarting => {
                self.listener_notice_tasks(g, Notice::FailedStarting, tasks);
                tasks.push(Task::DependencyRetrying(self.dependents_snapshot(g)));
                tasks.push(Task::DependentStarted);
            }
            StartInitiatingToStarting => {
                self.listener_notice_tasks(g, Notice::State(State::Starting), tasks);
                tasks.push(Task::Start { inject: true });
            }
            StartFailedToWontStart | StartFailedToDown => {
                if transition == StartFailedToWontStart {
                    tasks.push(Task::ServiceUnavailable(self.availability_snapshot(g)));
                }
                g.counters.start_error = None;
                g.counters.fail_count -= 1;
                self.listener_notice_tasks(g, Notice::FailedStopped, tasks);
                tasks.push(Task::DependencyRetrying(self.dependents_snapshot(g)));
                tasks.push(Task::Stop { only_uninject: true });
                tasks.push(Task::DependentStopped);
            }
            StopRequestedToUp => {
                self.listener_notice_tasks(g, Notice::StopRequestCleared, tasks);
                tasks.push(Task::DependencyStarted(self.dependents_snapshot(g)));
            }
            StopRequestedToStopping => {
                self.schedule_child_removal(g, tasks);
                self.listener_notice_tasks(g, Notice::State(State::Stopping), tasks);
                tasks.push(Task::Stop {
                    only_uninject: false,
                });
            }
            ProblemToRemoving | StartRequestedToRemoving | DownToRemoving | WontStartToRemoving => {
                if transition == ProblemToRemoving {
                    if !g.counters.immediate_unavailable.is_empty() {
                        self.listener_notice_tasks(g, Notice::ImmediateAvailable, tasks);
                    }
                    if g.counters.transitive_unavailable > 0 {
                        self.listener_notice_tasks(g, Notice::TransitiveAvailable, tasks);
                    }
                    if g.counters.fail_count > 0 {
                        self.listener_notice_tasks(g, Notice::DependencyFailureClear, tasks);
                    }
                    self.listener_notice_tasks(g, Notice::DependencyProblemClear, tasks);
                }
                if matches!(transition, ProblemToRemoving | StartRequestedToRemoving) {
                    self.listener_notice_tasks(g, Notice::StartRequestCleared, tasks);
                }
                if transition != WontStartToRemoving {
                    // WONT_START already told dependents it was unavailable.
                    tasks.push(Task::ServiceUnavailable(self.availability_snapshot(g)));
                }
                if !g.counters.immediate_unavailable.is_empty()
                    || g.counters.transitive_unavailable > 0
                {
                    tasks.push(Task::DependencyAvailable(self.dependents_snapshot(g)));
                }
                if g.counters.fail_count > 0 {
                    tasks.push(Task::DependencyRetrying(self.dependents_snapshot(g)));
                }
                tasks.push(Task::Remove);
            }
            RemovingToRemoved => {
                self.listener_notice_tasks(g, Notice::State(State::Removed), tasks);
                g.listeners.clear();
            }
            WontStartToStartRequested | DownToStartRequested | ProblemToStartRequested => {
                if transition == WontStartToStartRequested {
                    tasks.push(Task::ServiceAvailable(self.availability_snapshot(g)));
                }
                if transition != ProblemToStartRequested {
                    // PROBLEM already announced the request when it was
                    // first granted.
                    self.listener_notice_tasks(g, Notice::StartRequested, tasks);
                }
                g.counters.lifecycle_at = Instant::now();
            }
        }
        g.counters.substate = transition.after();
        tracing::debug!(
            service = %self.name(),
            from = ?before,
            to = ?g.counters.substate,
            "transition"
        );
    }

    /// Invalidates the child target and schedules removal of all children,
    /// parking one placeholder token that the last removed child releases.
    fn schedule_child_removal(&self, g: &mut Inner, tasks: &mut Vec<Task>) {
        if let Some(target) = g.child_target.take() {
            target.invalidate();
        }
        if !g.children.is_empty() {
            g.counters.async_tasks += 1;
            tasks.push(Task::RemoveChildren(g.children.clone()));
        }
    }

    fn listener_notice_tasks(&self, g: &Inner, notice: Notice, tasks: &mut Vec<Task>) {
        for listener in &g.listeners {
            tasks.push(Task::Listener {
                listener: listener.clone(),
                notice,
            });
        }
    }

    // ---------------------------
    // Snapshots
    // ---------------------------

    /// Every dependent of this service, children included, flattened.
    fn dependents_snapshot(&self, g: &Inner) -> DependentSnapshot {
        let mut out = self.primary.dependents_snapshot();
        out.extend(
            g.children
                .iter()
                .map(|c| c.clone() as Arc<dyn Dependent>),
        );
        for alias in &self.aliases {
            out.extend(alias.dependents_snapshot());
        }
        out
    }

    /// Dependents grouped by the name they depend on, for notifications
    /// that carry the dependency name.
    fn availability_snapshot(&self, g: &Inner) -> AvailabilitySnapshot {
        let mut by_name = vec![(self.name().clone(), self.primary.dependents_snapshot())];
        for alias in &self.aliases {
            by_name.push((alias.name().clone(), alias.dependents_snapshot()));
        }
        AvailabilitySnapshot {
            by_name,
            children: g
                .children
                .iter()
                .map(|c| c.clone() as Arc<dyn Dependent>)
                .collect(),
            primary: self.name().clone(),
        }
    }

    // ---------------------------
    // Task execution
    // ---------------------------

    fn execute_tasks(&self, tasks: Vec<Task>) {
        if tasks.is_empty() {
            return;
        }
        let Some(me) = self.me.upgrade() else { return };
        for task in tasks {
            let controller = me.clone();
            self.container
                .execute_or_inline(Box::new(move || controller.run_task(task)));
        }
    }

    pub(crate) fn execute_job(&self, job: Job) {
        self.container.execute_or_inline(job);
    }

    pub(crate) fn run_task(&self, task: Task) {
        match task {
            Task::Start { inject } => self.run_start_task(inject),
            Task::Stop { only_uninject } => self.run_stop_task(only_uninject),
            Task::Listener { listener, notice } => self.run_listener_task(listener, notice),
            other => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.run_effects(&other))) {
                    tracing::error!(
                        service = %self.name(),
                        panic = %panic_message(&payload),
                        "internal task error"
                    );
                }
                self.finish_task();
            }
        }
    }

    /// Re-enters the lock after a task's effects: gives back the task's
    /// token and drives the automaton.
    fn finish_task(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            g.counters.async_tasks -= 1;
            self.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn run_effects(&self, task: &Task) {
        match task {
            Task::DemandParents => {
                for dependency in &self.dependencies {
                    dependency.add_demand();
                }
                if let Some(parent) = &self.parent {
                    parent.add_demand();
                }
            }
            Task::UndemandParents => {
                for dependency in &self.dependencies {
                    dependency.remove_demand();
                }
                if let Some(parent) = &self.parent {
                    parent.remove_demand();
                }
            }
            Task::DependentStarted => {
                for dependency in &self.dependencies {
                    dependency.dependent_started();
                }
                if let Some(parent) = &self.parent {
                    parent.dependent_started();
                }
            }
            Task::DependentStopped => {
                for dependency in &self.dependencies {
                    dependency.dependent_stopped();
                }
                if let Some(parent) = &self.parent {
                    parent.dependent_stopped();
                }
            }
            Task::ServiceAvailable(snapshot) => {
                for (name, dependents) in &snapshot.by_name {
                    for dependent in dependents {
                        dependent.immediate_dependency_available(name);
                    }
                }
                for child in &snapshot.children {
                    child.immediate_dependency_available(&snapshot.primary);
                }
            }
            Task::ServiceUnavailable(snapshot) => {
                for (name, dependents) in &snapshot.by_name {
                    for dependent in dependents {
                        dependent.immediate_dependency_unavailable(name);
                    }
                }
                for child in &snapshot.children {
                    child.immediate_dependency_unavailable(&snapshot.primary);
                }
            }
            Task::DependencyStarted(dependents) => {
                for dependent in dependents {
                    dependent.immediate_dependency_up();
                }
            }
            Task::DependencyStopped(dependents) => {
                for dependent in dependents {
                    dependent.immediate_dependency_down();
                }
            }
            Task::DependencyFailed(dependents) => {
                for dependent in dependents {
                    dependent.dependency_failed();
                }
            }
            Task::DependencyRetrying(dependents) => {
                for dependent in dependents {
                    dependent.dependency_failure_cleared();
                }
            }
            Task::DependencyAvailable(dependents) => {
                for dependent in dependents {
                    dependent.transitive_dependency_available();
                }
            }
            Task::DependencyUnavailable(dependents) => {
                for dependent in dependents {
                    dependent.transitive_dependency_unavailable();
                }
            }
            Task::RemoveChildren(children) => {
                for child in children {
                    let _ = child.set_mode(Mode::Remove);
                }
            }
            Task::Remove => {
                debug_assert_eq!(self.lock().counters.mode, Mode::Remove);
                let Some(me) = self.me.upgrade() else { return };
                let dependent: Arc<dyn Dependent> = me.clone();
                self.primary.clear_instance(&me);
                for alias in &self.aliases {
                    alias.clear_instance(&me);
                }
                for dependency in &self.dependencies {
                    dependency.remove_dependent(&dependent);
                }
                if let Some(parent) = &self.parent {
                    parent.remove_child(&me);
                }
            }
            Task::Start { .. } | Task::Stop { .. } | Task::Listener { .. } => {
                debug_assert!(false, "dispatched before run_effects");
            }
        }
    }

    // ---------------------------
    // Start / stop execution
    // ---------------------------

    fn run_start_task(&self, inject: bool) {
        let Some(me) = self.me.upgrade() else { return };
        let started_at = Instant::now();
        let ctx = StartContext::new(me, started_at);
        let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<(), StartError> {
            if inject {
                self.perform_injections()?;
            }
            self.service.start(&ctx)
        }));
        match outcome {
            Ok(Ok(())) => {
                let mut tasks = Vec::new();
                {
                    let mut g = self.lock();
                    {
                        let mut cs = lock_cell(ctx.cell());
                        if *cs != ContextState::Sync {
                            // Armed asynchronous: that completion owns the
                            // token now.
                            return;
                        }
                        *cs = ContextState::Complete;
                    }
                    self.container
                        .write_profile(self.name(), 'S', started_at, Instant::now());
                    g.counters.async_tasks -= 1;
                    self.transition_locked(&mut g, &mut tasks);
                    g.counters.async_tasks += tasks.len() as i32;
                }
                if inject {
                    self.perform_out_injections();
                }
                self.execute_tasks(tasks);
            }
            Ok(Err(error)) => self.start_failed(error, ctx.cell(), started_at),
            Err(payload) => {
                self.start_failed(StartError::new(panic_message(&payload)), ctx.cell(), started_at)
            }
        }
    }

    fn start_failed(&self, error: StartError, cell: &ContextCell, started_at: Instant) {
        let error = error.with_service(self.name().clone());
        tracing::error!(service = %self.name(), error = %error, "service start failed");
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            {
                let mut cs = lock_cell(cell);
                if !matches!(*cs, ContextState::Sync | ContextState::Async) {
                    tracing::error!(
                        service = %self.name(),
                        "start failure reported after completion; ignored"
                    );
                    return;
                }
                *cs = ContextState::Failed;
            }
            g.counters.start_error = Some(error);
            self.container
                .write_profile(self.name(), 'F', started_at, Instant::now());
            g.counters.fail_count += 1;
            g.counters.async_tasks -= 1;
            self.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn run_stop_task(&self, only_uninject: bool) {
        let Some(me) = self.me.upgrade() else { return };
        let started_at = Instant::now();
        let ctx = StopContext::new(me, started_at);
        let mut stopped_cleanly = false;
        if !only_uninject {
            match catch_unwind(AssertUnwindSafe(|| self.service.stop(&ctx))) {
                Ok(Ok(())) => stopped_cleanly = true,
                Ok(Err(error)) => {
                    tracing::error!(service = %self.name(), error = %error, "service stop failed");
                }
                Err(payload) => {
                    tracing::error!(
                        service = %self.name(),
                        panic = %panic_message(&payload),
                        "service stop panicked"
                    );
                }
            }
        }
        {
            let _g = self.lock();
            let mut cs = lock_cell(ctx.cell());
            if stopped_cleanly && *cs != ContextState::Sync {
                // Armed asynchronous: that completion owns the token now.
                return;
            }
            *cs = ContextState::Complete;
        }
        self.uninject_all();
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            self.container
                .write_profile(self.name(), 'X', started_at, Instant::now());
            g.counters.async_tasks -= 1;
            self.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    // ---------------------------
    // Asynchronous completion
    // ---------------------------

    pub(crate) fn start_async_complete(
        controller: &ServiceRef,
        cell: &ContextCell,
        started_at: Instant,
    ) -> Result<(), ServiceError> {
        let mut tasks = Vec::new();
        {
            let mut g = controller.lock();
            {
                let mut cs = lock_cell(cell);
                if *cs != ContextState::Async {
                    return Err(ServiceError::InvalidContext);
                }
                *cs = ContextState::Complete;
            }
            controller
                .container
                .write_profile(controller.name(), 'S', started_at, Instant::now());
            g.counters.async_tasks -= 1;
            controller.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        controller.execute_tasks(tasks);
        Ok(())
    }

    pub(crate) fn start_async_fail(
        controller: &ServiceRef,
        cell: &ContextCell,
        started_at: Instant,
        error: StartError,
    ) -> Result<(), ServiceError> {
        let mut tasks = Vec::new();
        {
            let mut g = controller.lock();
            {
                let mut cs = lock_cell(cell);
                if *cs != ContextState::Async {
                    return Err(ServiceError::InvalidContext);
                }
                *cs = ContextState::Failed;
            }
            let error = error.with_service(controller.name().clone());
            tracing::error!(service = %controller.name(), error = %error, "service start failed");
            g.counters.start_error = Some(error);
            controller
                .container
                .write_profile(controller.name(), 'F', started_at, Instant::now());
            g.counters.fail_count += 1;
            g.counters.async_tasks -= 1;
            controller.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        controller.execute_tasks(tasks);
        Ok(())
    }

    pub(crate) fn stop_async_complete(
        controller: &ServiceRef,
        cell: &ContextCell,
        started_at: Instant,
    ) -> Result<(), ServiceError> {
        {
            let _g = controller.lock();
            let mut cs = lock_cell(cell);
            if *cs != ContextState::Async {
                return Err(ServiceError::InvalidContext);
            }
            *cs = ContextState::Complete;
        }
        controller.uninject_all();
        let mut tasks = Vec::new();
        {
            let mut g = controller.lock();
            controller
                .container
                .write_profile(controller.name(), 'X', started_at, Instant::now());
            g.counters.async_tasks -= 1;
            controller.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        controller.execute_tasks(tasks);
        Ok(())
    }

    // ---------------------------
    // Listeners
    // ---------------------------

    fn run_listener_task(&self, listener: Arc<dyn ServiceListener>, notice: Notice) {
        if self.container.profile_enabled() {
            let invoked_at = Instant::now();
            self.invoke_listener(&listener, notice);
            self.container
                .write_profile(self.name(), 'L', invoked_at, Instant::now());
        } else {
            self.invoke_listener(&listener, notice);
        }
    }

    /// Invokes one notification, isolating panics, then reconciles the
    /// outstanding-task counter.
    fn invoke_listener(&self, listener: &Arc<dyn ServiceListener>, notice: Notice) {
        if let Some(me) = self.me.upgrade() {
            if let Err(payload) =
                catch_unwind(AssertUnwindSafe(|| self.dispatch_notice(&me, listener, notice)))
            {
                tracing::error!(
                    service = %self.name(),
                    panic = %panic_message(&payload),
                    "listener panicked"
                );
            }
        }
        self.finish_task();
    }

    fn dispatch_notice(&self, me: &ServiceRef, listener: &Arc<dyn ServiceListener>, notice: Notice) {
        match notice {
            Notice::Added => listener.listener_added(me),
            Notice::State(state) => match state {
                State::Down => listener.service_stopped(me),
                State::Starting => listener.service_starting(me),
                State::StartFailed => {
                    let error = self.lock().counters.start_error.clone().unwrap_or_else(|| {
                        StartError::new("start failed").with_service(self.name().clone())
                    });
                    listener.service_failed(me, &error);
                }
                State::Up => listener.service_started(me),
                State::Stopping => listener.service_stopping(me),
                State::Removed => listener.service_removed(me),
            },
            Notice::StartRequested => listener.service_start_requested(me),
            Notice::StartRequestCleared => listener.service_start_request_cleared(me),
            Notice::StopRequested => listener.service_stop_requested(me),
            Notice::StopRequestCleared => listener.service_stop_request_cleared(me),
            Notice::DependencyFailure => listener.dependency_failed(me),
            Notice::DependencyFailureClear => listener.dependency_failure_cleared(me),
            Notice::ImmediateUnavailable => listener.immediate_dependency_unavailable(me),
            Notice::ImmediateAvailable => listener.immediate_dependency_available(me),
            Notice::TransitiveUnavailable => listener.transitive_dependency_unavailable(me),
            Notice::TransitiveAvailable => listener.transitive_dependency_available(me),
            Notice::DependencyProblem => listener.dependency_problem(me),
            Notice::DependencyProblemClear => listener.dependency_problem_cleared(me),
            Notice::RemoveRequested => listener.service_remove_requested(me),
            Notice::FailedStarting => listener.failed_service_starting(me),
            Notice::FailedStopped => listener.failed_service_stopped(me),
        }
    }

    // ---------------------------
    // Injections
    // ---------------------------

    fn perform_injections(&self) -> Result<(), StartError> {
        let own = || self.service.value();
        for (index, injection) in self.injections.iter().enumerate() {
            if let Err(error) = injection.inject(&own) {
                for done in &self.injections[..=index] {
                    done.uninject();
                }
                return Err(error);
            }
        }
        Ok(())
    }

    fn perform_out_injections(&self) {
        let own = || self.service.value();
        for injection in &self.out_injections {
            if let Err(error) = injection.inject(&own) {
                tracing::warn!(service = %self.name(), error = %error, "out injection failed");
            }
        }
    }

    fn uninject_all(&self) {
        for injection in self.injections.iter().chain(&self.out_injections) {
            if catch_unwind(AssertUnwindSafe(|| injection.uninject())).is_err() {
                tracing::warn!(service = %self.name(), "uninject panicked");
            }
        }
    }

    // ---------------------------
    // Context support
    // ---------------------------

    pub(crate) fn child_target(&self, cell: &ContextCell) -> Result<Arc<ChildTarget>, ServiceError> {
        let Some(me) = self.me.upgrade() else {
            return Err(ServiceError::InvalidContext);
        };
        let mut g = self.lock();
        {
            let cs = lock_cell(cell);
            if matches!(*cs, ContextState::Complete | ContextState::Failed) {
                return Err(ServiceError::InvalidContext);
            }
        }
        let target = match &g.child_target {
            Some(target) => target.clone(),
            None => {
                let target = ChildTarget::new(self.container.clone(), me);
                g.child_target = Some(target.clone());
                target
            }
        };
        Ok(target)
    }

    pub(crate) fn lifecycle_elapsed(&self) -> Duration {
        self.lock().counters.lifecycle_at.elapsed()
    }

    #[cfg(test)]
    pub(crate) fn counters_snapshot(&self) -> (i32, i32, i32, i32, i32, i32) {
        let g = self.lock();
        (
            g.counters.upper,
            g.counters.down_dependencies,
            g.counters.demanded_by,
            g.counters.running_dependents,
            g.counters.fail_count,
            g.counters.async_tasks,
        )
    }
}

impl Dependent for ServiceController {
    fn immediate_dependency_available(&self, name: &ServiceName) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            if !g.counters.immediate_unavailable.remove(name) {
                return;
            }
            if !g.counters.immediate_unavailable.is_empty() || g.counters.substate.is_dormant() {
                return;
            }
            // dropped to empty
            if g.counters.substate == Substate::Problem {
                self.listener_notice_tasks(&g, Notice::ImmediateAvailable, &mut tasks);
                if g.counters.transitive_unavailable == 0 && g.counters.fail_count == 0 {
                    self.listener_notice_tasks(&g, Notice::DependencyProblemClear, &mut tasks);
                }
            }
            if g.counters.transitive_unavailable == 0 {
                tasks.push(Task::DependencyAvailable(self.dependents_snapshot(&g)));
            }
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn immediate_dependency_unavailable(&self, name: &ServiceName) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            if !g.counters.immediate_unavailable.insert(name.clone()) {
                return;
            }
            if g.counters.immediate_unavailable.len() != 1 || g.counters.substate.is_dormant() {
                return;
            }
            // raised to one
            if g.counters.substate == Substate::Problem {
                self.listener_notice_tasks(&g, Notice::ImmediateUnavailable, &mut tasks);
            }
            // Dependents hear about the first problem only; they already
            // know if a transitive one is outstanding.
            if g.counters.transitive_unavailable == 0 {
                tasks.push(Task::DependencyUnavailable(self.dependents_snapshot(&g)));
            }
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn immediate_dependency_up(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            g.counters.down_dependencies -= 1;
            if g.counters.down_dependencies != 0 {
                return;
            }
            self.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn immediate_dependency_down(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            g.counters.down_dependencies += 1;
            if g.counters.down_dependencies != 1 {
                return;
            }
            self.transition_locked(&mut g, &mut tasks);
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn transitive_dependency_available(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            g.counters.transitive_unavailable -= 1;
            if g.counters.transitive_unavailable != 0 || g.counters.substate.is_dormant() {
                return;
            }
            // dropped to zero
            if g.counters.substate == Substate::Problem {
                self.listener_notice_tasks(&g, Notice::TransitiveAvailable, &mut tasks);
                if g.counters.fail_count == 0 && g.counters.immediate_unavailable.is_empty() {
                    self.listener_notice_tasks(&g, Notice::DependencyProblemClear, &mut tasks);
                }
            }
            if g.counters.immediate_unavailable.is_empty() {
                tasks.push(Task::DependencyAvailable(self.dependents_snapshot(&g)));
            }
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn transitive_dependency_unavailable(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            g.counters.transitive_unavailable += 1;
            if g.counters.transitive_unavailable != 1 || g.counters.substate.is_dormant() {
                return;
            }
            // raised to one
            if g.counters.substate == Substate::Problem {
                self.listener_notice_tasks(&g, Notice::TransitiveUnavailable, &mut tasks);
            }
            if g.counters.immediate_unavailable.is_empty() {
                tasks.push(Task::DependencyUnavailable(self.dependents_snapshot(&g)));
            }
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn dependency_failed(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            g.counters.fail_count += 1;
            if g.counters.fail_count != 1 || g.counters.substate.is_dormant() {
                return;
            }
            // raised to one
            if g.counters.substate == Substate::Problem {
                self.listener_notice_tasks(&g, Notice::DependencyFailure, &mut tasks);
            }
            tasks.push(Task::DependencyFailed(self.dependents_snapshot(&g)));
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }

    fn dependency_failure_cleared(&self) {
        let mut tasks = Vec::new();
        {
            let mut g = self.lock();
            g.counters.fail_count -= 1;
            if g.counters.fail_count != 0 || g.counters.substate == Substate::Cancelled {
                return;
            }
            // dropped to zero
            if g.counters.substate == Substate::Problem {
                self.listener_notice_tasks(&g, Notice::DependencyFailureClear, &mut tasks);
                if g.counters.transitive_unavailable == 0
                    && g.counters.immediate_unavailable.is_empty()
                {
                    self.listener_notice_tasks(&g, Notice::DependencyProblemClear, &mut tasks);
                }
            }
            tasks.push(Task::DependencyRetrying(self.dependents_snapshot(&g)));
            g.counters.async_tasks += tasks.len() as i32;
        }
        self.execute_tasks(tasks);
    }
}

impl fmt::Debug for ServiceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceController")
            .field("name", self.name())
            .field("substate", &self.substate())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerConfig, ServiceContainer};
    use crate::executor::InlineExecutor;
    use crate::service::ServiceFn;

    fn inline_container() -> Arc<ServiceContainer> {
        ServiceContainer::with_config(ContainerConfig {
            executor: Some(Arc::new(InlineExecutor)),
            ..Default::default()
        })
        .expect("container")
    }

    #[test]
    fn demand_round_trip_leaves_counters_unchanged() {
        let container = inline_container();
        let name = ServiceName::of("core.ondemand");
        let h = container
            .add_service(name.clone(), ServiceFn::null())
            .initial_mode(Mode::OnDemand)
            .install()
            .unwrap();
        assert_eq!(h.substate(), Substate::Down);
        let before = h.counters_snapshot();

        // One demand drives it up; retracting it settles everything back.
        let registration = container.registration(&name);
        registration.add_demand();
        assert_eq!(h.substate(), Substate::Up);
        registration.remove_demand();
        assert_eq!(h.substate(), Substate::Down);

        assert_eq!(h.counters_snapshot(), before);
    }

    #[test]
    fn up_implies_no_down_dependencies_and_no_error() {
        let container = inline_container();
        container
            .add_service("core.dep", ServiceFn::null())
            .initial_mode(Mode::Active)
            .install()
            .unwrap();
        let a = container
            .add_service("core.a", ServiceFn::null())
            .dependency("core.dep")
            .initial_mode(Mode::Active)
            .install()
            .unwrap();

        assert_eq!(a.substate(), Substate::Up);
        let (upper, down, _, _, fail, async_tasks) = a.counters_snapshot();
        assert_eq!(upper, 1);
        assert_eq!(down, 0);
        assert_eq!(fail, 0);
        assert_eq!(async_tasks, 0);
        assert!(a.start_error().is_none());
    }

    #[test]
    fn running_dependents_gate_the_stop() {
        let container = inline_container();
        let dep = container
            .add_service("gate.dep", ServiceFn::null())
            .initial_mode(Mode::Active)
            .install()
            .unwrap();
        container
            .add_service("gate.user", ServiceFn::null())
            .dependency("gate.dep")
            .initial_mode(Mode::Active)
            .install()
            .unwrap();

        let (_, _, _, running, _, _) = dep.counters_snapshot();
        assert_eq!(running, 1);

        // Inline execution settles the cascading stop before returning.
        dep.set_mode(Mode::Never).unwrap();
        assert_eq!(dep.substate(), Substate::WontStart);
        let (_, _, _, running, _, _) = dep.counters_snapshot();
        assert_eq!(running, 0);
    }

    #[test]
    fn retry_outside_start_failed_is_a_no_op() {
        let container = inline_container();
        let a = container
            .add_service("noop.a", ServiceFn::null())
            .initial_mode(Mode::Active)
            .install()
            .unwrap();
        assert_eq!(a.substate(), Substate::Up);
        a.retry();
        assert_eq!(a.substate(), Substate::Up);
    }

    #[derive(Default)]
    struct CountingDependent {
        unavailable: std::sync::atomic::AtomicU32,
        available: std::sync::atomic::AtomicU32,
    }

    impl Dependent for CountingDependent {
        fn immediate_dependency_available(&self, _name: &ServiceName) {}
        fn immediate_dependency_unavailable(&self, _name: &ServiceName) {}
        fn immediate_dependency_up(&self) {}
        fn immediate_dependency_down(&self) {}
        fn transitive_dependency_available(&self) {
            self.available
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        fn transitive_dependency_unavailable(&self) {
            self.unavailable
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        fn dependency_failed(&self) {}
        fn dependency_failure_cleared(&self) {}
    }

    #[test]
    fn availability_forwarding_waits_for_both_dimensions() {
        use std::sync::atomic::Ordering::SeqCst;

        let container = inline_container();
        let name = ServiceName::of("dim.a");
        let a = container
            .add_service(name.clone(), ServiceFn::null())
            .initial_mode(Mode::Never)
            .install()
            .unwrap();
        assert_eq!(a.substate(), Substate::WontStart);

        let watcher = Arc::new(CountingDependent::default());
        container
            .registration(&name)
            .add_dependent(watcher.clone() as Arc<dyn Dependent>);

        // First problem in either dimension is forwarded once.
        a.transitive_dependency_unavailable();
        assert_eq!(watcher.unavailable.load(SeqCst), 1);
        let missing = ServiceName::of("dim.missing");
        a.immediate_dependency_unavailable(&missing);
        assert_eq!(watcher.unavailable.load(SeqCst), 1);

        // The immediate set emptying while a transitive problem remains
        // does not forward availability.
        a.immediate_dependency_available(&missing);
        assert_eq!(watcher.available.load(SeqCst), 0);

        // Only when both dimensions clear does availability go out.
        a.transitive_dependency_available();
        assert_eq!(watcher.available.load(SeqCst), 1);
    }
}
