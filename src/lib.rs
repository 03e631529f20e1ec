//! # servisor
//!
//! **Servisor** is a dependency-aware service container: an in-process
//! runtime that installs named services, tracks their dependency graph, and
//! drives each one through its lifecycle (down → starting → up → stopping →
//! removed) in response to mode changes, dependency propagation, and demand.
//!
//! ## Features
//!
//! | Area             | Description                                                        | Key types / traits                          |
//! |------------------|--------------------------------------------------------------------|---------------------------------------------|
//! | **Services**     | Define lifecycle callbacks, sync or asynchronously completed.      | [`Service`], [`ServiceFn`], [`StartContext`] |
//! | **Dependencies** | Ordered, aliased, optional edges; demand propagation.              | [`ServiceBuilder`], [`Dependency`]          |
//! | **Modes**        | Per-service policy: never, on-demand, passive, active, remove.     | [`Mode`]                                    |
//! | **Listeners**    | Observe lifecycle and dependency-health notifications.             | [`ServiceListener`]                         |
//! | **Containers**   | Registry, worker executor, shutdown, profile output.               | [`ServiceContainer`], [`ContainerConfig`]   |
//! | **Errors**       | Typed API errors and captured start failures.                      | [`ServiceError`], [`StartError`]            |
//!
//! ## Guarantees
//!
//! - A service never enters the running state while any dependency is down,
//!   failed, or missing.
//! - Failures and availability changes propagate through the graph, both to
//!   dependents and to listeners.
//! - All lifecycle callbacks run serially per service on a shared worker
//!   pool, never under a controller lock.
//!
//! ```no_run
//! use servisor::{Mode, ServiceContainer, ServiceFn};
//!
//! fn main() -> Result<(), servisor::ServiceError> {
//!     let container = ServiceContainer::new()?;
//!
//!     container
//!         .add_service("app.database", ServiceFn::arc(
//!             |_ctx| {
//!                 println!("database up");
//!                 Ok(())
//!             },
//!             |_ctx| Ok(()),
//!         ))
//!         .initial_mode(Mode::OnDemand)
//!         .install()?;
//!
//!     // Installing an active dependent demands the database into starting.
//!     container
//!         .add_service("app.worker", ServiceFn::null())
//!         .dependency("app.database")
//!         .initial_mode(Mode::Active)
//!         .install()?;
//!
//!     // ...
//!     container.shutdown();
//!     Ok(())
//! }
//! ```

mod builder;
mod container;
mod controller;
mod error;
mod executor;
mod graph;
mod injection;
mod listener;
mod name;
mod service;
mod status;

pub use builder::{ChildTarget, ServiceBuilder};
pub use container::{ContainerConfig, ServiceContainer};
pub use controller::context::{StartContext, StartHandle, StopContext, StopHandle};
pub use controller::core::{ServiceController, ServiceRef};
pub use controller::mode::Mode;
pub use controller::state::{State, Substate};
pub use error::{ServiceError, StartError, StopError};
pub use executor::{Executor, InlineExecutor, Job, ThreadPoolExecutor};
pub use graph::dependency::{Dependency, Dependent};
pub use injection::{InjectionSource, Injector, ValueInjection};
pub use listener::ServiceListener;
pub use name::ServiceName;
pub use service::{Service, ServiceFn, ServiceValue};
pub use status::ServiceStatus;
