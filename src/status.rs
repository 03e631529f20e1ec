//! # Status snapshots.

use crate::controller::mode::Mode;
use crate::controller::state::{State, Substate};
use crate::name::ServiceName;

/// Point-in-time view of one controller, taken under its lock.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    /// Parent service, when installed as a child.
    pub parent: Option<ServiceName>,
    /// Primary name.
    pub name: ServiceName,
    /// Alias names.
    pub aliases: Vec<ServiceName>,
    /// Current mode.
    pub mode: Mode,
    /// Coarse state.
    pub state: State,
    /// Fine-grained state.
    pub substate: Substate,
    /// Declared dependency names, in order.
    pub dependencies: Vec<ServiceName>,
    /// True while an unresolved failure is counted against this service.
    pub failed: bool,
    /// True while a dependency is missing, immediately or transitively.
    pub problem: bool,
}
