//! # Controller modes.
//!
//! [`Mode`] is the user-facing policy governing whether a service is
//! permitted or desired to run. It feeds the readiness counter (`upper`):
//! `Active` and `Passive` contribute +1 unconditionally, `OnDemand`
//! contributes +1 only while the service is demanded, `Never` and `Remove`
//! contribute nothing.
//!
//! `Remove` is terminal: once set, no other mode is accepted.

/// User-facing policy for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The service will not start, but stays installed.
    Never,
    /// The service starts only while at least one dependent demands it.
    OnDemand,
    /// The service starts once its dependencies are up, without demanding
    /// them.
    Passive,
    /// The service starts as soon as possible and demands its dependencies.
    Active,
    /// The service is to be removed. Terminal.
    Remove,
}

impl Mode {
    /// Returns a short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Mode::Never => "never",
            Mode::OnDemand => "on_demand",
            Mode::Passive => "passive",
            Mode::Active => "active",
            Mode::Remove => "remove",
        }
    }
}
