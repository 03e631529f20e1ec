//! # Value injections.
//!
//! A [`ValueInjection`] moves a value into an [`Injector`] target when its
//! service starts and retracts it when the service stops. Forward injections
//! carry dependency values into the starting service; out injections publish
//! the started service's own value.
//!
//! Injection failures during start abort the start attempt; already
//! performed injections are rolled back. Failures while uninjecting are
//! logged and ignored.

use std::sync::Arc;

use crate::error::StartError;
use crate::graph::dependency::Dependency;
use crate::service::ServiceValue;

/// Receiving end of an injection.
pub trait Injector: Send + Sync + 'static {
    /// Accepts a value. `None` means the source has no value (an absent
    /// optional dependency).
    fn inject(&self, value: Option<ServiceValue>) -> Result<(), StartError>;

    /// Retracts a previously injected value.
    fn uninject(&self);
}

/// Where an injection's value comes from.
pub enum InjectionSource {
    /// The value of a dependency edge, read at start time.
    Dependency(Arc<dyn Dependency>),
    /// A fixed value.
    Value(ServiceValue),
    /// The installing service's own value (out injections).
    OwnValue,
}

/// A source/target pair applied around `start` and `stop`.
pub struct ValueInjection {
    pub(crate) source: InjectionSource,
    pub(crate) target: Arc<dyn Injector>,
}

impl ValueInjection {
    /// Creates an injection from `source` into `target`.
    pub fn new(source: InjectionSource, target: Arc<dyn Injector>) -> Self {
        ValueInjection { source, target }
    }

    /// Resolves the source and injects it, with `own` as the service's own
    /// value for [`InjectionSource::OwnValue`].
    pub(crate) fn inject(&self, own: &dyn Fn() -> Option<ServiceValue>) -> Result<(), StartError> {
        let value = match &self.source {
            InjectionSource::Dependency(dep) => dep
                .value()
                .map_err(|e| StartError::new(format!("injection source: {e}")))?,
            InjectionSource::Value(v) => Some(v.clone()),
            InjectionSource::OwnValue => own(),
        };
        self.target.inject(value)
    }

    pub(crate) fn uninject(&self) {
        self.target.uninject();
    }
}
