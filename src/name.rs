//! # Service names.
//!
//! Provides [`ServiceName`] — the identifier under which a service is
//! registered and by which dependencies are declared.
//!
//! Names are dotted paths (`"net.http.listener"`). They are cheap to clone
//! and compare; two names are equal iff their canonical strings are equal.

use std::fmt;
use std::sync::Arc;

/// Canonical, cheaply cloneable service identifier.
///
/// Construct with [`ServiceName::of`] or derive a child name with
/// [`ServiceName::append`]:
///
/// ```rust
/// use servisor::ServiceName;
///
/// let db = ServiceName::of("app.database");
/// let pool = db.append("pool");
/// assert_eq!(pool.as_str(), "app.database.pool");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(Arc<str>);

impl ServiceName {
    /// Creates a name from its canonical dotted form.
    pub fn of(name: impl AsRef<str>) -> Self {
        ServiceName(Arc::from(name.as_ref()))
    }

    /// Returns a new name with `part` appended as a trailing segment.
    pub fn append(&self, part: impl AsRef<str>) -> Self {
        ServiceName(Arc::from(format!("{}.{}", self.0, part.as_ref())))
    }

    /// Returns the canonical dotted form.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceName({})", self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        ServiceName::of(s)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        ServiceName(Arc::from(s))
    }
}
