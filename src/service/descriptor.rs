//! # Descriptor: identity token of a registered service.
//!
//! A [`Descriptor`] is what the engine schedules: an identity-comparable
//! handle carrying the service name, the declared run level (if the service
//! participates in levelling) and the names of the services it depends on.
//!
//! ## Rules
//! - Identity is a process-unique `u64` drawn from a global counter;
//!   equality and hashing use only the id.
//! - A descriptor without a declared level is activated on demand as a
//!   dependency but never appears in a level snapshot and is never torn
//!   down by a descent.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Global counter for descriptor identity.
static DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(0);

/// Identity-comparable handle to a registered service.
#[derive(Debug)]
pub struct Descriptor {
    /// Process-unique identity.
    id: u64,
    /// Stable service name (unique within a registry).
    name: String,
    /// Declared run level; `None` = does not participate in levelling.
    level: Option<i32>,
    /// Names of the services this one depends on.
    dependencies: Vec<String>,
}

impl Descriptor {
    pub(crate) fn new(
        name: impl Into<String>,
        level: Option<i32>,
        dependencies: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: DESCRIPTOR_ID.fetch_add(1, AtomicOrdering::Relaxed),
            name: name.into(),
            level,
            dependencies,
        })
    }

    /// Process-unique identity of this descriptor.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared run level, if the service participates in levelling.
    pub fn level(&self) -> Option<i32> {
        self.level
    }

    /// Names of the services this one depends on.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Descriptor {}

impl Hash for Descriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
