//! # Service registry: declares which services run at which levels.
//!
//! The engine never discovers services on its own; it snapshots them per
//! level through the [`Locator`] trait. [`Registry`] is the built-in
//! implementation: services are declared up front as [`ServiceSpec`]s and
//! queried by level in registration order.
//!
//! ## Rules
//! - Service names are unique; a duplicate registration fails with
//!   [`OrchestratorError::ServiceExists`].
//! - Level snapshots preserve registration order; sorters may reorder a
//!   snapshot before scheduling.
//! - The set of services at a level is fixed once registered; registering
//!   during a transition affects only levels not yet snapshotted.

use std::sync::{Arc, RwLock};

use crate::error::OrchestratorError;
use crate::service::{Descriptor, ServiceHandle, ServiceRef};

/// Source of level snapshots and dependency resolution.
///
/// Implemented by [`Registry`]; an embedding container may provide its own.
pub trait Locator: Send + Sync + 'static {
    /// All services declared exactly at `level`, in registration order.
    fn handles_at_level(&self, level: i32) -> Vec<Arc<ServiceHandle>>;

    /// Resolves a dependency name to its handle.
    fn lookup(&self, name: &str) -> Option<Arc<ServiceHandle>>;
}

/// # Specification for registering a service.
///
/// Bundles together the service, its declared run level and the names of
/// the services it depends on.
///
/// ## Example
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use levelvisor::{Registry, ServiceFn, ServiceSpec, ServiceError};
///
/// let registry = Registry::new();
/// let db = ServiceFn::arc("db", |_ctx: CancellationToken| async {
///     Ok::<_, ServiceError>(())
/// });
/// let api = ServiceFn::arc("api", |_ctx: CancellationToken| async {
///     Ok::<_, ServiceError>(())
/// });
///
/// registry.register(ServiceSpec::new(db, 1)).unwrap();
/// registry
///     .register(ServiceSpec::new(api, 2).with_dependencies(["db"]))
///     .unwrap();
/// ```
pub struct ServiceSpec {
    service: ServiceRef,
    level: Option<i32>,
    dependencies: Vec<String>,
}

impl ServiceSpec {
    /// Declares a service at `level`: started when the orchestrator ascends
    /// through it, stopped when it descends back below.
    pub fn new(service: ServiceRef, level: i32) -> Self {
        Self {
            service,
            level: Some(level),
            dependencies: Vec::new(),
        }
    }

    /// Declares a support service with no level of its own.
    ///
    /// Support services are activated on demand when a levelled service
    /// depends on them and are not torn down by descents.
    pub fn support(service: ServiceRef) -> Self {
        Self {
            service,
            level: None,
            dependencies: Vec::new(),
        }
    }

    /// Names of services that must be up before this one starts.
    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = names.into_iter().map(Into::into).collect();
        self
    }

    /// The declared run level, if any.
    pub fn level(&self) -> Option<i32> {
        self.level
    }
}

/// Built-in [`Locator`]: an ordered list of registered services.
#[derive(Default)]
pub struct Registry {
    services: RwLock<Vec<Arc<ServiceHandle>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a service; fails if the name is already taken.
    pub fn register(&self, spec: ServiceSpec) -> Result<(), OrchestratorError> {
        let name = spec.service.name().to_string();
        let mut services = self
            .services
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if services.iter().any(|h| h.name() == name) {
            return Err(OrchestratorError::ServiceExists { name });
        }
        let descriptor = Descriptor::new(name, spec.level, spec.dependencies);
        services.push(ServiceHandle::new(descriptor, spec.service));
        Ok(())
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Locator for Registry {
    fn handles_at_level(&self, level: i32) -> Vec<Arc<ServiceHandle>> {
        self.services
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|h| h.descriptor().level() == Some(level))
            .cloned()
            .collect()
    }

    fn lookup(&self, name: &str) -> Option<Arc<ServiceHandle>> {
        self.services
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|h| h.name() == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceFn;
    use tokio_util::sync::CancellationToken;

    fn noop(name: &'static str) -> ServiceRef {
        ServiceFn::arc(name, |_ctx: CancellationToken| async { Ok(()) })
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = Registry::new();
        registry.register(ServiceSpec::new(noop("a"), 1)).unwrap();
        let err = registry
            .register(ServiceSpec::new(noop("a"), 2))
            .unwrap_err();
        assert_eq!(err.as_label(), "orchestrator_service_exists");
    }

    #[test]
    fn level_snapshots_keep_registration_order() {
        let registry = Registry::new();
        registry.register(ServiceSpec::new(noop("b"), 1)).unwrap();
        registry.register(ServiceSpec::new(noop("a"), 1)).unwrap();
        registry.register(ServiceSpec::new(noop("c"), 2)).unwrap();

        let names: Vec<_> = registry
            .handles_at_level(1)
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, ["b", "a"]);
        assert!(registry.handles_at_level(3).is_empty());
    }

    #[test]
    fn support_services_have_no_level() {
        let registry = Registry::new();
        registry.register(ServiceSpec::support(noop("s"))).unwrap();
        assert!(registry.handles_at_level(0).is_empty());
        assert!(registry.lookup("s").is_some());
        assert_eq!(registry.lookup("s").unwrap().descriptor().level(), None);
    }
}
