//! # Function-backed service (`ServiceFn`)
//!
//! [`ServiceFn`] wraps a closure `F: Fn(CancellationToken) -> Fut`,
//! producing a fresh start future per transition. An optional stop closure
//! covers services that need explicit teardown; without one, `stop`
//! succeeds immediately.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use levelvisor::{ServiceFn, ServiceRef, ServiceError};
//!
//! let s: ServiceRef = ServiceFn::arc("cache", |_ctx: CancellationToken| async move {
//!     // open connections, warm caches...
//!     Ok::<_, ServiceError>(())
//! });
//!
//! assert_eq!(s.name(), "cache");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::service::service::{BoxServiceFuture, Service};

/// Function-backed service implementation.
///
/// Wraps a closure that *creates* a new start future per transition.
pub struct ServiceFn<F> {
    name: Cow<'static, str>,
    start: F,
    stop: Option<Arc<dyn Fn() -> BoxServiceFuture + Send + Sync>>,
}

impl<F> ServiceFn<F> {
    /// Creates a new function-backed service.
    ///
    /// Prefer [`ServiceFn::arc`] when you immediately need a [`ServiceRef`](crate::ServiceRef).
    pub fn new(name: impl Into<Cow<'static, str>>, start: F) -> Self {
        Self {
            name: name.into(),
            start,
            stop: None,
        }
    }

    /// Creates the service and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, start: F) -> Arc<Self> {
        Arc::new(Self::new(name, start))
    }

    /// Attaches a stop closure, run when a descent tears the service down.
    pub fn with_stop<S, Fut>(mut self, stop: S) -> Self
    where
        S: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        self.stop = Some(Arc::new(move || -> BoxServiceFuture {
            Box::pin(stop())
        }));
        self
    }
}

impl<F, Fut> Service for ServiceFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, ctx: CancellationToken) -> BoxServiceFuture {
        Box::pin((self.start)(ctx))
    }

    fn stop(&self) -> BoxServiceFuture {
        match &self.stop {
            Some(stop) => stop(),
            None => Box::pin(async { Ok(()) }),
        }
    }
}
