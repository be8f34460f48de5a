//! # Service abstraction for level-driven execution.
//!
//! Defines the core [`Service`] trait for async, cancelable units of the
//! container lifecycle.
//!
//! - **[`Service`]** — trait for implementing startable/stoppable services
//! - **[`ServiceRef`]** — shared handle (`Arc<dyn Service>`) for passing
//!   services across the runtime
//! - **[`BoxServiceFuture`]** — type alias for boxed service futures
//!
//! ## Rules
//! - The crate provides [`ServiceFn`](crate::ServiceFn) — a function-backed
//!   implementation that wraps closures as services.
//! - `start` receives a [`CancellationToken`] that fires when the
//!   activation is hard-cancelled; implementations should check it at their
//!   suspension points to keep `cancel()` bounded.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;

/// Boxed future returned by [`Service::start`] and [`Service::stop`].
pub type BoxServiceFuture =
    Pin<Box<dyn Future<Output = Result<(), ServiceError>> + Send + 'static>>;

/// Shared handle to a service object.
pub type ServiceRef = Arc<dyn Service>;

/// Asynchronous, level-managed unit of the container lifecycle.
///
/// A service is started when the orchestrator ascends through its declared
/// level and stopped when it descends back below it. Both operations may
/// fail; failures are routed through the registered error listeners.
///
/// ## Rules
/// - `start(&self)` takes `&self` — each call produces a fresh future and
///   must not rely on hidden mutable state between transitions.
/// - A service torn down by a descent may be started again by a later
///   ascent.
pub trait Service: Send + Sync + 'static {
    /// Returns a stable, human-readable service name.
    fn name(&self) -> &str;

    /// Brings the service up.
    ///
    /// `ctx` fires when the activation is hard-cancelled after the cancel
    /// deadline; the future is dropped shortly after, so checking the token
    /// is an optimization, not a requirement.
    fn start(&self, ctx: CancellationToken) -> BoxServiceFuture;

    /// Tears the service down. The default implementation succeeds
    /// immediately.
    fn stop(&self) -> BoxServiceFuture {
        Box::pin(async { Ok(()) })
    }
}
