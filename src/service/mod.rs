//! Service abstraction: the units the orchestrator drives through levels.
//!
//! ## Contents
//! - [`Service`], [`ServiceRef`], [`BoxServiceFuture`] — the trait surface
//! - [`ServiceFn`] — closure-backed implementation
//! - [`Descriptor`] — identity token with level and dependency projections
//! - [`ServiceHandle`] — descriptor bound to its lazy instance slot

mod descriptor;
mod handle;
#[allow(clippy::module_inception)]
mod service;
mod service_fn;

pub use descriptor::Descriptor;
pub use handle::ServiceHandle;
pub use service::{BoxServiceFuture, Service, ServiceRef};
pub use service_fn::ServiceFn;

pub(crate) use handle::Slot;
