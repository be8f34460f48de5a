//! # levelvisor
//!
//! **Levelvisor** is a run-level orchestration library for async services.
//!
//! It drives a set of registered services through an ordered sequence of
//! integer levels: ascending starts every service declared at each level
//! with bounded parallelism, descending tears them down strictly serially
//! in reverse-activation order. One transition is in flight at a time; it
//! can be cancelled (with a hard-cancel deadline for stuck services) and
//! re-targeted mid-flight, including reversing direction.
//!
//! ## Features
//!
//! | Area            | Description                                                          | Key types / traits                          |
//! |-----------------|----------------------------------------------------------------------|---------------------------------------------|
//! | **Services**    | Define startable/stoppable services with levels and dependencies.    | [`Service`], [`ServiceFn`], [`ServiceSpec`] |
//! | **Registry**    | Declare which service runs at which level.                           | [`Registry`], [`Locator`]                   |
//! | **Transitions** | Submit, await, cancel and retarget level transitions.                | [`Orchestrator`], [`Job`], [`WaitOutcome`]  |
//! | **Listeners**   | Observe progress, cancellation and errors; vote on error handling.   | [`RunLevelListener`], [`ProgressStartedListener`] |
//! | **Sorters**     | Reorder a level's services before scheduling.                        | [`Sorter`]                                  |
//! | **Errors**      | Typed errors plus the aggregate a failed transition reports.         | [`OrchestratorError`], [`ServiceError`], [`JobFailure`] |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogListener`] _(demo/reference only)_.
//!
//! ```no_run
//! use levelvisor::{Config, Orchestrator, Registry, ServiceError, ServiceFn, ServiceSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new();
//!
//!     let db = ServiceFn::arc("db", |_ctx: CancellationToken| async {
//!         // open connections...
//!         Ok::<_, ServiceError>(())
//!     });
//!     let api = ServiceFn::arc("api", |_ctx: CancellationToken| async {
//!         // bind sockets...
//!         Ok::<_, ServiceError>(())
//!     });
//!
//!     registry.register(ServiceSpec::new(db, 1))?;
//!     registry.register(ServiceSpec::new(api, 2).with_dependencies(["db"]))?;
//!
//!     let orchestrator = Orchestrator::new(registry, Config::default());
//!
//!     // Bring everything up, then shut it back down in reverse order.
//!     orchestrator.proceed_to(2).await?;
//!     orchestrator.proceed_to(0).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod listeners;
mod registry;
mod service;

// ---- Public re-exports ----

pub use config::Config;
pub use error::{JobFailure, OrchestratorError, ServiceError, ServiceFailure};
pub use self::core::{Job, Orchestrator, WaitOutcome};
#[cfg(feature = "logging")]
pub use listeners::LogListener;
pub use listeners::{
    ErrorAction, ErrorInfo, FailurePhase, ProgressStartedListener, RunLevelListener, Sorter,
};
pub use registry::{Locator, Registry, ServiceSpec};
pub use service::{BoxServiceFuture, Descriptor, Service, ServiceFn, ServiceHandle, ServiceRef};
