//! # Orchestrator: the public facade.
//!
//! Owns the context and the listener/sorter registries and accepts
//! transition requests. One transition is in flight at a time; a second
//! `submit` while a job runs fails with `Busy`.
//!
//! ```rust
//! use levelvisor::{Config, Orchestrator, Registry, ServiceFn, ServiceSpec, ServiceError};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new();
//!     let db = ServiceFn::arc("db", |_ctx: CancellationToken| async {
//!         Ok::<_, ServiceError>(())
//!     });
//!     registry.register(ServiceSpec::new(db, 1))?;
//!
//!     let orchestrator = Orchestrator::new(registry, Config::default());
//!     orchestrator.proceed_to(1).await?;
//!     assert_eq!(orchestrator.current(), 1);
//!
//!     orchestrator.proceed_to(0).await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::core::context::RunLevelContext;
use crate::core::job::{Job, WaitOutcome};
use crate::core::lock;
use crate::error::OrchestratorError;
use crate::listeners::{ProgressStartedListener, RunLevelListener, Sorter};
use crate::registry::Locator;

/// Drives registered services through ordered run levels.
pub struct Orchestrator {
    cfg: Config,
    ctx: Arc<RunLevelContext>,
    locator: Arc<dyn Locator>,
    listeners: Mutex<Vec<Arc<dyn RunLevelListener>>>,
    progress_started: Mutex<Vec<Arc<dyn ProgressStartedListener>>>,
    sorters: Mutex<Vec<Arc<dyn Sorter>>>,
}

impl Orchestrator {
    /// Creates an orchestrator over `locator` at `cfg.initial_level`.
    pub fn new(locator: Arc<dyn Locator>, cfg: Config) -> Self {
        let ctx = RunLevelContext::new(cfg.initial_level);
        Self {
            cfg,
            ctx,
            locator,
            listeners: Mutex::new(Vec::new()),
            progress_started: Mutex::new(Vec::new()),
            sorters: Mutex::new(Vec::new()),
        }
    }

    /// The level at which every service that must be active is active.
    pub fn current(&self) -> i32 {
        self.ctx.current_level()
    }

    /// Registers an observer of progress, cancellation and errors.
    ///
    /// Jobs snapshot the listener set at construction; registrations during
    /// a transition affect the next job.
    pub fn register_listener(&self, listener: Arc<dyn RunLevelListener>) {
        lock(&self.listeners).push(listener);
    }

    /// Registers an observer of transition acceptance.
    pub fn register_progress_listener(&self, listener: Arc<dyn ProgressStartedListener>) {
        lock(&self.progress_started).push(listener);
    }

    /// Registers a sorter applied to every level snapshot before
    /// scheduling.
    pub fn register_sorter(&self, sorter: Arc<dyn Sorter>) {
        lock(&self.sorters).push(sorter);
    }

    /// Submits a transition to `proposed`.
    ///
    /// Fails with [`OrchestratorError::Busy`] while another job is in
    /// flight. In cooperative mode (`use_workers = false`) the whole
    /// transition runs before `submit` returns and the job comes back
    /// done.
    pub async fn submit(&self, proposed: i32) -> Result<Arc<Job>, OrchestratorError> {
        let listeners: Arc<[_]> = lock(&self.listeners).clone().into();
        let progress_started: Arc<[_]> = lock(&self.progress_started).clone().into();
        let sorters: Arc<[_]> = lock(&self.sorters).clone().into();

        let job = self.ctx.begin_job(proposed, |current| {
            Job::create(
                self.ctx.clone(),
                self.locator.clone(),
                self.cfg.clone(),
                listeners,
                progress_started,
                sorters,
                proposed,
                current,
            )
        })?;

        // Capture the driver before the callbacks run: a progress-started
        // listener may already retarget the job.
        if let Some(driver) = job.driver_ref() {
            job.dispatch_progress_started(self.ctx.current_level()).await;
            job.go(driver).await;
        }
        Ok(job)
    }

    /// Submits a transition and waits for it, transparently re-waiting
    /// when the job is repurposed by a listener.
    pub async fn proceed_to(&self, level: i32) -> Result<(), OrchestratorError> {
        let job = self.submit(level).await?;
        loop {
            match job.wait().await {
                Ok(WaitOutcome::Repurposed) => continue,
                Ok(_) => return Ok(()),
                Err(failure) => return Err(OrchestratorError::Failed(failure)),
            }
        }
    }
}
