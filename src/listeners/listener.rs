//! # Core listener traits
//!
//! Listeners are the extension point for observing level transitions. A
//! [`RunLevelListener`] sees progress, cancellation and errors; a
//! [`ProgressStartedListener`] sees the moment a transition is accepted,
//! before the first level is processed.
//!
//! ## Contract
//! - Callbacks for one job are serialized with respect to one another and
//!   run outside every engine lock.
//! - A callback may retarget the job via
//!   [`Job::change_proposed_level`](crate::Job::change_proposed_level);
//!   outside a callback that call fails.
//! - Panics inside listeners are caught and logged (isolation); they never
//!   affect the transition.
//!
//! ## Example (skeleton)
//! ```rust
//! use std::sync::Arc;
//! use levelvisor::{Job, RunLevelListener};
//! use async_trait::async_trait;
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl RunLevelListener for Audit {
//!     async fn on_progress(&self, _job: &Arc<Job>, level: i32) {
//!         println!("reached level {level}");
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Job;
use crate::error::ServiceError;
use crate::service::Descriptor;

/// What the job should do about a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Keep processing the level as if the failure had not happened.
    Ignore,
    /// During ascent: abort the level and fall back one level. During
    /// descent: stop descending below the current level.
    GoToNextLowerLevelAndStop,
}

/// Which lifecycle operation produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    /// A service failed to start.
    Activation,
    /// A service failed to stop.
    Destruction,
}

/// Failure report handed to [`RunLevelListener::on_error`].
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    descriptor: Arc<Descriptor>,
    error: ServiceError,
    phase: FailurePhase,
}

impl ErrorInfo {
    pub(crate) fn activation(descriptor: Arc<Descriptor>, error: ServiceError) -> Self {
        Self {
            descriptor,
            error,
            phase: FailurePhase::Activation,
        }
    }

    pub(crate) fn destruction(descriptor: Arc<Descriptor>, error: ServiceError) -> Self {
        Self {
            descriptor,
            error,
            phase: FailurePhase::Destruction,
        }
    }

    /// The descriptor of the service that failed.
    pub fn failed_descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    /// The underlying failure.
    pub fn error(&self) -> &ServiceError {
        &self.error
    }

    /// Whether the failure happened during start or stop.
    pub fn phase(&self) -> FailurePhase {
        self.phase
    }

    /// The action applied when no listener expresses one: abort the level
    /// for activation failures, keep going for destruction failures.
    pub fn default_action(&self) -> ErrorAction {
        match self.phase {
            FailurePhase::Activation => ErrorAction::GoToNextLowerLevelAndStop,
            FailurePhase::Destruction => ErrorAction::Ignore,
        }
    }
}

/// Observer of an in-flight level transition.
///
/// All methods default to no-ops; `on_error` defaults to "no opinion",
/// which lets passive listeners (loggers, metrics) coexist with policy
/// listeners without voting on error handling.
#[async_trait]
pub trait RunLevelListener: Send + Sync + 'static {
    /// The job reached `level`: every service at or below it is up (or its
    /// failure was ignored).
    async fn on_progress(&self, job: &Arc<Job>, level: i32) {
        let _ = (job, level);
    }

    /// The job was cancelled; `level` is the level the container settled
    /// at after the recovery descent.
    async fn on_cancelled(&self, job: &Arc<Job>, level: i32) {
        let _ = (job, level);
    }

    /// A service failed to start or stop.
    ///
    /// Return `Some(action)` to vote on how the job proceeds, `None` to
    /// abstain. Any vote for [`ErrorAction::GoToNextLowerLevelAndStop`]
    /// wins over [`ErrorAction::Ignore`]; with no votes at all the phase
    /// default applies.
    async fn on_error(&self, job: &Arc<Job>, info: &ErrorInfo) -> Option<ErrorAction> {
        let _ = (job, info);
        None
    }

    /// Human-readable name (for panic warnings).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Observer of transition acceptance.
///
/// Invoked once per submitted job with the level the container is at
/// before any work happens, and before the job's driver starts.
#[async_trait]
pub trait ProgressStartedListener: Send + Sync + 'static {
    /// A transition was accepted; `current_level` is the level about to be
    /// left behind.
    async fn on_progress_starting(&self, job: &Arc<Job>, current_level: i32);

    /// Human-readable name (for panic warnings).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
