//! # Error types used by the levelvisor runtime and services.
//!
//! This module defines two main error enums plus the composite job failure:
//!
//! - [`OrchestratorError`] errors raised by the orchestration runtime itself.
//! - [`ServiceError`] errors raised by individual service activations and
//!   destructions.
//! - [`JobFailure`] the aggregate failure a level transition completes with.
//!
//! All types provide `as_label` helpers for metrics. [`ServiceError`] has
//! additional classification methods: `is_would_block()` and
//! `is_was_cancelled()`. Those two variants are scheduling signals consumed
//! inside the engine; they are never handed to error listeners.

use std::fmt;

use thiserror::Error;

/// # Errors produced by the levelvisor runtime.
///
/// These represent failures in the orchestration system itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    /// A level transition was requested while another one is in flight.
    #[error("a level transition is already in flight (proposed level {proposed})")]
    Busy {
        /// The level the rejected request proposed.
        proposed: i32,
    },
    /// An operation was invoked in a state that does not allow it.
    #[error("illegal state: {reason}")]
    IllegalState {
        /// Human-readable description of the violated precondition.
        reason: String,
    },
    /// Attempted to register a service with a name that already exists.
    #[error("service '{name}' already exists in registry")]
    ServiceExists {
        /// The duplicate service name.
        name: String,
    },
    /// A driven transition completed with accumulated service failures.
    #[error(transparent)]
    Failed(#[from] JobFailure),
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::Busy { .. } => "orchestrator_busy",
            OrchestratorError::IllegalState { .. } => "orchestrator_illegal_state",
            OrchestratorError::ServiceExists { .. } => "orchestrator_service_exists",
            OrchestratorError::Failed(_) => "orchestrator_transition_failed",
        }
    }
}

/// # Errors produced by service activation and destruction.
///
/// `WouldBlock` and `WasCancelled` are internal scheduling signals: the
/// former defers a non-blocking activation whose dependency is being built
/// elsewhere, the latter marks an activation or destruction aborted by a
/// hard cancel. Neither reaches error listeners.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A non-blocking activation hit a dependency already being activated
    /// on another worker.
    #[error("activation would block on an in-flight activation")]
    WouldBlock,

    /// The activation or destruction was aborted by a hard cancel.
    ///
    /// This is **not an error** in the traditional sense, but signals
    /// intentional termination.
    #[error("activation was cancelled")]
    WasCancelled,

    /// The service failed to start or stop.
    #[error("service failed: {reason}")]
    Failed { reason: String },
}

impl ServiceError {
    /// Convenience constructor for a generic failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        ServiceError::Failed {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::WouldBlock => "service_would_block",
            ServiceError::WasCancelled => "service_was_cancelled",
            ServiceError::Failed { .. } => "service_failed",
        }
    }

    /// True for the defer-and-retry scheduling signal.
    pub fn is_would_block(&self) -> bool {
        matches!(self, ServiceError::WouldBlock)
    }

    /// True for the hard-cancel signal.
    pub fn is_was_cancelled(&self) -> bool {
        matches!(self, ServiceError::WasCancelled)
    }
}

/// One failed activation or destruction, attributed to a service and the
/// level that was being processed when it failed.
#[derive(Debug, Clone)]
pub struct ServiceFailure {
    service: String,
    level: i32,
    error: ServiceError,
}

impl ServiceFailure {
    pub(crate) fn new(service: impl Into<String>, level: i32, error: ServiceError) -> Self {
        Self {
            service: service.into(),
            level,
            error,
        }
    }

    /// Name of the service that failed.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The level being processed when the failure occurred.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// The underlying service error.
    pub fn error(&self) -> &ServiceError {
        &self.error
    }
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}: {}", self.service, self.level, self.error)
    }
}

/// Aggregate failure of a level transition.
///
/// Collected by the startup scheduler while a level is processed and
/// returned from [`Job::wait`](crate::Job::wait) once the recovery descent
/// has completed. One aggregate may wrap multiple underlying failures.
#[derive(Debug, Clone)]
pub struct JobFailure {
    failures: Vec<ServiceFailure>,
}

impl JobFailure {
    pub(crate) fn new(failures: Vec<ServiceFailure>) -> Self {
        Self { failures }
    }

    /// The individual failures this aggregate wraps.
    pub fn errors(&self) -> &[ServiceFailure] {
        &self.failures
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level transition failed ({} service(s))", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for JobFailure {}
