//! # Listeners and sorters: the external callback surface.
//!
//! This module provides the traits plugged into the orchestrator to
//! observe and influence level transitions.
//!
//! ## Architecture
//! ```text
//! Callback flow (one job):
//!   submit ──► on_progress_starting(current)
//!   each level k achieved ──► on_progress(k)
//!   activation/destruction failure ──► on_error(info) ──► ErrorAction
//!   cancellation settled at k ──► on_cancelled(k)
//!
//! Scheduling hook:
//!   level snapshot ──► Sorter::sort ──► ... ──► scheduling order
//! ```
//!
//! ## Rules
//! - Callbacks for one job never overlap; they run outside engine locks.
//! - `Job::change_proposed_level` is legal only from inside a callback.
//! - Listener panics are swallowed (warned on stderr); sorter panics mean
//!   "no change".

mod listener;
#[cfg(feature = "logging")]
mod log;
mod sorter;

pub use listener::{
    ErrorAction, ErrorInfo, FailurePhase, ProgressStartedListener, RunLevelListener,
};
#[cfg(feature = "logging")]
pub use log::LogListener;
pub use sorter::Sorter;
