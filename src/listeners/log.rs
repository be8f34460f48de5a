//! # Simple logging listener for debugging and demos.
//!
//! [`LogListener`] prints transition events to stdout in a human-readable
//! format. This is primarily useful for development, debugging, and
//! examples.
//!
//! ## Output format
//! ```text
//! [starting] from_level=0 proposed=3
//! [progress] level=1
//! [error] service=db phase=Activation err="service failed: no socket"
//! [cancelled] level=1
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Job;
use crate::listeners::listener::{
    ErrorAction, ErrorInfo, ProgressStartedListener, RunLevelListener,
};

/// Simple stdout logging listener.
///
/// Enabled via the `logging` feature. Prints human-readable event
/// descriptions to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement custom listeners for
/// structured logging or metrics collection.
pub struct LogListener;

#[async_trait]
impl RunLevelListener for LogListener {
    async fn on_progress(&self, _job: &Arc<Job>, level: i32) {
        println!("[progress] level={level}");
    }

    async fn on_cancelled(&self, _job: &Arc<Job>, level: i32) {
        println!("[cancelled] level={level}");
    }

    async fn on_error(&self, _job: &Arc<Job>, info: &ErrorInfo) -> Option<ErrorAction> {
        println!(
            "[error] service={} phase={:?} err={:?}",
            info.failed_descriptor().name(),
            info.phase(),
            info.error().to_string(),
        );
        None
    }
}

#[async_trait]
impl ProgressStartedListener for LogListener {
    async fn on_progress_starting(&self, job: &Arc<Job>, current_level: i32) {
        println!(
            "[starting] from_level={current_level} proposed={}",
            job.proposed_level()
        );
    }
}
