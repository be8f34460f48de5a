//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the orchestrator runtime.
//!
//! ## Sentinel values
//! - `max_workers = 0` → a single, always-blocking startup worker
//! - `use_workers = false` → cooperative mode: the whole transition runs
//!   inline on the submitting task before `submit` returns

use std::time::Duration;

/// Global configuration for the orchestrator runtime.
///
/// Defines:
/// - **Startup parallelism**: how many workers activate services at a level
/// - **Execution mode**: spawned driver tasks vs. inline cooperative runs
/// - **Cancellation behavior**: hard-cancel deadline for stuck services
/// - **Starting point**: the level the container boots at
///
/// ## Field semantics
/// - `max_workers`: per-level activation parallelism (`0` = one worker that
///   always activates in blocking mode)
/// - `use_workers`: `false` runs every driver on the submitting task to
///   completion; callback ordering is identical to the threaded mode
/// - `cancel_timeout`: deadline after `cancel()` before in-flight
///   activations are hard-cancelled, and the poll interval of the stuck
///   destruction watchdog
/// - `initial_level`: the level the orchestrator reports before any
///   transition; services declared at or below it are never started
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to
/// avoid sprinkling sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of workers activating services within one level.
    ///
    /// - `0` = single worker, every activation blocking
    /// - `n > 0` = at most `n` concurrent activations per level
    pub max_workers: usize,

    /// Whether drivers and workers run as spawned tasks.
    ///
    /// When `false`, `submit` drives the transition to completion inline
    /// and the returned job is already done.
    pub use_workers: bool,

    /// Deadline for hard-cancelling stuck activations after `cancel()`,
    /// and the fixed poll interval of the descent watchdog.
    pub cancel_timeout: Duration,

    /// The level the orchestrator starts at.
    pub initial_level: i32,
}

impl Config {
    /// True when drivers run as spawned tasks.
    ///
    /// `max_workers = 0` forces the cooperative mode regardless of
    /// `use_workers`: with a single blocking worker there is nothing to
    /// schedule in parallel.
    #[inline]
    pub fn threaded(&self) -> bool {
        self.use_workers && self.max_workers > 0
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `max_workers = 4` (modest per-level parallelism)
    /// - `use_workers = true` (spawned drivers)
    /// - `cancel_timeout = 5s` (bounded cancellation)
    /// - `initial_level = 0`
    fn default() -> Self {
        Self {
            max_workers: 4,
            use_workers: true,
            cancel_timeout: Duration::from_secs(5),
            initial_level: 0,
        }
    }
}
