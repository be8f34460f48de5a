//! Engine core: level transitions and their drivers.
//!
//! This module contains the embedded implementation of the levelvisor
//! engine. The public API re-exported from here is [`Orchestrator`] and
//! [`Job`]; everything else is an internal building block the orchestrator
//! wires together.
//!
//! ## Files & responsibilities
//! - **orchestrator.rs**: public facade; owns the context and the
//!   listener/sorter registries, gates submissions, snapshots listeners
//!   into jobs, starts drivers.
//! - **context.rs**: process-wide state: current level, single-job gate,
//!   in-flight-activation map (would-block detection, hard cancel),
//!   per-level error records, creation-order list; performs the actual
//!   service start/stop with dependency resolution.
//! - **job.rs**: one in-flight transition; wait/cancel/retarget surface,
//!   tagged driver state, listener dispatch with panic isolation.
//! - **ascent.rs**: ascent driver and per-level bounded-parallel startup
//!   pool with would-block parking and hard-cancel timer.
//! - **descent.rs**: descent driver, strictly serial teardown queue and
//!   the stuck-destruction watchdog; synthesized cleanup descents.
//!
//! ## Wiring (module-level flow)
//! ```text
//! Application code
//!   └─ registers ServiceSpecs, creates Orchestrator, calls submit(L)
//!
//! Orchestrator::submit(L)
//!   ├─ gate check (one job at a time) ── Busy
//!   ├─ Job::create (direction from current vs L)
//!   ├─ on_progress_starting(current)
//!   └─ driver start (spawned task, or inline when cooperative)
//!
//! AscentDriver (current < L)                 DescentDriver (current > L)
//!   per level k:                               per level k:
//!     snapshot ► sorters ► AscentPool            current = k−1
//!     ├─ failures → cleanup descent,             snapshot (reverse-activation)
//!     │             job fails                    DescentQueue (serial)
//!     ├─ cancelled → cleanup descent,            ├─ stop vote clamps floor
//!     │              on_cancelled(k−1)           └─ watchdog unsticks teardowns
//!     └─ ok → current = k, on_progress(k)        on_progress(k−1)
//!
//! Job::change_proposed_level (inside a callback)
//!   ├─ same direction → retarget the driver
//!   └─ direction flip → repurpose: old driver winds down to the achieved
//!      level, waiters see Repurposed, fresh driver starts
//! ```
//!
//! ## Locks
//! One lock per role, held only across short critical sections and never
//! across listener callbacks or service start/stop:
//! context gate → job core → driver core → pool master/queue. The
//! `on_error` dispatch is serialized by a per-job async mutex instead of a
//! held lock.

mod ascent;
mod context;
mod descent;
mod job;
mod orchestrator;

pub use job::{Job, WaitOutcome};
pub use orchestrator::Orchestrator;

/// Locks a mutex, recovering the guard if a panicking holder poisoned it.
/// Engine state stays consistent because no lock is held across user code.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
