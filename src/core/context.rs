//! # RunLevelContext: process-wide orchestrator state.
//!
//! One context exists per orchestrator. It owns:
//! - the current level and the single-job gate,
//! - the set of activations in flight (for would-block detection and hard
//!   cancellation),
//! - the per-service error records of the level being processed,
//! - the creation-order list that defines teardown order.
//!
//! ## Rules
//! - The gate lock is the outermost lock: it is acquired before any job
//!   lock when both are needed.
//! - `set_current_level` is only called by the active job's driver.
//! - No lock is held across a service start or stop; activations register
//!   a cancellation token in `activating` so a hard cancel can abort them
//!   from another task.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::core::job::Job;
use crate::core::lock;
use crate::error::{OrchestratorError, ServiceError};
use crate::registry::Locator;
use crate::service::{ServiceHandle, Slot};

/// State behind the context lock: current level and the single-job gate.
pub(crate) struct Gate {
    current_level: i32,
    active: Option<Arc<Job>>,
}

/// Process-wide orchestrator state.
pub(crate) struct RunLevelContext {
    gate: Mutex<Gate>,
    /// Descriptor id → hard-cancel token of the activation in flight.
    activating: DashMap<u64, CancellationToken>,
    /// Services whose activation failed since the level began.
    failed: DashMap<u64, Arc<ServiceHandle>>,
    /// Successfully activated services, in activation-completion order.
    creation_order: Mutex<Vec<Arc<ServiceHandle>>>,
    /// Set while a cancelled ascent drains its level: new activations
    /// short-circuit to `WasCancelled`.
    level_cancelled: AtomicBool,
}

impl RunLevelContext {
    pub(crate) fn new(initial_level: i32) -> Arc<Self> {
        Arc::new(Self {
            gate: Mutex::new(Gate {
                current_level: initial_level,
                active: None,
            }),
            activating: DashMap::new(),
            failed: DashMap::new(),
            creation_order: Mutex::new(Vec::new()),
            level_cancelled: AtomicBool::new(false),
        })
    }

    /// The level at which every service that must be active is active.
    pub(crate) fn current_level(&self) -> i32 {
        lock(&self.gate).current_level
    }

    pub(crate) fn set_current_level(&self, level: i32) {
        lock(&self.gate).current_level = level;
    }

    /// Holds the gate lock; used to order job cancellation after it.
    pub(crate) fn hold_gate(&self) -> MutexGuard<'_, Gate> {
        lock(&self.gate)
    }

    /// Atomically checks the single-job gate and installs a new job built
    /// by `make` from the current level.
    pub(crate) fn begin_job<F>(
        &self,
        proposed: i32,
        make: F,
    ) -> Result<Arc<Job>, OrchestratorError>
    where
        F: FnOnce(i32) -> Arc<Job>,
    {
        let mut gate = lock(&self.gate);
        if gate.active.is_some() {
            return Err(OrchestratorError::Busy { proposed });
        }
        // Workers of a previously cancelled job have drained by the time
        // its gate was released; the new job starts with a clean flag.
        self.level_cancelled.store(false, AtomicOrdering::SeqCst);
        let job = make(gate.current_level);
        // A job created at its target level is complete; the gate stays free.
        if !job.is_done() {
            gate.active = Some(job.clone());
        }
        Ok(job)
    }

    /// Releases the single-job gate.
    pub(crate) fn job_done(&self) {
        lock(&self.gate).active = None;
    }

    /// True if some other worker is currently activating that descriptor.
    pub(crate) fn would_block_right_now(&self, descriptor_id: u64) -> bool {
        self.activating.contains_key(&descriptor_id)
    }

    /// Aborts the activation in flight for `descriptor_id`, making it
    /// resolve to `WasCancelled`.
    pub(crate) fn hard_cancel_one(&self, descriptor_id: u64) {
        if let Some(token) = self.activating.get(&descriptor_id) {
            token.cancel();
        }
    }

    pub(crate) fn mark_level_cancelled(&self) {
        self.level_cancelled.store(true, AtomicOrdering::SeqCst);
    }

    /// Resets the per-service error records. Called once per completed
    /// level. The level-cancel flag is left set: late waiters of the
    /// cancelled level must still observe it.
    pub(crate) fn clear_errors(&self) {
        let drained: Vec<Arc<ServiceHandle>> =
            self.failed.iter().map(|e| e.value().clone()).collect();
        self.failed.clear();
        for handle in drained {
            {
                let mut slot = lock(&handle.slot);
                if matches!(*slot, Slot::Failed(_)) {
                    *slot = Slot::Idle;
                }
            }
            handle.changed.notify_waiters();
        }
    }

    /// Active services declared at `level`, in reverse-activation order
    /// (the teardown order of a descent).
    pub(crate) fn ordered_handles_at_level(&self, level: i32) -> Vec<Arc<ServiceHandle>> {
        let order = lock(&self.creation_order);
        order
            .iter()
            .rev()
            .filter(|h| h.descriptor().level() == Some(level))
            .cloned()
            .collect()
    }

    /// Produces or returns the service instance.
    ///
    /// Dependencies are activated first, depth-first. In blocking mode an
    /// activation already in flight elsewhere is waited on; in non-blocking
    /// mode it yields `WouldBlock` so the caller can defer the service and
    /// pick other work.
    pub(crate) async fn activate(
        &self,
        locator: &Arc<dyn Locator>,
        handle: &Arc<ServiceHandle>,
        blocking: bool,
    ) -> Result<(), ServiceError> {
        let mut trail = HashSet::new();
        self.activate_inner(locator, handle.clone(), blocking, &mut trail)
            .await
    }

    fn activate_inner<'a>(
        &'a self,
        locator: &'a Arc<dyn Locator>,
        handle: Arc<ServiceHandle>,
        blocking: bool,
        trail: &'a mut HashSet<u64>,
    ) -> Pin<Box<dyn Future<Output = Result<(), ServiceError>> + Send + 'a>> {
        Box::pin(async move {
            // A descriptor already on this activation chain marks a
            // dependency cycle; it is being handled further up the stack.
            if !trail.insert(handle.descriptor().id()) {
                return Ok(());
            }
            for dep_name in handle.descriptor().dependencies() {
                let Some(dep) = locator.lookup(dep_name) else {
                    continue;
                };
                self.activate_inner(locator, dep, blocking, &mut *trail)
                    .await?;
            }
            let handle = &handle;

            enum Step {
                Ready(Result<(), ServiceError>),
                Wait,
                Run(CancellationToken),
            }

            loop {
                if self.level_cancelled.load(AtomicOrdering::SeqCst) {
                    return Err(ServiceError::WasCancelled);
                }
                let notified = handle.changed.notified();
                let step = {
                    let mut slot = lock(&handle.slot);
                    match &*slot {
                        Slot::Active => Step::Ready(Ok(())),
                        Slot::Failed(e) => Step::Ready(Err(e.clone())),
                        Slot::Activating => {
                            if blocking {
                                Step::Wait
                            } else {
                                Step::Ready(Err(ServiceError::WouldBlock))
                            }
                        }
                        Slot::Idle => {
                            *slot = Slot::Activating;
                            let token = CancellationToken::new();
                            self.activating
                                .insert(handle.descriptor().id(), token.clone());
                            Step::Run(token)
                        }
                    }
                };
                match step {
                    Step::Ready(result) => return result,
                    Step::Wait => notified.await,
                    Step::Run(token) => return self.run_activation(handle, token).await,
                }
            }
        })
    }

    async fn run_activation(
        &self,
        handle: &Arc<ServiceHandle>,
        token: CancellationToken,
    ) -> Result<(), ServiceError> {
        let start = std::panic::AssertUnwindSafe(handle.service().start(token.clone()))
            .catch_unwind();
        let result = tokio::select! {
            r = start => r.unwrap_or_else(|_| {
                Err(ServiceError::failed("service start panicked"))
            }),
            _ = token.cancelled() => Err(ServiceError::WasCancelled),
        };

        self.activating.remove(&handle.descriptor().id());
        {
            let mut slot = lock(&handle.slot);
            *slot = match &result {
                Ok(()) => Slot::Active,
                Err(e) if e.is_was_cancelled() => Slot::Idle,
                Err(e) => {
                    self.failed
                        .insert(handle.descriptor().id(), handle.clone());
                    Slot::Failed(e.clone())
                }
            };
        }
        if result.is_ok() {
            lock(&self.creation_order).push(handle.clone());
        }
        handle.changed.notify_waiters();
        result
    }

    #[cfg(test)]
    pub(crate) fn activating_insert_for_tests(&self, descriptor_id: u64) {
        self.activating
            .insert(descriptor_id, CancellationToken::new());
    }

    /// Tears the service instance down. `token` is the watchdog's handle
    /// for abandoning a stuck destruction.
    pub(crate) async fn destroy(
        &self,
        handle: &Arc<ServiceHandle>,
        token: &CancellationToken,
    ) -> Result<(), ServiceError> {
        {
            let slot = lock(&handle.slot);
            if !matches!(*slot, Slot::Active) {
                return Ok(());
            }
        }
        let stop = std::panic::AssertUnwindSafe(handle.service().stop()).catch_unwind();
        let result = tokio::select! {
            r = stop => r.unwrap_or_else(|_| {
                Err(ServiceError::failed("service stop panicked"))
            }),
            _ = token.cancelled() => Err(ServiceError::WasCancelled),
        };

        // The instance is gone (or abandoned) either way.
        {
            let mut slot = lock(&handle.slot);
            *slot = Slot::Idle;
        }
        lock(&self.creation_order)
            .retain(|h| h.descriptor().id() != handle.descriptor().id());
        handle.changed.notify_waiters();
        result
    }
}
