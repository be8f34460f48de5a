//! # Ascent: one driver per ascending job, one pool per level.
//!
//! [`AscentDriver`] walks the levels one at a time; [`AscentPool`] starts
//! every service of one level with bounded parallelism.
//!
//! ## Architecture
//! ```text
//! AscentDriver::run()
//!   loop k = current+1 ..= going_to:
//!     ├─► snapshot services at k, run sorter chain
//!     ├─► AscentPool::run_level()
//!     │     ├─► spawn min(N, max_workers) − 1 workers
//!     │     └─► final worker runs on the driver task
//!     ├─► failures accumulated → cleanup descent to k−1, job fails
//!     ├─► cancelled → cleanup descent to k−1, on_cancelled(k−1)
//!     └─► else: current = k, on_progress(k)
//!   repurposed? exit without completing the job
//! ```
//!
//! ## Worker loop (per level)
//! Workers pull from a shared queue. A worker with no spare work left
//! activates in *blocking* mode; otherwise it activates non-blocking,
//! parks services that would block on another worker's in-flight
//! activation (pre-checked against the dependency closure, re-queued at
//! the tail) and retries them later. `WasCancelled` counts as completed
//! without error. Ignored failures complete without accumulating.
//!
//! ## Hard cancel
//! `cancel()` arms a one-shot timer at `cancel_timeout`; when it fires,
//! every outstanding activation is aborted through the context and the
//! pool completes with no accumulated error (cancellation is not an
//! error).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::core::context::RunLevelContext;
use crate::core::descent::DescentDriver;
use crate::core::job::{Completion, Job};
use crate::core::lock;
use crate::error::{JobFailure, ServiceError, ServiceFailure};
use crate::listeners::{ErrorAction, ErrorInfo};
use crate::registry::Locator;
use crate::service::{Descriptor, ServiceHandle};

pub(crate) struct AscentDriver {
    job: Arc<Job>,
    completion: Arc<Completion>,
    started: AtomicBool,
    core: Mutex<AscentCore>,
}

struct AscentCore {
    going_to: i32,
    working_on: i32,
    cancelled: bool,
    repurposed: bool,
    pool: Option<Arc<AscentPool>>,
}

impl AscentDriver {
    pub(crate) fn new(job: &Arc<Job>, going_to: i32, current: i32) -> Arc<Self> {
        Arc::new(Self {
            job: job.clone(),
            completion: Completion::new(),
            started: AtomicBool::new(false),
            core: Mutex::new(AscentCore {
                going_to,
                working_on: current,
                cancelled: false,
                repurposed: false,
                pool: None,
            }),
        })
    }

    pub(crate) fn completion(&self) -> Arc<Completion> {
        self.completion.clone()
    }

    /// True exactly once; a driver runs at most one time.
    pub(crate) fn mark_started(&self) -> bool {
        !self.started.swap(true, AtomicOrdering::SeqCst)
    }

    pub(crate) fn set_going_to(&self, going_to: i32, repurposed: bool) {
        {
            let mut core = lock(&self.core);
            core.going_to = going_to;
            if repurposed {
                core.repurposed = true;
            }
        }
        if repurposed {
            self.completion.mark_repurposed();
        }
    }

    pub(crate) fn cancel(&self) {
        let pool = {
            let mut core = lock(&self.core);
            if core.cancelled {
                return;
            }
            core.cancelled = true;
            core.pool.clone()
        };
        // Activations of the level being worked on drain as cancelled.
        self.job.ctx.mark_level_cancelled();
        if let Some(pool) = pool {
            pool.cancel();
        }
    }

    pub(crate) async fn run(self: Arc<Self>) {
        let job = self.job.clone();
        loop {
            let (level, past_target) = {
                let mut core = lock(&self.core);
                core.working_on += 1;
                (core.working_on, core.working_on > core.going_to)
            };
            if past_target {
                if lock(&self.core).repurposed {
                    // A replacement driver owns the job now.
                    return;
                }
                job.finish(None);
                job.ctx.job_done();
                self.completion.finish(None);
                return;
            }

            let handles = job.locator.handles_at_level(level);
            let handles = job.apply_sorters(handles);
            let pool = AscentPool::new(&job, level, handles);
            {
                let mut core = lock(&self.core);
                core.pool = Some(pool.clone());
                if core.cancelled {
                    pool.cancel();
                }
            }

            let failures = pool.run_level().await;
            job.ctx.clear_errors();

            if let Some(failure) = failures {
                // The level never completed: tear its survivors down and
                // finish with the accumulated failure. current_level was
                // not advanced.
                DescentDriver::cleanup(&job, level - 1).run().await;
                job.finish(Some(failure.clone()));
                job.ctx.job_done();
                self.completion.finish(Some(failure));
                return;
            }

            if lock(&self.core).cancelled {
                DescentDriver::cleanup(&job, level - 1).run().await;
                job.dispatch_cancelled(level - 1).await;
                job.finish(None);
                job.ctx.job_done();
                self.completion.finish(None);
                return;
            }

            job.ctx.set_current_level(level);
            job.dispatch_progress(level).await;
        }
    }
}

/// Bounded-parallel startup of all services at one level.
pub(crate) struct AscentPool {
    job: Arc<Job>,
    level: i32,
    max_workers: usize,
    cancel_timeout: Duration,
    queue: Mutex<PoolQueue>,
    master: Mutex<PoolMaster>,
    done: Notify,
}

struct PoolQueue {
    items: VecDeque<Arc<ServiceHandle>>,
    /// Workers currently inside an activation.
    running: usize,
    /// Handles those workers are activating, by descriptor id.
    outstanding: HashMap<u64, Arc<ServiceHandle>>,
}

struct PoolMaster {
    total: usize,
    completed: usize,
    failures: Vec<ServiceFailure>,
    cancelled: bool,
    hard_cancelled: bool,
    timer: Option<JoinHandle<()>>,
}

impl AscentPool {
    fn new(job: &Arc<Job>, level: i32, handles: Vec<Arc<ServiceHandle>>) -> Arc<Self> {
        Arc::new(Self {
            job: job.clone(),
            level,
            max_workers: job.cfg.max_workers,
            cancel_timeout: job.cfg.cancel_timeout,
            queue: Mutex::new(PoolQueue {
                running: 0,
                outstanding: HashMap::new(),
                items: handles.iter().cloned().collect(),
            }),
            master: Mutex::new(PoolMaster {
                total: handles.len(),
                completed: 0,
                failures: Vec::new(),
                cancelled: false,
                hard_cancelled: false,
                timer: None,
            }),
            done: Notify::new(),
        })
    }

    /// Runs the level to completion and drains the accumulated failures.
    async fn run_level(self: Arc<Self>) -> Option<JobFailure> {
        let total = lock(&self.master).total;
        if total == 0 {
            return None;
        }

        let extra_workers = if self.job.cfg.threaded() {
            total.min(self.max_workers).saturating_sub(1)
        } else {
            0
        };
        for _ in 0..extra_workers {
            let pool = self.clone();
            tokio::spawn(pool.worker());
        }
        // The driver's own task is the final worker.
        self.clone().worker().await;

        loop {
            let notified = self.done.notified();
            {
                let master = lock(&self.master);
                if master.completed >= master.total || master.hard_cancelled {
                    break;
                }
            }
            notified.await;
        }

        let mut master = lock(&self.master);
        if let Some(timer) = master.timer.take() {
            timer.abort();
        }
        if master.hard_cancelled || master.failures.is_empty() {
            None
        } else {
            Some(JobFailure::new(std::mem::take(&mut master.failures)))
        }
    }

    /// Arms the hard-cancel deadline. New activations are prevented by the
    /// workers' ok-check; in-flight ones get until the timer fires.
    fn cancel(self: &Arc<Self>) {
        let mut master = lock(&self.master);
        if master.cancelled {
            return;
        }
        master.cancelled = true;
        let pool = self.clone();
        master.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(pool.cancel_timeout).await;
            pool.hard_cancel();
        }));
    }

    fn hard_cancel(&self) {
        {
            let mut master = lock(&self.master);
            if master.completed >= master.total {
                return;
            }
            master.hard_cancelled = true;
        }
        let victims: Vec<Arc<ServiceHandle>> = {
            let mut queue = lock(&self.queue);
            queue.outstanding.drain().map(|(_, handle)| handle).collect()
        };
        for handle in victims {
            self.job.ctx.hard_cancel_one(handle.descriptor().id());
        }
        self.done.notify_waiters();
    }

    async fn worker(self: Arc<Self>) {
        let mut already_tried: HashSet<u64> = HashSet::new();
        let mut parked: Option<Arc<ServiceHandle>> = None;
        let mut running_handle: Option<Arc<ServiceHandle>> = None;

        loop {
            let (handle, block) = {
                let mut queue = lock(&self.queue);
                if let Some(finished) = running_handle.take() {
                    queue.running -= 1;
                    queue.outstanding.remove(&finished.descriptor().id());
                }
                if let Some(deferred) = parked.take() {
                    already_tried.insert(deferred.descriptor().id());
                    queue.items.push_back(deferred);
                }
                if queue.items.is_empty() {
                    return;
                }

                // With no more work than idle workers there is nothing to
                // steal: take the head and block on it.
                let mut block = if self.max_workers == 0 {
                    true
                } else {
                    queue.items.len() <= self.max_workers.saturating_sub(queue.running)
                };
                let picked = if block {
                    queue.items.pop_front()
                } else {
                    match queue
                        .items
                        .iter()
                        .position(|h| !already_tried.contains(&h.descriptor().id()))
                    {
                        Some(index) => queue.items.remove(index),
                        None => {
                            // Every queued service was already deferred by
                            // this worker; stop rotating.
                            block = true;
                            queue.items.pop_front()
                        }
                    }
                };
                let Some(handle) = picked else { return };
                queue.running += 1;
                queue
                    .outstanding
                    .insert(handle.descriptor().id(), handle.clone());
                running_handle = Some(handle.clone());
                (handle, block)
            };

            let ok = {
                let master = lock(&self.master);
                !master.cancelled && !master.hard_cancelled && master.failures.is_empty()
            };

            let mut completed = true;
            if !block
                && would_block_right_now(&self.job.ctx, &self.job.locator, handle.descriptor())
            {
                parked = Some(handle.clone());
                completed = false;
            } else if ok {
                match self.job.ctx.activate(&self.job.locator, &handle, block).await {
                    Ok(()) => {}
                    Err(e) if e.is_would_block() && !block => {
                        parked = Some(handle.clone());
                        completed = false;
                    }
                    Err(e) if e.is_was_cancelled() => {}
                    Err(e) => self.fail(e, &handle).await,
                }
            }

            if completed {
                self.complete_one();
            }
        }
    }

    async fn fail(&self, error: ServiceError, handle: &Arc<ServiceHandle>) {
        {
            let master = lock(&self.master);
            if master.hard_cancelled {
                return;
            }
        }
        let info = ErrorInfo::activation(handle.descriptor().clone(), error.clone());
        let action = self.job.dispatch_error(&info).await;
        if action == ErrorAction::Ignore {
            return;
        }
        let mut master = lock(&self.master);
        if master.hard_cancelled {
            return;
        }
        master
            .failures
            .push(ServiceFailure::new(handle.name(), self.level, error));
    }

    fn complete_one(&self) {
        let finished = {
            let mut master = lock(&self.master);
            if master.hard_cancelled {
                return;
            }
            master.completed += 1;
            if master.completed >= master.total {
                if let Some(timer) = master.timer.take() {
                    timer.abort();
                }
                true
            } else {
                false
            }
        };
        if finished {
            self.done.notify_waiters();
        }
    }
}

/// Advisory pre-check: walks the descriptor and the transitive closure of
/// its levelled dependencies, pruning cycles, and reports a block if any
/// visited descriptor is being activated on another worker.
///
/// A false negative is handled by the activation itself yielding
/// `WouldBlock`; a false positive merely defers the service.
fn would_block_right_now(
    ctx: &RunLevelContext,
    locator: &Arc<dyn Locator>,
    root: &Arc<Descriptor>,
) -> bool {
    let mut visited: HashSet<u64> = HashSet::new();
    let mut stack: Vec<Arc<Descriptor>> = vec![root.clone()];
    while let Some(descriptor) = stack.pop() {
        if !visited.insert(descriptor.id()) {
            continue;
        }
        if ctx.would_block_right_now(descriptor.id()) {
            return true;
        }
        for dep_name in descriptor.dependencies() {
            if let Some(handle) = locator.lookup(dep_name) {
                let dep = handle.descriptor().clone();
                if dep.level().is_some() {
                    stack.push(dep);
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, ServiceSpec};
    use crate::service::{ServiceFn, ServiceRef};
    use tokio_util::sync::CancellationToken;

    fn noop(name: &'static str) -> ServiceRef {
        ServiceFn::arc(name, |_ctx: CancellationToken| async { Ok(()) })
    }

    #[test]
    fn pre_check_prunes_dependency_cycles() {
        let registry = Registry::new();
        registry
            .register(ServiceSpec::new(noop("a"), 1).with_dependencies(["b"]))
            .unwrap();
        registry
            .register(ServiceSpec::new(noop("b"), 1).with_dependencies(["a"]))
            .unwrap();
        let locator: Arc<dyn Locator> = registry;
        let ctx = RunLevelContext::new(0);

        let a = locator.lookup("a").unwrap();
        // Nothing is activating: the cyclic walk must terminate and report
        // no block.
        assert!(!would_block_right_now(&ctx, &locator, a.descriptor()));
    }

    #[test]
    fn pre_check_sees_in_flight_dependency() {
        let registry = Registry::new();
        registry
            .register(ServiceSpec::new(noop("app"), 2).with_dependencies(["db"]))
            .unwrap();
        registry.register(ServiceSpec::new(noop("db"), 1)).unwrap();
        let locator: Arc<dyn Locator> = registry;
        let ctx = RunLevelContext::new(0);

        let db = locator.lookup("db").unwrap();
        let app = locator.lookup("app").unwrap();
        assert!(!would_block_right_now(&ctx, &locator, app.descriptor()));

        // Simulate another worker building the dependency.
        ctx.activating_insert_for_tests(db.descriptor().id());
        assert!(would_block_right_now(&ctx, &locator, app.descriptor()));
    }
}
