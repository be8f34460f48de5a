//! # Descent: ordered serial teardown, one level at a time.
//!
//! [`DescentDriver`] walks the levels downward; [`DescentQueue`] destroys
//! one level's services strictly serially, in reverse-activation order.
//!
//! ## Architecture
//! ```text
//! DescentDriver::run()
//!   loop k = current .. going_to+1:
//!     ├─► cancelled? on_cancelled(k), finish
//!     ├─► current = k−1            (before the first destruction: the
//!     │                             level's liveness guarantee is broken)
//!     ├─► snapshot active services at k (reverse-activation order)
//!     ├─► DescentQueue::drain()    (serial; per-failure on_error; a stop
//!     │                             vote clamps the descent floor to k)
//!     └─► on_progress(k−1)
//! ```
//!
//! ## Stuck destructions
//! A descent-cancel arms a watchdog that polls the queue length on a fixed
//! interval. An unchanged length across two ticks means the destruction in
//! flight is stuck: it is aborted through its cancellation token, the
//! service is abandoned, and the drain resumes with the remainder.
//!
//! ## Cleanup descents
//! An ascent that fails or is cancelled synthesizes a descent with no job
//! future. Such a descent surfaces destruction errors but suppresses
//! progress/cancelled callbacks and leaves the gate release to the
//! originating ascent driver.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::job::{Completion, Job};
use crate::core::lock;
use crate::listeners::{ErrorAction, ErrorInfo};
use crate::service::ServiceHandle;

pub(crate) struct DescentDriver {
    job: Arc<Job>,
    completion: Arc<Completion>,
    started: AtomicBool,
    /// False for synthesized cleanup descents.
    notify_job: bool,
    cancel_timeout: Duration,
    core: Mutex<DescentCore>,
}

struct DescentCore {
    going_to: i32,
    working_on: i32,
    cancelled: bool,
    repurposed: bool,
    queue: Option<Arc<DescentQueue>>,
}

impl DescentDriver {
    pub(crate) fn new(job: &Arc<Job>, going_to: i32, current: i32) -> Arc<Self> {
        Self::build(job, going_to, current, true)
    }

    /// Synthesizes the recovery descent of a failed or cancelled ascent.
    ///
    /// The cursor starts one above the current level: that level was being
    /// worked on and may hold partially-started services.
    pub(crate) fn cleanup(job: &Arc<Job>, going_to: i32) -> Arc<Self> {
        Self::build(job, going_to, job.ctx.current_level() + 1, false)
    }

    fn build(job: &Arc<Job>, going_to: i32, working_on: i32, notify_job: bool) -> Arc<Self> {
        Arc::new(Self {
            job: job.clone(),
            completion: Completion::new(),
            started: AtomicBool::new(false),
            notify_job,
            cancel_timeout: job.cfg.cancel_timeout,
            core: Mutex::new(DescentCore {
                going_to,
                working_on,
                cancelled: false,
                repurposed: false,
                queue: None,
            }),
        })
    }

    pub(crate) fn completion(&self) -> Arc<Completion> {
        self.completion.clone()
    }

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

    /// Stops descending below the level already reached and arms the
    /// stuck-destruction watchdog for the level in progress.
    pub(crate) fn cancel(&self) {
        let queue = {
            let mut core = lock(&self.core);
            if core.cancelled {
                return;
            }
            core.cancelled = true;
            core.queue.clone()
        };
        if let Some(queue) = queue {
            self.arm_watchdog(queue);
        }
    }

    fn arm_watchdog(&self, queue: Arc<DescentQueue>) {
        if queue.len() == 0 {
            return;
        }
        let period = self.cancel_timeout;
        tokio::spawn(async move {
            let mut last_len = queue.len();
            loop {
                tokio::time::sleep(period).await;
                let len = queue.len();
                if len == 0 {
                    return;
                }
                if len == last_len {
                    queue.hard_cancel_current();
                } else {
                    last_len = len;
                }
            }
        });
    }

    pub(crate) async fn run(self: Arc<Self>) {
        let job = self.job.clone();
        loop {
            let (working_on, cancelled) = {
                let core = lock(&self.core);
                if core.working_on <= core.going_to {
                    break;
                }
                (core.working_on, core.cancelled)
            };

            if cancelled {
                if self.notify_job {
                    job.dispatch_cancelled(working_on).await;
                    job.finish(None);
                    job.ctx.job_done();
                    self.completion.finish(None);
                }
                return;
            }

            // The current level is defined by every service at or below it
            // being live; that stops holding the moment the first
            // destruction begins.
            let proceeding = working_on - 1;
            job.ctx.set_current_level(proceeding);

            let queue = Arc::new(DescentQueue::new(
                job.ctx.ordered_handles_at_level(working_on),
            ));
            let cancelled_midway = {
                let mut core = lock(&self.core);
                core.queue = Some(queue.clone());
                core.cancelled
            };
            if cancelled_midway {
                // cancel() raced in before the queue existed; arm against
                // the live one.
                self.arm_watchdog(queue.clone());
            }

            let clamp = queue.drain(&job).await;

            {
                let mut core = lock(&self.core);
                core.queue = None;
                if clamp {
                    core.going_to = working_on;
                }
                core.working_on -= 1;
            }

            if self.notify_job {
                job.dispatch_progress(proceeding).await;
            }
        }

        if !self.notify_job {
            // Cleanup descents neither complete the job nor release the
            // gate; the originating ascent does.
            return;
        }
        if lock(&self.core).repurposed {
            return;
        }
        job.finish(None);
        job.ctx.job_done();
        self.completion.finish(None);
    }
}

/// Strictly serial teardown of one level's services.
pub(crate) struct DescentQueue {
    state: Mutex<QueueState>,
}

struct QueueState {
    items: VecDeque<Arc<ServiceHandle>>,
    /// Token of the destruction in flight; the watchdog's abort handle.
    current_cancel: Option<CancellationToken>,
}

impl DescentQueue {
    fn new(handles: Vec<Arc<ServiceHandle>>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: handles.into_iter().collect(),
                current_cancel: None,
            }),
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    /// Aborts the destruction in flight; the stuck service is abandoned.
    pub(crate) fn hard_cancel_current(&self) {
        if let Some(token) = &lock(&self.state).current_cancel {
            token.cancel();
        }
    }

    /// Destroys every queued service, one at a time. Returns true when a
    /// failure vote asks the descent to stop below this level.
    async fn drain(&self, job: &Arc<Job>) -> bool {
        let mut clamp = false;
        loop {
            let (handle, token) = {
                let mut state = lock(&self.state);
                let Some(handle) = state.items.front().cloned() else {
                    break;
                };
                let token = CancellationToken::new();
                state.current_cancel = Some(token.clone());
                (handle, token)
            };

            let result = job.ctx.destroy(&handle, &token).await;

            {
                let mut state = lock(&self.state);
                state.items.pop_front();
                state.current_cancel = None;
            }

            match result {
                Ok(()) => {}
                // Hard-cancelled: abandoned, not an error.
                Err(e) if e.is_was_cancelled() => {}
                Err(e) => {
                    let info = ErrorInfo::destruction(handle.descriptor().clone(), e);
                    if job.dispatch_error(&info).await == ErrorAction::GoToNextLowerLevelAndStop {
                        clamp = true;
                    }
                }
            }
        }
        clamp
    }
}
