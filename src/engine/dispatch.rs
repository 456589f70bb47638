//! Dispatch queue: matches pending work items to free workers.
//!
//! All queue state lives behind one mutex and is only touched in short
//! synchronous sections; the worker call is the only await point and runs
//! on its own task. Completions feed back into the same sections, so
//! `in_flight` never exceeds the concurrency ceiling that was current when
//! the item was dispatched.
//!
//! Retries go to the head of the pending sequence. Attempts that fail
//! because no worker was free do not count against the item's bound and
//! wait for the next [`DispatchQueue::tick`] instead of spinning.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{Instrument, Span, debug, info, warn};

use super::admission::Limits;
use super::clock::Clock;
use crate::event::{Event, EventKind};
use crate::job::{Job, JobRegistry, ReplyHandle};
use crate::model::{ClientId, Failure, Inspection, ItemOutcome, State, WorkItem};
use crate::pool::WorkerPool;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_work_span};

const EVENT_CAPACITY: usize = 1024;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<WorkItem>,
    /// Admitted but unresolved work items per client.
    clients: HashMap<ClientId, usize>,
    concurrency: usize,
    in_flight: usize,
    running: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    pool: Arc<dyn WorkerPool>,
    jobs: JobRegistry,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<Event>,
    seq: AtomicU64,
}

/// The scheduler. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<Inner>,
}

impl DispatchQueue {
    /// Create a running queue with the given initial concurrency.
    pub fn new(pool: Arc<dyn WorkerPool>, concurrency: usize, clock: Arc<dyn Clock>) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    concurrency,
                    running: true,
                    ..QueueState::default()
                }),
                pool,
                jobs: JobRegistry::new(),
                clock,
                events,
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Queue every outstanding item of `job` and start dispatching.
    ///
    /// The job is owned by the queue's registry until it replies.
    pub fn submit(&self, job: Job, max_attempts: u32) -> ReplyHandle {
        let handle = {
            let mut state = self.inner.state.lock();
            self.enqueue(&mut state, job, max_attempts)
        };

        self.tick();
        handle
    }

    /// Like [`DispatchQueue::submit`], but only if the job fits under the
    /// per-client and queue-size ceilings of `limits`.
    ///
    /// The check and the per-client count happen in one critical section,
    /// so concurrent submissions from one client cannot both squeeze under
    /// the ceiling. A rejected job is handed back with the failure.
    pub fn try_submit(&self, job: Job, limits: &Limits) -> Result<ReplyHandle, (Job, Failure)> {
        let handle = {
            let mut state = self.inner.state.lock();
            if let Some(failure) = over_limits(&state, &job, limits) {
                return Err((job, failure));
            }
            self.enqueue(&mut state, job, limits.max_attempts)
        };

        self.tick();
        Ok(handle)
    }

    // Runs under the state lock. The job is registered before any of its
    // items can be picked up by a tick on another task.
    fn enqueue(&self, state: &mut QueueState, job: Job, max_attempts: u32) -> ReplyHandle {
        let items = job.work_items(max_attempts);
        let handle = self.inner.jobs.register(job);

        for item in items {
            *state.clients.entry(item.client.clone()).or_default() += 1;
            self.emit(EventKind::WorkQueued {
                job: item.job,
                asset_id: item.asset_id().to_string(),
            });
            state.pending.push_back(item);
        }
        handle
    }

    /// Dispatch pending items until capacity or the queue runs out.
    /// Returns how many were dispatched.
    pub fn tick(&self) -> usize {
        let mut dispatched = 0;
        while self.dispatch_one() {
            dispatched += 1;
        }
        dispatched
    }

    /// Set a new concurrency ceiling.
    ///
    /// Growing the ceiling dispatches up to the difference right away;
    /// shrinking it never preempts in-flight work. Returns how many items
    /// were dispatched.
    pub fn rescale(&self, concurrency: usize) -> usize {
        let grown = {
            let mut state = self.inner.state.lock();
            let old = state.concurrency;
            if old == concurrency {
                return 0;
            }
            state.concurrency = concurrency;
            info!(from = old, to = concurrency, "rescaled dispatch concurrency");
            self.emit(EventKind::Rescaled {
                from: old,
                to: concurrency,
            });
            concurrency.saturating_sub(old)
        };

        let mut dispatched = 0;
        for _ in 0..grown {
            if self.dispatch_one() {
                dispatched += 1;
            }
        }
        dispatched
    }

    pub fn start(&self) {
        let was_running = std::mem::replace(&mut self.inner.state.lock().running, true);
        if !was_running {
            info!("dispatch queue started");
            self.tick();
        }
    }

    /// Stop dispatching. Items keep being admitted; in-flight work finishes.
    pub fn pause(&self) {
        self.inner.state.lock().running = false;
        info!("dispatch queue paused");
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Number of pending (not in-flight) items.
    pub fn size(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn concurrency(&self) -> usize {
        self.inner.state.lock().concurrency
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    /// Admitted but unresolved items for `client`.
    pub fn get_user_queued_amt(&self, client: &ClientId) -> usize {
        self.inner
            .state
            .lock()
            .clients
            .get(client)
            .copied()
            .unwrap_or(0)
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.inner.jobs
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    fn dispatch_one(&self) -> bool {
        let item = {
            let mut state = self.inner.state.lock();
            if !state.running || state.in_flight >= state.concurrency {
                return false;
            }
            let Some(mut item) = state.pending.pop_front() else {
                return false;
            };
            state.in_flight += 1;
            item
        };

        let queue = self.clone();
        tokio::spawn(async move { queue.process(item).await });
        true
    }

    async fn process(self, mut item: WorkItem) {
        let attempt = item.attempts + 1;
        let span = start_work_span(item.job, item.asset_id(), attempt);
        advance(&span, &mut item, State::InFlight);
        self.emit(EventKind::WorkDispatched {
            job: item.job,
            asset_id: item.asset_id().to_string(),
            attempt,
        });
        metrics::work_dispatched().add(1, &[]);

        let result = match self.inner.pool.acquire_free_worker() {
            Some(lease) => {
                let started = Instant::now();
                let result = lease.send_work(&item).instrument(span.clone()).await;
                let outcome = if result.is_ok() { "ok" } else { "error" };
                metrics::work_duration_ms().record(
                    started.elapsed().as_secs_f64() * 1000.0,
                    &[KeyValue::new("outcome", outcome)],
                );
                result
            }
            None => Err(Failure::NoBotsAvailable),
        };

        let redispatch = match result {
            Ok(inspection) => {
                self.complete(&span, item, inspection).await;
                true
            }
            Err(failure) => self.fail(&span, item, failure),
        };

        {
            let mut state = self.inner.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }

        if redispatch {
            self.tick();
        }
    }

    async fn complete(&self, span: &Span, mut item: WorkItem, inspection: Inspection) {
        advance(span, &mut item, State::Resolved);

        // Release the client's slot before the cooldown so it can queue again.
        self.release_client(&item.client);

        let replied = self.inner.jobs.resolve(
            item.job,
            item.asset_id(),
            ItemOutcome::Found(inspection.item),
        );
        debug!(job = %item.job, asset_id = item.asset_id(), "work item resolved");
        self.emit(EventKind::WorkCompleted {
            job: item.job,
            asset_id: item.asset_id().to_string(),
        });
        if replied {
            self.emit(EventKind::JobResolved { job: item.job });
        }
        metrics::work_completed().add(1, &[]);

        if !inspection.delay.is_zero() {
            self.inner.clock.sleep(inspection.delay).await;
        }
    }

    /// Returns whether dispatch should continue right away.
    fn fail(&self, span: &Span, mut item: WorkItem, failure: Failure) -> bool {
        if failure.consumes_attempt() {
            item.attempts += 1;
        }

        if item.attempts_exhausted() {
            advance(span, &mut item, State::FailedFinal);
            warn!(
                job = %item.job,
                link = %item.link,
                client = %item.client,
                attempts = item.attempts,
                error = %failure,
                "work item failed"
            );

            self.release_client(&item.client);
            let replied = self
                .inner
                .jobs
                .resolve(item.job, item.asset_id(), ItemOutcome::Failed(failure));
            self.emit(EventKind::WorkFailed {
                job: item.job,
                asset_id: item.asset_id().to_string(),
                failure,
                attempts: item.attempts,
            });
            if replied {
                self.emit(EventKind::JobResolved { job: item.job });
            }
            metrics::work_failed().add(1, &[KeyValue::new("code", i64::from(failure.code()))]);
            return true;
        }

        advance(span, &mut item, State::Requeued);
        debug!(
            job = %item.job,
            asset_id = item.asset_id(),
            attempts = item.attempts,
            cause = %failure,
            "requeueing work item"
        );
        self.emit(EventKind::WorkRequeued {
            job: item.job,
            asset_id: item.asset_id().to_string(),
            cause: failure,
            attempts: item.attempts,
        });
        metrics::work_retried().add(1, &[KeyValue::new("code", i64::from(failure.code()))]);

        self.inner.state.lock().pending.push_front(item);
        failure.consumes_attempt()
    }

    fn release_client(&self, client: &ClientId) {
        let mut state = self.inner.state.lock();
        if let Some(count) = state.clients.get_mut(client) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.clients.remove(client);
            }
        }
    }

    fn emit(&self, kind: EventKind) {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        // No subscribers is fine.
        let _ = self.inner.events.send(Event {
            seq,
            timestamp: Utc::now(),
            kind,
        });
    }
}

/// First ceiling `job` would break, in admission order.
fn over_limits(state: &QueueState, job: &Job, limits: &Limits) -> Option<Failure> {
    let size = job.remaining_size();

    let max_requests = limits.max_simultaneous_requests;
    let queued = state.clients.get(job.client()).copied().unwrap_or(0);
    if max_requests > 0 && queued + size > max_requests {
        return Some(Failure::MaxRequests);
    }

    let max_queue = limits.max_queue_size;
    if max_queue > 0 && state.pending.len() + size > max_queue {
        return Some(Failure::MaxQueueSize);
    }

    None
}

/// Apply a lifecycle move and record it on the attempt's span.
fn advance(span: &Span, item: &mut WorkItem, to: State) {
    match item.transition(to) {
        Ok(from) => record_state_transition(span, from, to),
        Err(err) => {
            warn!(job = %item.job, asset_id = item.asset_id(), error = %err, "work item lifecycle violated");
        }
    }
}
