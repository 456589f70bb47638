//! Admission: decide whether a job may enter the queue.
//!
//! Rejections resolve every item of the job with the same failure, so a
//! bulk request still gets a per-item map and a single request gets the
//! failure's own status.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{debug, info};

use super::dispatch::DispatchQueue;
use crate::job::{Job, Reply, ReplyHandle};
use crate::model::{DEFAULT_MAX_ATTEMPTS, Failure};
use crate::pool::WorkerPool;
use crate::telemetry::metrics;

/// Admission limits. Zero disables a limit.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Ceiling on admitted-but-unresolved items per client.
    pub max_simultaneous_requests: usize,
    /// Ceiling on pending items across all clients.
    pub max_queue_size: usize,
    pub max_attempts: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_simultaneous_requests: 1,
            max_queue_size: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

pub enum Admission {
    Queued(ReplyHandle),
    Rejected(Reply),
}

/// Front door of the dispatch engine.
pub struct InspectService {
    queue: DispatchQueue,
    pool: Arc<dyn WorkerPool>,
    limits: Limits,
}

impl InspectService {
    pub fn new(queue: DispatchQueue, pool: Arc<dyn WorkerPool>, limits: Limits) -> Self {
        Self {
            queue,
            pool,
            limits,
        }
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<dyn WorkerPool> {
        &self.pool
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Admit and wait for the job's reply.
    pub async fn handle(&self, job: Job) -> Reply {
        match self.admit(job) {
            Admission::Queued(handle) => handle.wait().await,
            Admission::Rejected(reply) => reply,
        }
    }

    /// Admission order: no ready worker, then the client's ceiling, then
    /// the queue ceiling. The two ceilings are checked atomically with the
    /// enqueue.
    pub fn admit(&self, job: Job) -> Admission {
        let size = job.remaining_size();
        if size == 0 {
            return Admission::Rejected(Reply::failure(Failure::BadParams));
        }

        if !self.pool.has_ready_worker() {
            return reject(job, Failure::SteamOffline);
        }

        let (id, client) = (job.id(), job.client().clone());
        match self.queue.try_submit(job, &self.limits) {
            Ok(handle) => {
                info!(job = %id, %client, items = size, "job admitted");
                metrics::jobs_admitted().add(1, &[]);
                Admission::Queued(handle)
            }
            Err((job, failure)) => reject(job, failure),
        }
    }
}

fn reject(mut job: Job, failure: Failure) -> Admission {
    debug!(job = %job.id(), client = %job.client(), %failure, "job rejected");
    metrics::jobs_rejected().add(1, &[KeyValue::new("code", i64::from(failure.code()))]);
    let reply = job
        .resolve_all_remaining(failure)
        .unwrap_or_else(|| Reply::failure(failure));
    Admission::Rejected(reply)
}
