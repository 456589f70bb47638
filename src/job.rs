//! Jobs: one client request fanned out into per-item lookups.
//!
//! A job collects item outcomes keyed by asset id and produces its reply
//! exactly once, when the last outstanding item resolves. Jobs live in a
//! [`JobRegistry`] while their items are queued; work items only carry the
//! [`JobId`].

use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::model::{ClientId, Failure, InspectLink, ItemOutcome, JobId, WorkItem};

/// A link waiting for its outcome.
#[derive(Debug, Clone)]
pub struct PendingLink {
    pub link: InspectLink,
    pub price: Option<u64>,
}

/// The HTTP reply a job produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn failure(failure: Failure) -> Self {
        Self {
            status: failure.status(),
            body: ItemOutcome::Failed(failure).to_json(),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// One client request.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    client: ClientId,
    outstanding: IndexMap<String, PendingLink>,
    completed: IndexMap<String, ItemOutcome>,
    replied: bool,
}

impl Job {
    pub fn new(client: ClientId) -> Self {
        Self {
            id: JobId::new(),
            client,
            outstanding: IndexMap::new(),
            completed: IndexMap::new(),
            replied: false,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn client(&self) -> &ClientId {
        &self.client
    }

    /// Add a link. A repeated asset id replaces the earlier entry.
    pub fn enqueue(&mut self, link: InspectLink, price: Option<u64>) {
        let asset_id = link.asset_id().to_string();
        if self.outstanding.contains_key(&asset_id) {
            warn!(job = %self.id, asset_id, "duplicate asset id in job, keeping the last one");
        }
        self.outstanding.insert(asset_id, PendingLink { link, price });
    }

    pub fn remaining_size(&self) -> usize {
        self.outstanding.len()
    }

    pub fn remaining(&self) -> impl Iterator<Item = &PendingLink> {
        self.outstanding.values()
    }

    pub fn is_replied(&self) -> bool {
        self.replied
    }

    /// Work items for every outstanding link, in insertion order.
    pub fn work_items(&self, max_attempts: u32) -> Vec<WorkItem> {
        self.outstanding
            .values()
            .map(|pending| {
                let mut item = WorkItem::new(
                    self.id,
                    self.client.clone(),
                    pending.link.clone(),
                    pending.price,
                );
                item.max_attempts = max_attempts;
                item
            })
            .collect()
    }

    /// Record the outcome for one asset id.
    ///
    /// Unknown or already-resolved ids are ignored. Returns the reply when
    /// this call resolved the last outstanding item.
    pub fn resolve(&mut self, asset_id: &str, outcome: impl Into<ItemOutcome>) -> Option<Reply> {
        if self.outstanding.shift_remove(asset_id).is_none() {
            debug!(job = %self.id, asset_id, "ignoring resolution for unknown asset id");
            return None;
        }

        self.completed.insert(asset_id.to_string(), outcome.into());

        if self.outstanding.is_empty() {
            self.reply()
        } else {
            None
        }
    }

    /// Resolve everything still outstanding with the same outcome.
    pub fn resolve_all_remaining(&mut self, outcome: impl Into<ItemOutcome>) -> Option<Reply> {
        let outcome = outcome.into();
        let remaining: Vec<String> = self.outstanding.keys().cloned().collect();
        let mut reply = None;
        for asset_id in remaining {
            if let Some(r) = self.resolve(&asset_id, outcome.clone()) {
                reply = Some(r);
            }
        }
        reply
    }

    fn reply(&mut self) -> Option<Reply> {
        if self.replied || self.completed.is_empty() {
            return None;
        }
        self.replied = true;

        if self.completed.len() > 1 {
            let body: Map<String, Value> = self
                .completed
                .iter()
                .map(|(asset_id, outcome)| (asset_id.clone(), outcome.to_json()))
                .collect();
            return Some(Reply {
                status: StatusCode::OK,
                body: Value::Object(body),
            });
        }

        let (_, outcome) = self.completed.first()?;
        Some(match outcome {
            ItemOutcome::Found(item) => Reply {
                status: StatusCode::OK,
                body: json!({ "iteminfo": item }),
            },
            ItemOutcome::Failed(failure) => Reply::failure(*failure),
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Receiving end of a job's reply.
pub struct ReplyHandle {
    job: JobId,
    rx: oneshot::Receiver<Reply>,
}

impl ReplyHandle {
    pub fn job_id(&self) -> JobId {
        self.job
    }

    /// Wait for the job to resolve.
    pub async fn wait(self) -> Reply {
        match self.rx.await {
            Ok(reply) => reply,
            Err(_) => {
                warn!(job = %self.job, "job dropped without replying");
                Reply::failure(Failure::GenericBad)
            }
        }
    }
}

struct Entry {
    job: Job,
    reply: oneshot::Sender<Reply>,
}

/// Jobs with outstanding work, keyed by id.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Entry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a job until it replies.
    pub fn register(&self, job: Job) -> ReplyHandle {
        let (tx, rx) = oneshot::channel();
        let id = job.id();
        self.jobs.lock().insert(id, Entry { job, reply: tx });
        ReplyHandle { job: id, rx }
    }

    /// Deliver an item outcome. Returns true if the job replied.
    pub fn resolve(&self, job: JobId, asset_id: &str, outcome: impl Into<ItemOutcome>) -> bool {
        let mut jobs = self.jobs.lock();
        let Some(entry) = jobs.get_mut(&job) else {
            debug!(%job, asset_id, "resolution for a job that already replied");
            return false;
        };

        let Some(reply) = entry.job.resolve(asset_id, outcome) else {
            return false;
        };

        if let Some(entry) = jobs.remove(&job) {
            // The receiver may be gone if the client hung up.
            let _ = entry.reply.send(reply);
        }
        true
    }

    /// Resolve every outstanding item of a job with one outcome.
    pub fn resolve_all_remaining(&self, job: JobId, outcome: impl Into<ItemOutcome>) -> bool {
        let mut jobs = self.jobs.lock();
        let Some(entry) = jobs.get_mut(&job) else {
            return false;
        };

        let Some(reply) = entry.job.resolve_all_remaining(outcome) else {
            return false;
        };

        if let Some(entry) = jobs.remove(&job) {
            let _ = entry.reply.send(reply);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
