//! Core data model.
//!
//! A job is one client request. Each inspect link in it becomes a work
//! item, the scheduling granule of the dispatch queue.

pub mod failure;
pub mod inspect_link;

pub use failure::{Failure, FailureBody};
pub use inspect_link::{InspectFields, InspectLink, InspectParams};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Attempts a work item gets before it fails for good.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Newtype for job IDs. Work items refer to their job through this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// Who submitted a job, usually the client IP. Admission limits are
/// counted per client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// One item lookup, owned by the dispatch queue while it is pending.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// The job this item reports back to.
    pub job: JobId,

    pub link: InspectLink,

    /// Optional market price annotation, already vetted at the boundary.
    pub price: Option<u64>,

    pub client: ClientId,

    /// Attempts that counted against the bound so far.
    pub attempts: u32,

    pub max_attempts: u32,

    pub state: State,
}

impl WorkItem {
    pub fn new(job: JobId, client: ClientId, link: InspectLink, price: Option<u64>) -> Self {
        Self {
            job,
            link,
            price,
            client,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            state: State::Queued,
        }
    }

    pub fn asset_id(&self) -> &str {
        self.link.asset_id()
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Move to `to`, returning the state left behind. Disallowed moves
    /// leave the item untouched.
    pub fn transition(&mut self, to: State) -> Result<State> {
        if !self.state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        Ok(std::mem::replace(&mut self.state, to))
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Waiting in the pending sequence.
    Queued,
    /// Handed to a worker.
    InFlight,
    /// Attempt failed, back at the head of the queue.
    Requeued,
    /// Delivered to its job. Terminal.
    Resolved,
    /// Attempts exhausted, error delivered to its job. Terminal.
    FailedFinal,
}

impl State {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Queued, InFlight)
                | (InFlight, Resolved)
                | (InFlight, Requeued)
                | (InFlight, FailedFinal)
                | (Requeued, InFlight)
        )
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Queued => "queued",
            State::InFlight => "in_flight",
            State::Requeued => "requeued",
            State::Resolved => "resolved",
            State::FailedFinal => "failed_final",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a worker hands back for a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    /// Item details. Opaque to the queue.
    pub item: serde_json::Value,
    /// Cooldown the worker asks for before its slot is reused.
    pub delay: Duration,
}

impl Inspection {
    pub fn new(item: serde_json::Value) -> Self {
        Self {
            item,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Final result of one item within a job.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Found(serde_json::Value),
    Failed(Failure),
}

impl ItemOutcome {
    /// JSON for this item's entry in a reply.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ItemOutcome::Found(item) => item.clone(),
            ItemOutcome::Failed(failure) => {
                serde_json::to_value(failure.body()).unwrap_or(serde_json::Value::Null)
            }
        }
    }
}

impl From<Failure> for ItemOutcome {
    fn from(failure: Failure) -> Self {
        ItemOutcome::Failed(failure)
    }
}
