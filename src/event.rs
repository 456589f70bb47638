//! Structured events emitted by the dispatch queue on every state change.
//!
//! Consumers subscribe to the broadcast stream for dashboards, audit logs,
//! or tests. Lagging subscribers lose the oldest events; the sequence
//! number lets them detect gaps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Failure, JobId};

/// A structured event emitted by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    WorkQueued {
        job: JobId,
        asset_id: String,
    },
    WorkDispatched {
        job: JobId,
        asset_id: String,
        attempt: u32,
    },
    WorkRequeued {
        job: JobId,
        asset_id: String,
        cause: Failure,
        attempts: u32,
    },
    /// Attempts exhausted. Terminal.
    WorkFailed {
        job: JobId,
        asset_id: String,
        failure: Failure,
        attempts: u32,
    },
    WorkCompleted {
        job: JobId,
        asset_id: String,
    },
    JobResolved {
        job: JobId,
    },
    Rescaled {
        from: usize,
        to: usize,
    },
}
