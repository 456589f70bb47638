//! Bots: one game-coordinator session each.
//!
//! The session itself (login, keep-alive, wire protocol) sits behind the
//! [`Session`] trait. A bot tracks readiness and busy state on top of it and
//! reports ready/unready flips to the shared [`Readiness`] signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use super::Worker;
use crate::model::{Failure, InspectLink, Inspection, WorkItem};

/// Connection state of a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Offline,
    Connecting,
    /// Session established, lookups accepted.
    Ready,
}

impl BotStatus {
    pub fn is_ready(self) -> bool {
        self == BotStatus::Ready
    }
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BotStatus::Offline => "offline",
            BotStatus::Connecting => "connecting",
            BotStatus::Ready => "ready",
        };
        write!(f, "{s}")
    }
}

/// The opaque capability a bot uses to resolve lookups.
#[async_trait]
pub trait Session: Send + Sync {
    async fn inspect(&self, link: &InspectLink, price: Option<u64>)
    -> Result<Inspection, Failure>;
}

/// Aggregate "any bot ready" signal shared by all bots of a pool.
pub struct Readiness {
    ready_bots: Mutex<usize>,
    tx: watch::Sender<bool>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            ready_bots: Mutex::new(0),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn bot_changed(&self, ready: bool) {
        let mut count = self.ready_bots.lock();
        if ready {
            *count += 1;
        } else {
            *count = count.saturating_sub(1);
        }

        let online = *count > 0;
        let flipped = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if flipped {
            if online {
                info!("bot pool ready");
            } else {
                warn!("bot pool unready, no bots online");
            }
        }
    }
}

pub struct Bot {
    username: String,
    status: Mutex<BotStatus>,
    busy: AtomicBool,
    session: Arc<dyn Session>,
    readiness: Arc<Readiness>,
}

impl Bot {
    pub fn new(
        username: impl Into<String>,
        session: Arc<dyn Session>,
        readiness: Arc<Readiness>,
    ) -> Self {
        Self {
            username: username.into(),
            status: Mutex::new(BotStatus::Offline),
            busy: AtomicBool::new(false),
            session,
            readiness,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn status(&self) -> BotStatus {
        *self.status.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Update the connection state. Returns true if readiness flipped.
    pub fn set_status(&self, status: BotStatus) -> bool {
        let mut current = self.status.lock();
        let was_ready = current.is_ready();
        *current = status;

        if was_ready == status.is_ready() {
            return false;
        }

        if status.is_ready() {
            info!(bot = %self.username, "bot ready");
        } else {
            warn!(bot = %self.username, %status, "bot unready");
        }
        self.readiness.bot_changed(status.is_ready());
        true
    }
}

#[async_trait]
impl Worker for Bot {
    fn name(&self) -> &str {
        &self.username
    }

    fn is_ready(&self) -> bool {
        self.status().is_ready()
    }

    fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    async fn send_work(&self, item: &WorkItem) -> Result<Inspection, Failure> {
        self.session.inspect(&item.link, item.price).await
    }
}
