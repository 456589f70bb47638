//! Worker pool: which bots exist, which are ready, and which are free.
//!
//! The dispatch queue only sees the [`WorkerPool`] contract. A worker is
//! claimed through a [`Lease`], which marks it busy until dropped.

pub mod bot;
pub mod relay;

pub use bot::{Bot, BotStatus, Readiness, Session};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{Failure, Inspection, WorkItem};

/// A long-lived connection able to resolve one lookup at a time.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Ready means the session is established, independent of busy/idle.
    fn is_ready(&self) -> bool;

    /// Atomically mark the worker busy. False if it already was.
    fn try_claim(&self) -> bool;

    fn release(&self);

    async fn send_work(&self, item: &WorkItem) -> Result<Inspection, Failure>;
}

/// Exclusive use of a worker. Releases it on drop.
pub struct Lease {
    worker: Arc<dyn Worker>,
}

impl Lease {
    /// Claim `worker` if it is ready and idle.
    pub fn claim(worker: Arc<dyn Worker>) -> Option<Self> {
        if worker.is_ready() && worker.try_claim() {
            Some(Self { worker })
        } else {
            None
        }
    }

    pub fn worker_name(&self) -> &str {
        self.worker.name()
    }

    pub async fn send_work(&self, item: &WorkItem) -> Result<Inspection, Failure> {
        self.worker.send_work(item).await
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.worker.release();
    }
}

/// What the dispatch queue needs from the set of workers.
pub trait WorkerPool: Send + Sync {
    /// A ready, idle worker, or `None` when every ready worker is busy.
    fn acquire_free_worker(&self) -> Option<Lease>;

    fn ready_count(&self) -> usize;

    fn total(&self) -> usize;

    /// Aggregate "at least one worker ready" signal. Only flips are sent.
    fn subscribe(&self) -> watch::Receiver<bool>;

    fn has_ready_worker(&self) -> bool {
        self.ready_count() > 0
    }
}

/// The bot pool backing the service.
pub struct BotController {
    bots: RwLock<Vec<Arc<Bot>>>,
    readiness: Arc<Readiness>,
}

impl Default for BotController {
    fn default() -> Self {
        Self::new()
    }
}

impl BotController {
    pub fn new() -> Self {
        Self {
            bots: RwLock::new(Vec::new()),
            readiness: Arc::new(Readiness::new()),
        }
    }

    /// Register a bot backed by `session`. It starts offline.
    pub fn add_bot(&self, username: impl Into<String>, session: Arc<dyn Session>) -> Arc<Bot> {
        let bot = Arc::new(Bot::new(username, session, Arc::clone(&self.readiness)));
        self.bots.write().push(Arc::clone(&bot));
        bot
    }

    pub fn bots(&self) -> Vec<Arc<Bot>> {
        self.bots.read().clone()
    }

    pub fn has_bot_online(&self) -> bool {
        self.readiness.is_online()
    }

    /// Look up one item on any free bot.
    pub async fn lookup(&self, item: &WorkItem) -> Result<Inspection, Failure> {
        let lease = self
            .acquire_free_worker()
            .ok_or(Failure::NoBotsAvailable)?;
        lease.send_work(item).await
    }
}

impl WorkerPool for BotController {
    fn acquire_free_worker(&self) -> Option<Lease> {
        // Shuffle to spread requests evenly across bots
        let mut candidates = self.bots();
        candidates.shuffle(&mut rand::rng());

        let lease = candidates
            .into_iter()
            .find_map(|bot| Lease::claim(bot as Arc<dyn Worker>));
        if let Some(ref lease) = lease {
            debug!(bot = lease.worker_name(), "claimed bot");
        }
        lease
    }

    fn ready_count(&self) -> usize {
        self.bots.read().iter().filter(|bot| bot.is_ready()).count()
    }

    fn total(&self) -> usize {
        self.bots.read().len()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.readiness.subscribe()
    }
}
