//! Keeps dispatch concurrency in line with the number of ready workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::info;

use super::clock::Clock;
use super::dispatch::DispatchQueue;
use crate::pool::WorkerPool;

/// Default interval between readiness samples.
pub const DEFAULT_RESCALE_INTERVAL: Duration = Duration::from_millis(50);

/// Periodically resynchronizes the queue's ceiling to the pool's ready
/// count and re-drives dispatch for items parked by "no worker free".
pub struct Rescaler {
    queue: DispatchQueue,
    pool: Arc<dyn WorkerPool>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Clone for Rescaler {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            pool: Arc::clone(&self.pool),
            clock: Arc::clone(&self.clock),
            interval: self.interval,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl Rescaler {
    pub fn new(
        queue: DispatchQueue,
        pool: Arc<dyn WorkerPool>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            pool,
            clock,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// One sample: rescale, then dispatch whatever fits.
    pub fn tick_once(&self) -> usize {
        let ready = self.pool.ready_count();
        self.queue.rescale(ready) + self.queue.tick()
    }

    /// Signal the loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run until [`Rescaler::shutdown`] is called.
    pub async fn run(&self) {
        info!(interval_ms = self.interval.as_millis() as u64, "rescaler started");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("rescaler shutting down");
                    return;
                }
                _ = self.clock.sleep(self.interval) => {
                    self.tick_once();
                }
            }
        }
    }
}
