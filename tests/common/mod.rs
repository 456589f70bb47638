//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use inspect_dispatch::model::{Failure, InspectLink, Inspection};
use inspect_dispatch::pool::{BotController, BotStatus, Session};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Semaphore;

pub const S_LINK: &str = "steam://rungame/730/76561202255233023/+csgo_econ_action_preview S76561198084749846A698323590D7935523998312483177";
pub const M_LINK: &str = "steam://rungame/730/76561202255233023/+csgo_econ_action_preview M625254122282020305A6760346663D30614827701953021";

/// A valid link for asset id `a`.
pub fn link(a: u64) -> InspectLink {
    InspectLink::from_parts("76561198084749846", &a.to_string(), "7935523998312483177", "0")
}

/// Session with per-asset scripted replies. Unscripted lookups succeed
/// with `{"a": <asset id>}`.
#[derive(Default)]
pub struct ScriptedSession {
    script: Mutex<HashMap<String, VecDeque<Result<Inspection, Failure>>>>,
    calls: Mutex<Vec<(String, Option<u64>)>>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every lookup waits for a permit on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn script(&self, asset_id: &str, replies: Vec<Result<Inspection, Failure>>) {
        self.script
            .lock()
            .insert(asset_id.to_string(), replies.into_iter().collect());
    }

    /// Fail every lookup for `asset_id` with `failure`, `times` times.
    pub fn fail(&self, asset_id: &str, failure: Failure, times: usize) {
        self.script(asset_id, vec![Err(failure); times]);
    }

    pub fn calls(&self) -> Vec<(String, Option<u64>)> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, asset_id: &str) -> usize {
        self.calls.lock().iter().filter(|(a, _)| a == asset_id).count()
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn inspect(&self, link: &InspectLink, price: Option<u64>) -> Result<Inspection, Failure> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let asset_id = link.asset_id().to_string();
        self.calls.lock().push((asset_id.clone(), price));

        let scripted = self
            .script
            .lock()
            .get_mut(&asset_id)
            .and_then(|replies| replies.pop_front());
        scripted.unwrap_or_else(|| {
            Ok(Inspection::new(json!({ "a": asset_id })).with_delay(self.delay))
        })
    }
}

/// A pool of `ready` ready bots plus `offline` offline ones, all sharing
/// `session`.
pub fn pool_with(session: Arc<ScriptedSession>, ready: usize, offline: usize) -> Arc<BotController> {
    let pool = Arc::new(BotController::new());
    for i in 0..ready {
        let bot = pool.add_bot(format!("bot-{i}"), session.clone());
        bot.set_status(BotStatus::Ready);
    }
    for i in 0..offline {
        pool.add_bot(format!("offline-{i}"), session.clone());
    }
    pool
}
