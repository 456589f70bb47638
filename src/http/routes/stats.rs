use axum::{Json, extract::State};
use serde::Serialize;

use crate::http::AppState;
use crate::pool::WorkerPool;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub bots_online: usize,
    pub bots_total: usize,
    pub queue_size: usize,
    pub queue_concurrency: usize,
}

/// Pool and queue occupancy.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let pool = state.service.pool();
    let queue = state.service.queue();
    Json(StatsResponse {
        bots_online: pool.ready_count(),
        bots_total: pool.total(),
        queue_size: queue.size(),
        queue_concurrency: queue.concurrency(),
    })
}
