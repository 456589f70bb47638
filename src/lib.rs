//! # inspect-dispatch
//!
//! Inspect-link lookup service. Client requests become jobs, jobs fan out
//! into per-item work on a retrying dispatch queue, and a pool of bot
//! sessions performs the lookups.
//!
//! Provides the dispatch engine, the bot pool, the HTTP boundary (axum),
//! and OpenTelemetry observability.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod http;
pub mod job;
pub mod model;
pub mod pool;
pub mod telemetry;
