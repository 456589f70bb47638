//! Metric instrument factories for inspect-dispatch.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider the instruments are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Bucket bounds for worker calls, in milliseconds. Relay lookups range from
/// tens of milliseconds up to the request TTL.
const WORK_DURATION_BOUNDS_MS: [f64; 12] = [
    10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 20000.0, 30000.0,
];

fn meter() -> Meter {
    opentelemetry::global::meter("inspect-dispatch")
}

/// Counter: jobs accepted into the queue.
pub fn jobs_admitted() -> Counter<u64> {
    meter()
        .u64_counter("inspect.jobs.admitted")
        .with_description("Number of jobs admitted to the dispatch queue")
        .build()
}

/// Counter: jobs rejected at admission.
/// Labels: `code` (failure code).
pub fn jobs_rejected() -> Counter<u64> {
    meter()
        .u64_counter("inspect.jobs.rejected")
        .with_description("Number of jobs rejected before queueing")
        .build()
}

/// Counter: work items handed to a worker.
pub fn work_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("inspect.work.dispatched")
        .with_description("Number of work item dispatch attempts")
        .build()
}

/// Counter: work items pushed back for another attempt.
/// Labels: `code` (failure code of the attempt).
pub fn work_retried() -> Counter<u64> {
    meter()
        .u64_counter("inspect.work.retried")
        .with_description("Number of work items requeued after a failed attempt")
        .build()
}

/// Counter: work items that exhausted their attempts.
/// Labels: `code`.
pub fn work_failed() -> Counter<u64> {
    meter()
        .u64_counter("inspect.work.failed")
        .with_description("Number of work items failed for good")
        .build()
}

/// Counter: work items resolved successfully.
pub fn work_completed() -> Counter<u64> {
    meter()
        .u64_counter("inspect.work.completed")
        .with_description("Number of work items resolved successfully")
        .build()
}

/// Histogram: worker call duration in milliseconds.
/// Labels: `outcome` ("ok" | "error").
pub fn work_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("inspect.work.duration_ms")
        .with_description("Worker call duration in milliseconds")
        .with_unit("ms")
        .with_boundaries(WORK_DURATION_BOUNDS_MS.to_vec())
        .build()
}
