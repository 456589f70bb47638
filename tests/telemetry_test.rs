//! Integration tests for telemetry initialization and span helpers.

use inspect_dispatch::model::{JobId, State};

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let config = inspect_dispatch::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "inspectd-test".to_string(),
        log_level: "debug".to_string(),
    };
    if let Ok(guard) = inspect_dispatch::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn telemetry_config_follows_service_config() {
    let config = inspect_dispatch::config::Config::from_toml_str(
        r#"
log_level = "debug,hyper=warn"
otel_endpoint = "http://collector:4317"

[[logins]]
user = "bot1"
pass = "hunter2"
endpoint = "http://127.0.0.1:9001"
"#,
    )
    .unwrap();

    let telemetry = inspect_dispatch::telemetry::TelemetryConfig::from_config(&config);
    assert_eq!(telemetry.endpoint.as_deref(), Some("http://collector:4317"));
    assert_eq!(telemetry.service_name, inspect_dispatch::telemetry::SERVICE_NAME);
    assert_eq!(telemetry.log_level, "debug,hyper=warn");
}

#[test]
fn work_span_creates_and_records_transition() {
    let span = inspect_dispatch::telemetry::work::start_work_span(JobId::new(), "698323590", 1);
    inspect_dispatch::telemetry::work::record_state_transition(&span, State::Queued, State::InFlight);
}

#[test]
fn metric_instruments_build_without_a_provider() {
    use inspect_dispatch::telemetry::metrics;

    metrics::jobs_admitted().add(1, &[]);
    metrics::jobs_rejected().add(1, &[]);
    metrics::work_dispatched().add(1, &[]);
    metrics::work_retried().add(1, &[]);
    metrics::work_failed().add(1, &[]);
    metrics::work_completed().add(1, &[]);
    metrics::work_duration_ms().record(12.5, &[]);
}
