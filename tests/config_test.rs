use std::io::Write;
use std::time::Duration;

use inspect_dispatch::config::Config;
use inspect_dispatch::config::secrets::{ExposeSecret, SecretString, matches};

const MINIMAL: &str = r#"
[[logins]]
user = "bot1"
pass = "hunter2"
endpoint = "http://127.0.0.1:9001"
"#;

#[test]
fn minimal_config_uses_defaults() {
    let config = Config::from_toml_str(MINIMAL).unwrap();

    assert_eq!(config.http.port, 80);
    assert!(!config.trust_proxy);
    assert_eq!(config.logins.len(), 1);
    assert_eq!(config.logins[0].credentials.user, "bot1");
    assert_eq!(config.logins[0].credentials.pass.expose_secret(), "hunter2");
    assert!(config.logins[0].credentials.auth.is_none());
    assert_eq!(config.max_simultaneous_requests, 1);
    assert_eq!(config.max_queue_size, 0);
    assert_eq!(config.max_attempts, 3);
    assert_eq!(config.request_delay, Duration::from_millis(1100));
    assert_eq!(config.request_ttl, Duration::from_millis(2000));
    assert_eq!(config.rescale_interval, Duration::from_millis(50));
    assert!(config.price_key.is_none());
    assert!(!config.rate_limit.enable);
    assert_eq!(config.log_level, "info");
}

#[test]
fn full_config_parses() {
    let toml = r#"
trust_proxy = true
proxies = ["http://proxy-a:8080", "socks5://proxy-b:1080"]
max_simultaneous_requests = 10
max_queue_size = 100
max_attempts = 5
price_key = "pk"
bulk_key = ""
allowed_origins = ["https://example.com"]
allowed_regex_origins = ["^https://.*\\.example\\.com$"]

[http]
port = 8080

[rate_limit]
enable = true
window_ms = 1000
max = 5

[[logins]]
user = "a"
pass = "p"
auth = "SHARED"
endpoint = "http://relay-a"

[[logins]]
user = "b"
pass = "p"
endpoint = "http://relay-b"

[[logins]]
user = "c"
pass = "p"
endpoint = "http://relay-c"
"#;
    let config = Config::from_toml_str(toml).unwrap();

    assert_eq!(config.http.port, 8080);
    assert!(config.trust_proxy);
    assert_eq!(config.proxy_for(0), Some("http://proxy-a:8080"));
    assert_eq!(config.proxy_for(1), Some("socks5://proxy-b:1080"));
    assert_eq!(config.proxy_for(2), Some("http://proxy-a:8080"));
    assert_eq!(config.price_key.as_ref().unwrap().expose_secret(), "pk");
    assert!(config.bulk_key.is_none(), "empty keys are treated as unset");
    assert!(config.logins[0].credentials.auth.is_some());

    let limits = config.limits();
    assert_eq!(limits.max_simultaneous_requests, 10);
    assert_eq!(limits.max_queue_size, 100);
    assert_eq!(limits.max_attempts, 5);
    assert!(config.rate_limit.enable);
    assert_eq!(config.rate_limit.max, 5);
}

#[test]
fn no_proxies_means_direct_connections() {
    let config = Config::from_toml_str(MINIMAL).unwrap();
    assert_eq!(config.proxy_for(0), None);
}

#[test]
fn config_without_logins_is_rejected() {
    let err = Config::from_toml_str("max_attempts = 3").unwrap_err();
    assert!(err.to_string().contains("no bot logins"));
}

#[test]
fn bad_proxy_scheme_is_rejected() {
    let toml = format!("proxies = [\"ftp://nope\"]\n{MINIMAL}");
    let err = Config::from_toml_str(&toml).unwrap_err();
    assert!(err.to_string().contains("ftp://nope"));
}

#[test]
fn zero_max_attempts_is_rejected() {
    let toml = format!("max_attempts = 0\n{MINIMAL}");
    assert!(Config::from_toml_str(&toml).is_err());
}

#[test]
fn bad_regex_origin_is_rejected() {
    let toml = format!("allowed_regex_origins = [\"(unclosed\"]\n{MINIMAL}");
    assert!(Config::from_toml_str(&toml).is_err());
}

#[test]
fn malformed_toml_is_rejected() {
    assert!(Config::from_toml_str("logins = 3").is_err());
}

#[test]
fn load_reads_file_and_applies_env_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();

    unsafe {
        std::env::set_var("HTTP_PORT", "9090");
        std::env::set_var("INSPECT_PRICE_KEY", "from-env");
    }

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.http.port, 9090);
    assert_eq!(config.price_key.as_ref().unwrap().expose_secret(), "from-env");

    unsafe {
        std::env::remove_var("HTTP_PORT");
        std::env::remove_var("INSPECT_PRICE_KEY");
    }
}

#[test]
fn load_fails_for_missing_file() {
    assert!(Config::load(std::path::Path::new("/nonexistent/inspectd.toml")).is_err());
}

#[test]
fn secret_matching() {
    let key = SecretString::from("s3cret");
    assert!(matches(Some(&key), Some("s3cret")));
    assert!(!matches(Some(&key), Some("wrong")));
    assert!(!matches(Some(&key), None));
    assert!(!matches(None, Some("s3cret")));
}
