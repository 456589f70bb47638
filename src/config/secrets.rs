//! Secret handling utilities.
//!
//! Re-exports secrecy types and provides the comparison used for shared
//! secrets supplied by clients.

pub use secrecy::{ExposeSecret, SecretString};

/// True when `configured` is set and equals `supplied`.
pub fn matches(configured: Option<&SecretString>, supplied: Option<&str>) -> bool {
    match (configured, supplied) {
        (Some(secret), Some(supplied)) => secret.expose_secret() == supplied,
        _ => false,
    }
}
