use axum::http::{HeaderValue, Method, request::Parts};
use regex::Regex;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// CORS for configured origins, exact or by pattern.
///
/// Returns `None` when no origins are configured, in which case no CORS
/// headers are sent at all.
pub fn cors_layer(origins: Vec<String>, patterns: Vec<Regex>) -> Option<CorsLayer> {
    if origins.is_empty() && patterns.is_empty() {
        return None;
    }

    let allow = AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
        let Ok(origin) = origin.to_str() else {
            return false;
        };
        origins.iter().any(|o| o == origin) || patterns.iter().any(|re| re.is_match(origin))
    });

    Some(
        CorsLayer::new()
            .allow_origin(allow)
            .allow_methods([Method::GET]),
    )
}
