// Rate limiting via tower-governor.
//
// Each client gets `max` requests per `window_ms`, refilled evenly across
// the window. Rejections are rewritten into the standard failure body.

use std::sync::Arc;

use axum::{Router, http::StatusCode, middleware, response::IntoResponse, response::Response};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::model::Failure;

/// Wrap `router` in a per-client rate limit.
pub fn apply_rate_limit(router: Router, config: &RateLimitConfig, trust_proxy: bool) -> Router {
    let max = config.max.max(1);
    let period_ms = (config.window_ms / u64::from(max)).max(1);

    let limited = if trust_proxy {
        let Some(governor) = GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .per_millisecond(period_ms)
            .burst_size(max)
            .finish()
        else {
            warn!("invalid rate limit configuration, rate limiting disabled");
            return router;
        };
        router.layer(GovernorLayer {
            config: Arc::new(governor),
        })
    } else {
        let Some(governor) = GovernorConfigBuilder::default()
            .per_millisecond(period_ms)
            .burst_size(max)
            .finish()
        else {
            warn!("invalid rate limit configuration, rate limiting disabled");
            return router;
        };
        router.layer(GovernorLayer {
            config: Arc::new(governor),
        })
    };

    limited.layer(middleware::map_response(rate_limited_body))
}

async fn rate_limited_body(response: Response) -> Response {
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        Failure::RateLimit.into_response()
    } else {
        response
    }
}
