//! Client-facing failure taxonomy.
//!
//! Every failure a client can see carries a message, a stable internal code
//! and the HTTP status it is served with. Codes are part of the public API
//! and must not be renumbered.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    BadParams,
    InvalidInspect,
    MaxRequests,
    TtlExceeded,
    SteamOffline,
    GenericBad,
    BadBody,
    BadSecret,
    NoBotsAvailable,
    RateLimit,
    MaxQueueSize,
}

/// Wire shape of a failure: `{error, code, status}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBody {
    pub error: String,
    pub code: u16,
    pub status: u16,
}

impl Failure {
    pub fn message(self) -> &'static str {
        match self {
            Failure::BadParams => "Improper Parameter Structure",
            Failure::InvalidInspect => "Invalid Inspect Link Structure",
            Failure::MaxRequests => "You have too many pending requests",
            Failure::TtlExceeded => "Valve's servers didn't reply in time",
            Failure::SteamOffline => {
                "Valve's servers appear to be offline, please try again later"
            }
            Failure::GenericBad => "Something went wrong on our end, please try again",
            Failure::BadBody => "Improper body format",
            Failure::BadSecret => "Bad Secret",
            Failure::NoBotsAvailable => "No bots available to fulfill this request",
            Failure::RateLimit => "Rate limit exceeded, too many requests",
            Failure::MaxQueueSize => "Queue size is full, please try again later",
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Failure::BadParams => 1,
            Failure::InvalidInspect => 2,
            Failure::MaxRequests => 3,
            Failure::TtlExceeded => 4,
            Failure::SteamOffline => 5,
            Failure::GenericBad => 6,
            Failure::BadBody => 7,
            Failure::BadSecret => 8,
            Failure::NoBotsAvailable => 9,
            Failure::RateLimit => 10,
            Failure::MaxQueueSize => 11,
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Failure::BadParams
            | Failure::InvalidInspect
            | Failure::MaxRequests
            | Failure::BadBody
            | Failure::BadSecret => StatusCode::BAD_REQUEST,
            Failure::SteamOffline => StatusCode::SERVICE_UNAVAILABLE,
            Failure::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Failure::TtlExceeded
            | Failure::GenericBad
            | Failure::NoBotsAvailable
            | Failure::MaxQueueSize => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(self) -> FailureBody {
        FailureBody {
            error: self.message().to_string(),
            code: self.code(),
            status: self.status().as_u16(),
        }
    }

    /// Whether a dispatch attempt that ended with this failure counts
    /// against the work item's attempt bound.
    pub fn consumes_attempt(self) -> bool {
        self != Failure::NoBotsAvailable
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Code {}] - {}", self.code(), self.message())
    }
}

impl std::error::Error for Failure {}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
