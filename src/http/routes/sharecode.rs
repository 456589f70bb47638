use std::sync::LazyLock;

use axum::{
    Json,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde_json::json;

static SHARE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^CSGO-([A-Za-z0-9]{5}-){4}[A-Za-z0-9]{5}$").expect("share code pattern is valid")
});

pub fn is_share_code(code: &str) -> bool {
    SHARE_CODE.is_match(code)
}

/// `GET /sharecode/:code`. Echoes well-formed match share codes.
pub async fn sharecode_handler(Path(code): Path<String>) -> Response {
    if is_share_code(&code) {
        Json(json!({ "code": code })).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid share code" })),
        )
            .into_response()
    }
}
