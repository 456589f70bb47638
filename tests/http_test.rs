//! Integration tests for the HTTP boundary, driven through `oneshot`.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::{M_LINK, S_LINK, ScriptedSession, pool_with};
use inspect_dispatch::config::RateLimitConfig;
use inspect_dispatch::config::secrets::SecretString;
use inspect_dispatch::engine::{DispatchQueue, ImmediateClock, InspectService, Limits};
use inspect_dispatch::http::routes::lookup::can_submit_price;
use inspect_dispatch::http::{AppState, HttpOptions, Keys, build_router};
use inspect_dispatch::model::InspectLink;
use regex::Regex;
use serde_json::{Value, json};
use tower::ServiceExt;

struct Harness {
    session: Arc<ScriptedSession>,
    state: AppState,
}

impl Harness {
    fn new(ready: usize) -> Self {
        Self::with(ready, Limits::default(), Keys::default())
    }

    fn with(ready: usize, limits: Limits, keys: Keys) -> Self {
        let session = Arc::new(ScriptedSession::new());
        let pool = pool_with(session.clone(), ready, 1);
        let queue = DispatchQueue::new(pool.clone(), ready, Arc::new(ImmediateClock));
        let service = Arc::new(InspectService::new(queue, pool, limits));
        Self {
            session,
            state: AppState::new(service, keys),
        }
    }

    fn router(&self) -> Router {
        build_router(self.state.clone(), &HttpOptions::default())
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_bulk(body: impl Into<Body>) -> Request<Body> {
    Request::post("/bulk")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn query_link(link: &str) -> String {
    format!("/?url={}", urlencoding::encode(link))
}

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lookup_by_url_returns_iteminfo() {
    let h = Harness::new(1);

    let (status, body) = send(h.router(), get(&query_link(S_LINK))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "iteminfo": { "a": "698323590" } }));
}

#[tokio::test]
async fn lookup_by_fields() {
    let h = Harness::new(1);

    let uri = "/?s=76561198084749846&a=698323590&d=7935523998312483177";
    let (status, body) = send(h.router(), get(uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["iteminfo"]["a"], "698323590");
}

#[tokio::test]
async fn missing_parameters_are_bad_params() {
    let h = Harness::new(1);

    let (status, body) = send(h.router(), get("/?a=1&d=2")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!(1));

    let (_, body) = send(h.router(), get("/")).await;
    assert_eq!(body["code"], json!(1));
}

#[tokio::test]
async fn malformed_link_is_invalid_inspect() {
    let h = Harness::new(1);

    let (status, body) = send(h.router(), get("/?url=notalink")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!(2));

    let (_, body) = send(h.router(), get("/?s=abc&a=1&d=2")).await;
    assert_eq!(body["code"], json!(2));
    assert!(h.session.calls().is_empty());
}

#[tokio::test]
async fn zero_owner_fields_are_still_a_valid_link() {
    let h = Harness::new(1);

    let (status, body) = send(h.router(), get("/?s=0&a=1&d=2&m=0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "iteminfo": { "a": "1" } }));
}

#[tokio::test]
async fn no_ready_bots_is_steam_offline() {
    let h = Harness::new(0);

    let (status, body) = send(h.router(), get(&query_link(S_LINK))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body,
        json!({
            "error": "Valve's servers appear to be offline, please try again later",
            "code": 5,
            "status": 503
        })
    );
}

#[tokio::test]
async fn price_needs_the_key_and_a_market_link() {
    let h = Harness::with(
        1,
        Limits::default(),
        Keys {
            price_key: Some(SecretString::from("pk")),
            bulk_key: None,
        },
    );

    let market = query_link(M_LINK);
    send(h.router(), get(&format!("{market}&price=1500&priceKey=pk"))).await;
    send(h.router(), get(&format!("{market}&price=1500&priceKey=wrong"))).await;
    send(h.router(), get(&format!("{market}&price=15x0&priceKey=pk"))).await;
    send(
        h.router(),
        get(&format!("{}&price=1500&priceKey=pk", query_link(S_LINK))),
    )
    .await;

    let prices: Vec<_> = h.session.calls().into_iter().map(|(_, p)| p).collect();
    assert_eq!(prices, vec![Some(1500), None, None, None]);
}

// ---------------------------------------------------------------------------
// POST /bulk
// ---------------------------------------------------------------------------

#[test]
fn oversized_prices_are_dropped() {
    let key = SecretString::from("pk");
    let market = InspectLink::parse(M_LINK);

    assert_eq!(can_submit_price(Some(&key), Some("pk"), &market, Some("1500")), Some(1500));
    assert_eq!(
        can_submit_price(Some(&key), Some("pk"), &market, Some(&u64::MAX.to_string())),
        Some(u64::MAX)
    );
    assert_eq!(
        can_submit_price(Some(&key), Some("pk"), &market, Some("18446744073709551616")),
        None
    );
}

fn bulk_limits() -> Limits {
    Limits {
        max_simultaneous_requests: 3,
        ..Limits::default()
    }
}

#[tokio::test]
async fn bulk_returns_a_map_by_asset_id() {
    let h = Harness::with(1, bulk_limits(), Keys::default());

    let body = json!({ "links": [{ "link": S_LINK }, { "link": M_LINK }] });
    let (status, body) = send(h.router(), post_bulk(body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["698323590"], json!({ "a": "698323590" }));
    assert_eq!(body["6760346663"], json!({ "a": "6760346663" }));
}

#[tokio::test]
async fn bulk_rejects_non_json() {
    let h = Harness::with(1, bulk_limits(), Keys::default());

    let (status, body) = send(h.router(), post_bulk("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!(7));

    let (_, body) = send(h.router(), post_bulk(json!({ "links": "x" }).to_string())).await;
    assert_eq!(body["code"], json!(7));

    let (_, body) = send(h.router(), post_bulk(json!({ "links": [] }).to_string())).await;
    assert_eq!(body["code"], json!(7));
}

#[tokio::test]
async fn bulk_checks_the_secret() {
    let h = Harness::with(
        1,
        bulk_limits(),
        Keys {
            price_key: None,
            bulk_key: Some(SecretString::from("bk")),
        },
    );

    let links = json!([{ "link": S_LINK }]);
    let (status, body) = send(
        h.router(),
        post_bulk(json!({ "links": links, "bulk_key": "nope" }).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!(8));

    let (status, _) = send(
        h.router(),
        post_bulk(json!({ "links": links, "bulk_key": "bk" }).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bulk_over_the_client_limit_is_max_requests() {
    let h = Harness::with(1, bulk_limits(), Keys::default());

    let links: Vec<_> = (1..=4)
        .map(|a| json!({ "link": format!("steam://rungame/730/1/+csgo_econ_action_preview S1A{a}D1") }))
        .collect();
    let (status, body) = send(h.router(), post_bulk(json!({ "links": links }).to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!(3));
}

#[tokio::test]
async fn bulk_with_an_invalid_link_is_invalid_inspect() {
    let h = Harness::with(1, bulk_limits(), Keys::default());

    let body = json!({ "links": [{ "link": S_LINK }, { "link": "bogus" }] });
    let (status, body) = send(h.router(), post_bulk(body.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!(2));
    assert!(h.session.calls().is_empty());
}

#[tokio::test]
async fn bulk_prices_accept_numbers_and_strings() {
    let h = Harness::with(
        1,
        bulk_limits(),
        Keys {
            price_key: Some(SecretString::from("pk")),
            bulk_key: None,
        },
    );

    let body = json!({
        "priceKey": "pk",
        "links": [
            { "link": M_LINK, "price": 250 },
            { "link": M_LINK.replace("A6760346663", "A6760346664"), "price": "300" },
        ],
    });
    let (status, _) = send(h.router(), post_bulk(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);

    let mut calls = h.session.calls();
    calls.sort();
    assert_eq!(
        calls,
        vec![
            ("6760346663".to_string(), Some(250)),
            ("6760346664".to_string(), Some(300)),
        ]
    );
}

// ---------------------------------------------------------------------------
// Stats and share codes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_reports_pool_and_queue() {
    let h = Harness::new(2);

    let (status, body) = send(h.router(), get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "bots_online": 2, "bots_total": 3, "queue_size": 0, "queue_concurrency": 2 })
    );
}

#[tokio::test]
async fn sharecode_is_validated() {
    let h = Harness::new(1);

    let code = "CSGO-ab1cd-EFGH2-3ijkl-MN4op-qrs5T";
    let (status, body) = send(h.router(), get(&format!("/sharecode/{code}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "code": code }));

    let (status, body) = send(h.router(), get("/sharecode/CSGO-abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid share code" }));
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_echoes_allowed_origins_only() {
    let h = Harness::new(1);
    let options = HttpOptions {
        allowed_origins: vec!["https://exact.example".to_string()],
        allowed_regex_origins: vec![Regex::new(r"^https://.*\.pattern\.example$").unwrap()],
        ..HttpOptions::default()
    };

    for origin in ["https://exact.example", "https://a.pattern.example"] {
        let request = Request::get("/stats")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap();
        let response = build_router(h.state.clone(), &options)
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            origin
        );
    }

    let request = Request::get("/stats")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = build_router(h.state.clone(), &options)
        .oneshot(request)
        .await
        .unwrap();
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[tokio::test]
async fn rate_limited_requests_get_the_failure_body() {
    let h = Harness::new(1);
    let options = HttpOptions {
        trust_proxy: true,
        rate_limit: Some(RateLimitConfig {
            enable: true,
            window_ms: 60_000,
            max: 1,
        }),
        ..HttpOptions::default()
    };
    let router = build_router(h.state.clone(), &options);

    let request = || {
        Request::get("/stats")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(router.clone(), request()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(router, request()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], json!(10));
}

#[tokio::test]
async fn forwarded_client_ip_is_used_for_limits_when_trusted() {
    let h = Harness::with(
        1,
        Limits {
            max_simultaneous_requests: 1,
            ..Limits::default()
        },
        Keys::default(),
    );
    h.state.service.queue().pause();
    let options = HttpOptions {
        trust_proxy: true,
        ..HttpOptions::default()
    };

    let request = |ip: &str| {
        Request::get(query_link(S_LINK))
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    // Parks in the paused queue.
    let parked = tokio::spawn(build_router(h.state.clone(), &options).oneshot(request("198.51.100.1")));
    wait_for_queue_size(&h, 1).await;

    let (status, body) = send(build_router(h.state.clone(), &options), request("198.51.100.1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!(3));

    // A different forwarded address is a different client.
    let other = tokio::spawn(build_router(h.state.clone(), &options).oneshot(request("198.51.100.2")));
    wait_for_queue_size(&h, 2).await;

    h.state.service.queue().start();
    for task in [parked, other] {
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

async fn wait_for_queue_size(h: &Harness, size: usize) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while h.state.service.queue().size() < size {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request never reached the queue");
}
