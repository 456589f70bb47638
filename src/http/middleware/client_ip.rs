use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

/// Extension key for the client identity used in admission limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Middleware to extract the client IP address from the request.
///
/// With `trust_proxy` set, the first `X-Forwarded-For` entry or
/// `X-Real-IP` wins; otherwise only the socket address is used.
pub async fn extract_client_ip(
    State(trust_proxy): State<bool>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let forwarded = if trust_proxy {
        forwarded_ip(&request)
    } else {
        None
    };

    let ip = forwarded
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip()))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

fn forwarded_ip(request: &Request) -> Option<IpAddr> {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        // Comma-separated list, take first
        forwarded
            .to_str()
            .ok()
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    } else {
        request
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    }
}
