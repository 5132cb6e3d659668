use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use notes_hub_core::analytics::{AccessObserver, AccessRecordInput};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::user_agent;

/// Prefix of the requests worth recording.
const RECORDED_PREFIX: &str = "/api/notes";

/// Never recorded, even under the recorded prefix.
const EXCLUDED_PREFIXES: &[&str] = &["/api/admin/", "/docs", "/openapi.json", "/health", "/favicon.ico"];

const VISITOR_HEADER: &str = "x-visitor-id";
const VISITOR_COOKIE: &str = "visitor_id";

pub fn should_record(path: &str) -> bool {
    let under_prefix = path
        .strip_prefix(RECORDED_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
    under_prefix && !EXCLUDED_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded
        .or_else(real_ip)
        .map(String::from)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Opaque client id from the `X-Visitor-Id` header or the `visitor_id` cookie.
pub fn visitor_id(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(VISITOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);
    from_header.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == VISITOR_COOKIE && !value.is_empty())
            .map(|(_, value)| value.to_string())
    })
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Times qualifying requests and hands them to the observer once the response
/// is ready. The write happens on a detached task and never touches the
/// response.
pub async fn record_access(
    State(observer): State<Arc<dyn AccessObserver>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !should_record(&path) {
        return next.run(request).await;
    }

    let started = Instant::now();
    let method = request.method().to_string();
    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip_address = client_ip(headers, peer);
    let visitor_id = visitor_id(headers);
    let user_agent = header_text(headers, header::USER_AGENT);
    let referer = header_text(headers, header::REFERER);

    let response = next.run(request).await;

    let ua = user_agent::classify(&user_agent);
    let input = AccessRecordInput {
        ip_address,
        visitor_id,
        path,
        method,
        status_code: response.status().as_u16(),
        response_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        referer,
        device_type: ua.device_type.to_string(),
        os: ua.os.to_string(),
        browser: ua.browser.to_string(),
        user_agent,
        created_at: None,
    };
    tokio::spawn(async move { observer.record_access(input).await });

    response
}
