//! Cache header and admin authentication middleware.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::sync::Arc;

use roomsearch_core::Cache;

use crate::state::AppState;

/// Cache policy on GET responses: non-cacheable paths get `no-cache`,
/// everything else is tagged mutable with `Last-Modified` pinned to the
/// last indexing finish. A matching `If-Modified-Since` short-circuits
/// with 304.
pub async fn cache_headers(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != axum::http::Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    if Cache::is_noncacheable(&path) {
        let mut response = next.run(request).await;
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        return response;
    }

    let last_modified = state.cache().last_modified();
    if let Some(ref last_modified) = last_modified {
        let if_modified_since = request
            .headers()
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|value| value.to_str().ok());
        if if_modified_since == Some(last_modified.as_str()) {
            return StatusCode::NOT_MODIFIED.into_response();
        }
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) =
        HeaderValue::from_str(&format!("max-age={}, public", state.cache().max_age()))
    {
        headers.insert(header::CACHE_CONTROL, value);
    }
    headers.insert("CDN-Tag", HeaderValue::from_static("mutable"));
    if let Some(last_modified) = last_modified {
        if let Ok(value) = HeaderValue::from_str(&last_modified) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
    response
}

/// Basic auth plus the optional IP allowlist for the `/-` admin prefix.
pub async fn admin_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let admin = &state.config().admin;

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .and_then(|credentials| {
            credentials
                .split_once(':')
                .map(|(login, password)| login == admin.login && password == admin.password)
        })
        .unwrap_or(false);
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }

    if !admin.ips.is_empty() {
        let ip = client_ip(&request);
        if !admin.ips.iter().any(|allowed| *allowed == ip) {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    Ok(next.run(request).await)
}

/// First X-Forwarded-For entry when present, otherwise the peer address.
fn client_ip(request: &Request<Body>) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_default()
}
