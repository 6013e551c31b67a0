use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use roomsearch_core::Entry;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub servers: u64,
    pub rooms: u64,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.stats().get();
    Json(StatsResponse {
        servers: stats.servers.online,
        rooms: stats.rooms.indexed,
    })
}

fn default_limit() -> usize {
    10
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Comma-separated sort vector, e.g. `-members`.
    #[serde(default)]
    pub sort_by: String,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<Entry>> {
    let sort_by: Vec<String> = params
        .sort_by
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();

    match state
        .search()
        .search(&params.q, params.limit, params.offset, &sort_by)
    {
        Ok(entries) => Json(entries),
        Err(e) => {
            error!(query = params.q.as_str(), error = %e, "search failed");
            Json(Vec::new())
        }
    }
}

pub async fn avatar(
    State(state): State<Arc<AppState>>,
    Path((server, media_id)): Path<(String, String)>,
) -> Response {
    match state.crawler().get_avatar(&server, &media_id).await {
        Some((body, content_type)) => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn metrics() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(),
    )
        .into_response()
}
