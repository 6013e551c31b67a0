//! Admin API: pipeline kicks and server management.
//!
//! Pipeline operations run on background tasks; overlapping requests are
//! coalesced by the phase latches inside the services.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use roomsearch_core::SanitizedConfig;

use crate::state::AppState;

pub async fn discover(State(state): State<Arc<AppState>>) -> StatusCode {
    let facade = state.facade().clone();
    let workers = state.config().workers.discovery;
    tokio::spawn(async move {
        facade.discover_servers(workers).await;
    });
    StatusCode::ACCEPTED
}

pub async fn parse(State(state): State<Arc<AppState>>) -> StatusCode {
    let facade = state.facade().clone();
    let workers = state.config().workers.parsing;
    tokio::spawn(async move {
        facade.parse_rooms(workers).await;
    });
    StatusCode::ACCEPTED
}

pub async fn reindex(State(state): State<Arc<AppState>>) -> StatusCode {
    let facade = state.facade().clone();
    tokio::spawn(async move {
        facade.reindex().await;
    });
    StatusCode::ACCEPTED
}

pub async fn full(State(state): State<Arc<AppState>>) -> StatusCode {
    let facade = state.facade().clone();
    let discovery = state.config().workers.discovery;
    let parsing = state.config().workers.parsing;
    tokio::spawn(async move {
        facade.full(discovery, parsing).await;
    });
    StatusCode::ACCEPTED
}

pub async fn servers(State(state): State<Arc<AppState>>) -> Json<HashMap<String, String>> {
    Json(state.crawler().all_servers())
}

pub async fn config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

#[derive(Deserialize)]
pub struct AddServersRequest {
    pub servers: Vec<String>,
}

pub async fn add_servers(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddServersRequest>,
) -> StatusCode {
    let crawler = state.crawler().clone();
    let workers = state.config().workers.discovery;
    tokio::spawn(async move {
        crawler.add_servers(request.servers, workers).await;
    });
    StatusCode::ACCEPTED
}
