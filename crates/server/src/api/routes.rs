use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::{admin, handlers, middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/discover", post(admin::discover))
        .route("/parse", post(admin::parse))
        .route("/reindex", post(admin::reindex))
        .route("/full", post(admin::full))
        .route("/servers", get(admin::servers))
        .route("/servers", post(admin::add_servers))
        .route("/config", get(admin::config))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth,
        ));

    Router::new()
        // public API
        .route("/stats", get(handlers::stats))
        .route("/search", get(handlers::search))
        .route("/_health", get(handlers::health))
        .route("/avatar/{server}/{media_id}", get(handlers::avatar))
        .route("/metrics", get(handlers::metrics))
        // admin API
        .nest("/-", admin_routes)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::cache_headers,
        ))
        .with_state(state)
}
