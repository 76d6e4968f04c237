//! API routes

pub mod chats;
pub mod health;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    state::AppState,
    websocket::{agent_ws_handler, client_ws_handler},
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let api_v1_routes = Router::new()
        .route("/chats/history", get(chats::history))
        .route("/chats/unassigned", get(chats::unassigned))
        .route("/chats/assigned", get(chats::assigned));

    let websocket_routes = Router::new()
        .route("/ws/agent", get(agent_ws_handler))
        .route("/ws/client", get(client_ws_handler));

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
