//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Two surfaces: the persistent websocket channel at `/ws/{client_id}`
//! (or `/ws` for a server-assigned id, with `?room=` naming a room), and
//! a readiness probe at `/health` that clients poll before connecting.

pub mod ws;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub connections: usize,
    pub rooms: usize,
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/ws/{client_id}", get(ws::handle_ws_with_id))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        connections: state.registry.connection_count().await,
        rooms: state.registry.room_count().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn health_reports_live_counts() {
        let state = AppState::new(Config::default());
        let Json(empty) = health(State(state.clone())).await;
        assert_eq!(empty.status, "ok");
        assert_eq!(empty.connections, 0);
        assert_eq!(empty.rooms, 0);

        let (tx, _rx) = mpsc::channel(8);
        state.registry.admit(Some("a"), None, tx).await.expect("admit");

        let Json(report) = health(State(state)).await;
        assert_eq!(report.connections, 1);
        assert_eq!(report.rooms, 1);
        assert_eq!(
            serde_json::to_value(&report).expect("serialize"),
            serde_json::json!({"status": "ok", "connections": 1, "rooms": 1})
        );
    }
}
