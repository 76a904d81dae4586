//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the parsed configuration and the connection registry, which in
//! turn owns every live room. Nothing here is persisted: restarting the
//! process discards all canvases.

use std::sync::Arc;

use crate::config::Config;
use crate::frame::Limits;
use crate::services::registry::Registry;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry = Registry::new(config.default_room.clone(), config.room_queue_capacity);
        Self { config: Arc::new(config), registry: Arc::new(registry) }
    }

    /// Decoder limits derived from config.
    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits { max_points: self.config.max_stroke_points, relay_ephemeral: self.config.relay_ephemeral }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_state_has_no_rooms_or_connections() {
        let state = AppState::new(Config::default());
        assert_eq!(state.registry.room_count().await, 0);
        assert_eq!(state.registry.connection_count().await, 0);
    }

    #[test]
    fn limits_follow_config() {
        let config = Config { max_stroke_points: 12, relay_ephemeral: true, ..Config::default() };
        let limits = AppState::new(config).limits();
        assert_eq!(limits.max_points, 12);
        assert!(limits.relay_ephemeral);
    }
}
