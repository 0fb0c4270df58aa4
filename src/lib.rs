pub mod config;
pub mod error;
pub mod handlers;
pub mod websocket;

use std::sync::Arc;
use actix_web::{web, HttpResponse};

pub use error::{AppError, WsError};
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use websocket::{Config, Conn, ConnPool, PooledConn, Upgrader};

/// Health check endpoint handler
/// Returns a JSON response with server status, timestamp and wrapper pool usage
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": state.pool.stats(),
    }))
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub pool: Arc<ConnPool>,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        let pool = match config.websocket.max_idle {
            Some(max_idle) => ConnPool::bounded(max_idle),
            None => ConnPool::new(),
        };

        Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
        }
    }

    /// Upgrade configuration derived from the `websocket` settings section
    pub fn websocket_config(&self) -> Config {
        Config::from(&self.config.websocket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_creation() {
        let config = Settings::from_env("wsupgrade_state").expect("Failed to load test config");
        let state = AppState::new(config);

        assert_eq!(state.pool.stats().created, 0);
        assert_eq!(state.websocket_config().origins, vec!["*".to_string()]);
    }
}
