use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use actix_web_actors::ws::HandshakeError;
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WsError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        error_body(self.status_code(), self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::WebSocketError(e) => e.status_code(),
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors raised by the upgrade adapter and by socket reads/writes.
#[derive(Error, Debug)]
pub enum WsError {
    #[error("websocket: bad handshake: {0}")]
    BadHandshake(#[from] HandshakeError),

    #[error("websocket: origin not allowed: {0}")]
    OriginNotAllowed(String),

    #[error("websocket: request rejected by filter")]
    Filtered,

    #[error("websocket: upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("websocket: close sent")]
    CloseSent,

    #[error("websocket: read limit exceeded")]
    ReadLimit,

    #[error("websocket: close {code}: {reason}")]
    Closed { code: u16, reason: String },

    #[error("websocket: connection closed")]
    ConnectionClosed,

    #[error("websocket: connection is not attached")]
    NotAttached,

    #[error("websocket: protocol error: {0}")]
    Protocol(String),

    #[error("websocket: invalid UTF-8 in text message")]
    InvalidUtf8,

    #[error("websocket: invalid close payload")]
    InvalidClosePayload,
}

impl ResponseError for WsError {
    fn error_response(&self) -> HttpResponse {
        error_body(self.status_code(), self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WsError::BadHandshake(HandshakeError::GetMethodRequired) => StatusCode::METHOD_NOT_ALLOWED,
            WsError::BadHandshake(_) => StatusCode::BAD_REQUEST,
            WsError::OriginNotAllowed(_) | WsError::Filtered => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn error_body(status: StatusCode, message: String) -> HttpResponse {
    let response = json!({
        "error": {
            "status": status.as_u16(),
            "message": message
        }
    });
    HttpResponse::build(status).json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let app_err: AppError = WsError::ReadLimit.into();
        assert!(matches!(app_err, AppError::WebSocketError(WsError::ReadLimit)));
    }

    #[test]
    fn test_error_status_codes() {
        let err = WsError::BadHandshake(HandshakeError::NoWebsocketUpgrade);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = WsError::BadHandshake(HandshakeError::GetMethodRequired);
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);

        let err = WsError::OriginNotAllowed("https://evil.example".to_string());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = AppError::WebSocketError(WsError::Filtered);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = AppError::ConfigError("missing".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(WsError::CloseSent.to_string(), "websocket: close sent");
        assert_eq!(WsError::ReadLimit.to_string(), "websocket: read limit exceeded");

        let err = WsError::Closed { code: 1000, reason: "bye".to_string() };
        assert_eq!(err.to_string(), "websocket: close 1000: bye");

        let err = AppError::ConfigError("bad port".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad port");
    }
}
