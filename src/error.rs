use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error;

use crate::constants;

/// Service-wide error type. Handlers return it with `?`; the
/// `ResponseError` impl maps each kind onto the admin/connect HTTP surface.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration could not be loaded or validated. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A callback request failed at the transport level.
    #[error("callback is not available: {0}")]
    CallbackTransport(String),

    /// A callback answered with a non-successful status.
    #[error("callback response is not OK: {status}")]
    CallbackResponseNotOk { status: StatusCode },

    /// The request carried no session key header.
    #[error("session key is missing")]
    SessionKeyMissing,

    /// No session is registered under the given key.
    #[error("session is not found: {0}")]
    SessionNotFound(String),

    /// The per-request deadline elapsed before the message could be queued.
    #[error("timeout to send to session: {0}")]
    EnqueueTimeout(String),

    /// The target session had already transitioned to closed.
    #[error("session is already closed: {0}")]
    SessionClosed(String),

    /// The Origin header failed the configured origin policy.
    #[error("origin is not allowed")]
    OriginForbidden,

    /// Session-key generation failed.
    #[error("cannot generate session key: {0}")]
    KeyGen(String),
}

impl GatewayError {
    /// The key of the session this error is about, for per-session error
    /// entries in dispatch responses.
    pub fn session_key(&self) -> Option<&str> {
        match self {
            GatewayError::SessionNotFound(key)
            | GatewayError::EnqueueTimeout(key)
            | GatewayError::SessionClosed(key) => Some(key),
            _ => None,
        }
    }
}

impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Config(_) | GatewayError::KeyGen(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::CallbackTransport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::CallbackResponseNotOk { status } => *status,
            GatewayError::SessionKeyMissing => StatusCode::BAD_REQUEST,
            GatewayError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::EnqueueTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::SessionClosed(_) => StatusCode::GONE,
            GatewayError::OriginForbidden => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
            "result": constants::RESULT_NG,
        }))
    }
}
