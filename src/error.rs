//! Error types for the proxy.
//!
//! Every failure a handler can hit is a [`ProxyError`]. Each variant knows the
//! HTTP status, envelope `type` and `code` it maps to, so handlers simply
//! return `Result<_, ProxyError>` and the envelope is built in one place.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::translate::openai_types::ErrorResponse;
use crate::translate::request::ValidationError;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid request body: {message}")]
    InvalidBody { message: String },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("Not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The upstream answered with a non-2xx status.
    #[error("Upstream API error: {body}")]
    Upstream { status: u16, body: String },

    /// The upstream answered 2xx but the body is neither JSON nor a usable event stream.
    #[error("Upstream response format error: {snippet}...")]
    UpstreamFormat { snippet: String },

    #[error("Upstream request timed out: {0}")]
    Timeout(reqwest::Error),

    #[error("Request processing error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_body(msg: impl Into<String>) -> Self {
        Self::InvalidBody {
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: msg.into(),
        }
    }

    /// Classify a transport error: timeouts belong to the upstream category.
    pub fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Http(err)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `type` field of the error envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidBody { .. } | Self::Unauthorized { .. } => {
                "invalid_request_error"
            }
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Upstream { .. } | Self::UpstreamFormat { .. } | Self::Timeout(_) => "api_error",
            _ => "internal_server_error",
        }
    }

    /// The `code` field of the error envelope.
    pub fn code(&self) -> serde_json::Value {
        match self {
            Self::Unauthorized { .. } => serde_json::Value::from("invalid_api_key"),
            Self::Upstream { status, .. } => serde_json::Value::from(*status),
            _ => serde_json::Value::Null,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.to_string(), self.error_type(), self.code())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(self.to_error_response())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_unauthorized_envelope() {
        let err = ProxyError::unauthorized("Invalid API key.");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let body = serde_json::to_value(err.to_error_response()).unwrap();
        assert_eq!(body["error"]["message"], "Invalid API key.");
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], "invalid_api_key");
    }

    #[test]
    fn test_upstream_status_propagates() {
        let err = ProxyError::Upstream {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_type(), "api_error");
        assert_eq!(err.code(), serde_json::json!(429));
        assert_eq!(err.to_string(), "Upstream API error: slow down");
    }

    #[test]
    fn test_bogus_upstream_status_falls_back_to_500() {
        let err = ProxyError::Upstream {
            status: 42,
            body: String::new(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_maps_to_400() {
        let err: ProxyError = ValidationError::MissingField.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_type(), "invalid_request_error");
        assert_eq!(err.code(), serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_into_response_writes_envelope() {
        let response = ProxyError::MethodNotAllowed.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "method_not_allowed");
        assert_eq!(json["error"]["message"], "Method not allowed");
        assert!(json["error"]["code"].is_null());
    }
}
