use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::models::ModelRegistry;
use crate::proxy;
use crate::translate::openai_types::{ChatRequest, ModelList};
use crate::translate::request::chat_to_upstream;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(86_400);

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub registry: Arc<ModelRegistry>,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let client = proxy::build_client(&config.upstream)?;
        Ok(Self {
            config,
            registry: Arc::new(ModelRegistry::new()),
            client,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // Every OPTIONS request is answered here as a preflight, before auth and routing.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(PREFLIGHT_MAX_AGE);

    Router::new()
        .route(
            "/v1/chat/completions",
            post(handle_chat_completions).fallback(method_not_allowed),
        )
        .route("/v1/models", get(handle_models).fallback(method_not_allowed))
        .route("/health", get(handle_health).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject `/v1/*` requests without a configured bearer key. No-op when no
/// keys are configured.
async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if !req.uri().path().starts_with("/v1/") || !state.config.auth_enabled() {
        return next.run(req).await;
    }

    match check_bearer(req.headers(), &state.config.api_keys) {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// Validate `Authorization: Bearer <key>` against the configured keys.
pub fn check_bearer(headers: &HeaderMap, keys: &[String]) -> Result<()> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Err(ProxyError::unauthorized(
            "Missing Authorization header. Please provide an API key in the format: \
             Authorization: Bearer YOUR_API_KEY",
        ));
    };

    let Some(token) = value.to_str().ok().and_then(bearer_token) else {
        return Err(ProxyError::unauthorized(
            "Invalid Authorization header format. Expected: Authorization: Bearer YOUR_API_KEY",
        ));
    };

    if keys.iter().any(|k| k == token) {
        Ok(())
    } else {
        Err(ProxyError::unauthorized(
            "Invalid API key. Please check your API key and try again.",
        ))
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(char::is_whitespace)?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response> {
    let req: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::invalid_body(e.to_string()))?;

    let upstream_req = chat_to_upstream(&req, &state.registry, state.config.upstream.model_naming)?;
    let model = req.model.clone().unwrap_or_default();
    let is_streaming = req.is_streaming();

    tracing::info!(
        model = %model,
        streaming = is_streaming,
        messages = upstream_req.messages.len(),
        "chat completion request"
    );

    if is_streaming {
        let frames =
            proxy::proxy_streaming(&upstream_req, &model, &state.config.upstream, &state.client)
                .await?;

        let events = frames.map(|result| result.map(|frame| Event::default().data(frame.data())));

        Ok(Sse::new(events).into_response())
    } else {
        let completion =
            proxy::proxy_non_streaming(&upstream_req, &model, &state.config.upstream, &state.client)
                .await?;

        Ok(Json(completion).into_response())
    }
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(state.registry.model_list())
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn method_not_allowed() -> ProxyError {
    ProxyError::MethodNotAllowed
}

async fn not_found() -> ProxyError {
    ProxyError::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(v) = auth {
            map.insert(AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    fn keys() -> Vec<String> {
        vec!["k1".to_string(), "k2".to_string()]
    }

    #[test]
    fn test_any_configured_key_is_accepted() {
        assert!(check_bearer(&headers(Some("Bearer k1")), &keys()).is_ok());
        assert!(check_bearer(&headers(Some("Bearer k2")), &keys()).is_ok());
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert!(check_bearer(&headers(Some("bearer k2")), &keys()).is_ok());
        assert!(check_bearer(&headers(Some("BEARER   k1")), &keys()).is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let err = check_bearer(&headers(Some("Bearer k3")), &keys()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid API key"));
    }

    #[test]
    fn test_missing_header_rejected() {
        let err = check_bearer(&headers(None), &keys()).unwrap_err();
        assert!(err.to_string().starts_with("Missing Authorization header"));
    }

    #[test]
    fn test_malformed_header_rejected() {
        for value in ["k1", "Bearer", "Bearer   ", "Basic k1"] {
            let err = check_bearer(&headers(Some(value)), &keys()).unwrap_err();
            assert!(
                err.to_string().starts_with("Invalid Authorization header format"),
                "value {value:?} gave {err}"
            );
        }
    }
}
