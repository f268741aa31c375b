//! Validate an inbound chat-completion request and build the upstream body.
//!
//! Only `model`, `messages` and the four recognized optional fields are
//! carried over. An optional field appears upstream exactly when the client
//! sent it.

use thiserror::Error;

use super::openai_types::{ChatRequest, UpstreamRequest};
use crate::config::ModelNaming;
use crate::models::ModelRegistry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameters: model and messages")]
    MissingField,

    #[error("Model '{model}' not found. Available models: {available}")]
    UnknownModel { model: String, available: String },
}

/// Translate a client request into the upstream request body.
/// Pure function: no I/O, reads only the request and the registry.
pub fn chat_to_upstream(
    req: &ChatRequest,
    registry: &ModelRegistry,
    naming: ModelNaming,
) -> Result<UpstreamRequest, ValidationError> {
    let (Some(model), Some(messages)) = (
        req.model.as_deref().filter(|m| !m.is_empty()),
        req.messages.as_ref(),
    ) else {
        return Err(ValidationError::MissingField);
    };

    let Some(upstream_model) = registry.resolve(model) else {
        return Err(ValidationError::UnknownModel {
            model: model.to_string(),
            available: registry.known_ids().collect::<Vec<_>>().join(", "),
        });
    };

    tracing::debug!(model, upstream_model, ?naming, "resolved model");

    let forwarded_model = match naming {
        ModelNaming::Public => model,
        ModelNaming::Upstream => upstream_model,
    };

    Ok(UpstreamRequest {
        model: forwarded_model.to_string(),
        messages: messages.clone(),
        temperature: req.temperature.clone(),
        max_tokens: req.max_tokens.clone(),
        top_p: req.top_p.clone(),
        stream: req.stream,
    })
}
