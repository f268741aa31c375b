//! The model registry: which public model ids this proxy accepts, what the
//! upstream calls them, and what `/v1/models` advertises.
//!
//! The registry is built once at startup and shared read-only through the
//! application state.

use crate::translate::openai_types::{ModelDescriptor, ModelList};

/// Creation timestamp reported for every advertised model (2024-01-01T00:00:00Z).
pub const MODEL_CREATED: i64 = 1_704_067_200;

const OWNED_BY: &str = "deepseek";

/// Public id → upstream id, in the order they are reported back to clients.
const MODEL_MAPPING: &[(&str, &str)] = &[
    ("deepseek-reasoner", "DeepSeek-R1"),
    ("deepseek-chat", "DeepSeek-V3"),
];

/// Advertised listing. Kept apart from the mapping so an upstream-only alias
/// can be added to the table without showing up in `/v1/models`.
const ADVERTISED: &[&str] = &["deepseek-reasoner", "deepseek-chat"];

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    mapping: Vec<(String, String)>,
    advertised: Vec<ModelDescriptor>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mapping: MODEL_MAPPING
                .iter()
                .map(|(public, upstream)| ((*public).to_string(), (*upstream).to_string()))
                .collect(),
            advertised: ADVERTISED
                .iter()
                .map(|id| ModelDescriptor::new(id, OWNED_BY, MODEL_CREATED))
                .collect(),
        }
    }

    /// Look up the upstream id for a public model id. Exact match only.
    #[must_use]
    pub fn resolve(&self, public_id: &str) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(public, _)| public == public_id)
            .map(|(_, upstream)| upstream.as_str())
    }

    /// Public ids in table order.
    pub fn known_ids(&self) -> impl Iterator<Item = &str> {
        self.mapping.iter().map(|(public, _)| public.as_str())
    }

    #[must_use]
    pub fn list_advertised(&self) -> &[ModelDescriptor] {
        &self.advertised
    }

    /// The `/v1/models` response body.
    #[must_use]
    pub fn model_list(&self) -> ModelList {
        ModelList {
            object: "list".to_string(),
            data: self.list_advertised().to_vec(),
        }
    }
}
