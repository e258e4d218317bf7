//! Research services and the AI models they offer.
//!
//! The catalog backs the job form: it lists the services a user may pick,
//! the models each service exposes, the model's default parameters (used to
//! seed the parameter pairs) and its prompt token budget.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An AI model as configured on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiModel {
    pub id: i64,
    pub model_key: String,
    #[serde(default)]
    pub default_params: Map<String, Value>,
    pub max_tokens: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_true() -> bool {
    true
}

impl AiModel {
    /// Default parameters rendered as editable key/value text pairs.
    ///
    /// Strings are shown verbatim, everything else as JSON text, so the pairs
    /// coerce back to the same values through
    /// [`coerce_param_value`](crate::request::coerce_param_value).
    pub fn default_param_pairs(&self) -> Vec<(String, String)> {
        self.default_params
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect()
    }

    /// Whether `prompt` is estimated to exceed this model's token budget.
    pub fn exceeds_token_budget(&self, prompt: &str) -> bool {
        self.max_tokens > 0 && estimate_prompt_tokens(prompt) > self.max_tokens as usize
    }
}

/// Link between a service and one of its models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceModel {
    pub id: i64,
    pub service_id: i64,
    pub model_id: i64,
    #[serde(default)]
    pub is_default: bool,
    pub model: AiModel,
}

/// A research service (e.g. `open-dr`) and its models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchService {
    pub id: i64,
    pub service_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<AiModel>,
    #[serde(default)]
    pub service_models: Vec<ServiceModel>,
}

impl ResearchService {
    /// Active models offered by this service.
    pub fn models(&self) -> impl Iterator<Item = &AiModel> {
        self.service_models
            .iter()
            .map(|sm| &sm.model)
            .filter(|model| model.is_active)
    }

    pub fn model(&self, model_key: &str) -> Option<&AiModel> {
        self.models().find(|model| model.model_key == model_key)
    }

    /// The model to preselect: the flagged default, else the first active.
    pub fn preferred_model(&self) -> Option<&AiModel> {
        self.service_models
            .iter()
            .find(|sm| sm.is_default && sm.model.is_active)
            .map(|sm| &sm.model)
            .or_else(|| self.default_model.as_ref().filter(|m| m.is_active))
            .or_else(|| self.models().next())
    }
}

/// Services indexed by key.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    services: Vec<ResearchService>,
    by_key: FxHashMap<String, usize>,
}

impl ServiceCatalog {
    pub fn new(services: Vec<ResearchService>) -> Self {
        let by_key = services
            .iter()
            .enumerate()
            .map(|(index, service)| (service.service_key.clone(), index))
            .collect();
        Self { services, by_key }
    }

    pub fn services(&self) -> &[ResearchService] {
        &self.services
    }

    pub fn service(&self, service_key: &str) -> Option<&ResearchService> {
        self.by_key.get(service_key).map(|&index| &self.services[index])
    }

    pub fn model(&self, service_key: &str, model_key: &str) -> Option<&AiModel> {
        self.service(service_key)?.model(model_key)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Rough prompt token count: one token per four characters, rounded up.
pub fn estimate_prompt_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::params_from_pairs;
    use serde_json::json;

    fn catalog() -> ServiceCatalog {
        let services: Vec<ResearchService> = serde_json::from_value(json!([
            {
                "id": 1,
                "service_key": "open-dr",
                "name": "Open Deep Research",
                "service_models": [
                    {
                        "id": 10, "service_id": 1, "model_id": 100, "is_default": false,
                        "model": {
                            "id": 100, "model_key": "o3-mini", "max_tokens": 8,
                            "default_params": {"temperature": 0.2, "style": "brief", "tools": ["web"]}
                        }
                    },
                    {
                        "id": 11, "service_id": 1, "model_id": 101, "is_default": true,
                        "model": {"id": 101, "model_key": "gpt-4o", "max_tokens": 0, "is_active": true}
                    },
                    {
                        "id": 12, "service_id": 1, "model_id": 102,
                        "model": {"id": 102, "model_key": "retired", "max_tokens": 0, "is_active": false}
                    }
                ]
            }
        ]))
        .unwrap();
        ServiceCatalog::new(services)
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = catalog();
        assert!(catalog.service("missing").is_none());
        assert!(catalog.model("open-dr", "o3-mini").is_some());
        assert!(catalog.model("open-dr", "retired").is_none());
        let service = catalog.service("open-dr").unwrap();
        assert_eq!(service.models().count(), 2);
        assert_eq!(service.preferred_model().unwrap().model_key, "gpt-4o");
    }

    #[test]
    fn test_default_param_pairs_round_trip_through_coercion() {
        let catalog = catalog();
        let model = catalog.model("open-dr", "o3-mini").unwrap();
        let pairs = model.default_param_pairs();
        assert!(pairs.contains(&("style".to_string(), "brief".to_string())));
        assert_eq!(params_from_pairs(pairs), model.default_params);
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_prompt_tokens(""), 0);
        assert_eq!(estimate_prompt_tokens("abcd"), 1);
        assert_eq!(estimate_prompt_tokens("abcde"), 2);
        let catalog = catalog();
        let model = catalog.model("open-dr", "o3-mini").unwrap();
        assert!(!model.exceeds_token_budget("short prompt"));
        assert!(model.exceeds_token_budget(&"x".repeat(33)));
        let unlimited = catalog.model("open-dr", "gpt-4o").unwrap();
        assert!(!unlimited.exceeds_token_budget(&"x".repeat(10_000)));
    }
}
