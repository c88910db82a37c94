use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// External AI generation service reachable over HTTP.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    /// Bearer credential, if one is configured.
    pub fn bearer_token(&self) -> Option<&str> {
        let key = self.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("is_active", &self.is_active)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Image,
    Video,
}

impl Display for ModelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ModelKind::Image => write!(f, "image"),
            ModelKind::Video => write!(f, "video"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(ModelKind::Image),
            "video" => Ok(ModelKind::Video),
            _ => Err(anyhow::anyhow!("Invalid model kind: {}", s)),
        }
    }
}

/// A generation capability offered by a provider, with its own request shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AiModel {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub kind: ModelKind,
    /// Path relative to the provider base URL.
    pub api_endpoint: String,
    pub request_template: serde_json::Value,
    /// UI tunables. Opaque to generation.
    pub parameters_schema: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiModel {
    /// Submission URL for this model on `provider`.
    pub fn full_url(&self, provider: &Provider) -> String {
        join_url(&provider.base_url, &self.api_endpoint)
    }
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base, path)
}

/// A model resolved together with its owning provider.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub model: AiModel,
    pub provider: Provider,
}

impl ResolvedModel {
    pub fn is_active(&self) -> bool {
        self.model.is_active && self.provider.is_active
    }

    pub fn submit_url(&self) -> String {
        self.model.full_url(&self.provider)
    }
}

/// Catalog document used to seed providers and models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSeed {
    pub providers: Vec<ProviderSeed>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSeed {
    pub name: String,
    pub base_url: String,
    /// Environment variable holding the credential. Literal keys are never stored in catalogs.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub models: Vec<ModelSeed>,
}

impl fmt::Debug for ProviderSeed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSeed")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key_env", &self.api_key_env)
            .field("models", &self.models.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSeed {
    pub name: String,
    pub kind: ModelKind,
    pub api_endpoint: String,
    pub request_template: serde_json::Value,
    #[serde(default = "empty_object")]
    pub parameters_schema: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str, api_key: &str) -> Provider {
        let now = Utc::now();
        Provider {
            id: Uuid::new_v4(),
            name: "Kie.ai".to_string(),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn model(endpoint: &str) -> AiModel {
        let now = Utc::now();
        AiModel {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            name: "Nano Banana".to_string(),
            kind: ModelKind::Image,
            api_endpoint: endpoint.to_string(),
            request_template: serde_json::json!({}),
            parameters_schema: serde_json::json!({}),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_full_url_uses_exactly_one_slash() {
        let cases = [
            ("https://api.kie.ai", "/api/v1/jobs/createTask"),
            ("https://api.kie.ai/", "/api/v1/jobs/createTask"),
            ("https://api.kie.ai/", "api/v1/jobs/createTask"),
            ("https://api.kie.ai", "api/v1/jobs/createTask"),
        ];
        for (base, endpoint) in cases {
            assert_eq!(
                model(endpoint).full_url(&provider(base, "")),
                "https://api.kie.ai/api/v1/jobs/createTask"
            );
        }
    }

    #[test]
    fn test_bearer_token_only_when_present() {
        assert_eq!(provider("https://x", "").bearer_token(), None);
        assert_eq!(provider("https://x", "  ").bearer_token(), None);
        assert_eq!(provider("https://x", "sk-1").bearer_token(), Some("sk-1"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let debug = format!("{:?}", provider("https://x", "sk-secret"));
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_catalog_seed_defaults() {
        let seed: CatalogSeed = serde_json::from_value(serde_json::json!({
            "providers": [{
                "name": "Kie.ai",
                "base_url": "https://api.kie.ai",
                "models": [{
                    "name": "Nano Banana",
                    "kind": "image",
                    "api_endpoint": "/api/v1/jobs/createTask",
                    "request_template": {"prompt": "{{prompt}}"}
                }]
            }]
        }))
        .unwrap();
        let provider = &seed.providers[0];
        assert!(provider.is_active);
        assert_eq!(provider.api_key_env, None);
        assert!(provider.models[0].is_active);
        assert_eq!(provider.models[0].parameters_schema, serde_json::json!({}));
    }
}
