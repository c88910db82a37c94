//! Provider/model registry.
//!
//! Read-only from the point of view of generation: consulted at dispatch time, never
//! used to mutate asset state.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AiModel, ModelKind, Provider, ResolvedModel};

#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Active models of active providers, ordered by provider name then model name.
    async fn active_models(&self, kind: Option<ModelKind>) -> Result<Vec<ResolvedModel>, AppError>;

    /// Look up a model with its provider regardless of active flags.
    async fn find(&self, model_id: Uuid) -> Result<Option<ResolvedModel>, AppError>;

    /// Look up a model with its provider. Missing or inactive models are `NotFound`.
    async fn resolve(&self, model_id: Uuid) -> Result<ResolvedModel, AppError> {
        self.find(model_id)
            .await?
            .filter(ResolvedModel::is_active)
            .ok_or_else(|| AppError::NotFound(format!("active model {}", model_id)))
    }
}

/// In-memory catalog snapshot.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    providers: HashMap<Uuid, Provider>,
    models: Vec<AiModel>,
}

impl ModelCatalog {
    pub fn new(providers: Vec<Provider>, models: Vec<AiModel>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.id, p)).collect(),
            models,
        }
    }

    pub fn active(&self, kind: Option<ModelKind>) -> Vec<ResolvedModel> {
        let mut out: Vec<ResolvedModel> = self
            .models
            .iter()
            .filter(|m| kind.map_or(true, |k| m.kind == k))
            .filter_map(|m| self.with_provider(m))
            .filter(ResolvedModel::is_active)
            .collect();
        sort_models(&mut out);
        out
    }

    pub fn lookup(&self, model_id: Uuid) -> Option<ResolvedModel> {
        self.models
            .iter()
            .find(|m| m.id == model_id)
            .and_then(|m| self.with_provider(m))
    }

    fn with_provider(&self, model: &AiModel) -> Option<ResolvedModel> {
        self.providers
            .get(&model.provider_id)
            .map(|provider| ResolvedModel {
                model: model.clone(),
                provider: provider.clone(),
            })
    }
}

/// Deterministic catalog order: provider name, then model name.
pub fn sort_models(models: &mut [ResolvedModel]) {
    models.sort_by(|a, b| {
        a.provider
            .name
            .cmp(&b.provider.name)
            .then_with(|| a.model.name.cmp(&b.model.name))
    });
}

#[async_trait]
impl ModelRegistry for ModelCatalog {
    async fn active_models(&self, kind: Option<ModelKind>) -> Result<Vec<ResolvedModel>, AppError> {
        Ok(self.active(kind))
    }

    async fn find(&self, model_id: Uuid) -> Result<Option<ResolvedModel>, AppError> {
        Ok(self.lookup(model_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn provider(name: &str, active: bool) -> Provider {
        let now = Utc::now();
        Provider {
            id: Uuid::new_v4(),
            name: name.to_string(),
            base_url: "https://api.example.com".to_string(),
            api_key: String::new(),
            is_active: active,
            created_at: now,
            updated_at: now,
        }
    }

    fn model(provider: &Provider, name: &str, kind: ModelKind, active: bool) -> AiModel {
        let now = Utc::now();
        AiModel {
            id: Uuid::new_v4(),
            provider_id: provider.id,
            name: name.to_string(),
            kind,
            api_endpoint: "/api/v1/jobs/createTask".to_string(),
            request_template: serde_json::json!({"prompt": "{{prompt}}"}),
            parameters_schema: serde_json::json!({}),
            is_active: active,
            created_at: now,
            updated_at: now,
        }
    }

    fn names(models: &[ResolvedModel]) -> Vec<String> {
        models
            .iter()
            .map(|m| format!("{}/{}", m.provider.name, m.model.name))
            .collect()
    }

    #[tokio::test]
    async fn test_active_models_filters_and_orders() {
        let kie = provider("Kie.ai", true);
        let acme = provider("Acme", true);
        let dead = provider("Dormant", false);
        let models = vec![
            model(&kie, "Seedance 1.5 Pro", ModelKind::Video, true),
            model(&kie, "Nano Banana", ModelKind::Image, true),
            model(&kie, "Retired", ModelKind::Image, false),
            model(&acme, "Zeta", ModelKind::Image, true),
            model(&dead, "Ghost", ModelKind::Image, true),
        ];
        let catalog = ModelCatalog::new(vec![kie, acme, dead], models);

        let all = catalog.active_models(None).await.unwrap();
        assert_eq!(
            names(&all),
            vec!["Acme/Zeta", "Kie.ai/Nano Banana", "Kie.ai/Seedance 1.5 Pro"]
        );

        let videos = catalog.active_models(Some(ModelKind::Video)).await.unwrap();
        assert_eq!(names(&videos), vec!["Kie.ai/Seedance 1.5 Pro"]);
    }

    #[tokio::test]
    async fn test_resolve_missing_or_inactive_is_not_found() {
        let kie = provider("Kie.ai", true);
        let dead = provider("Dormant", false);
        let live = model(&kie, "Nano Banana", ModelKind::Image, true);
        let retired = model(&kie, "Retired", ModelKind::Image, false);
        let orphaned = model(&dead, "Ghost", ModelKind::Image, true);
        let ids = (live.id, retired.id, orphaned.id);
        let catalog = ModelCatalog::new(vec![kie, dead], vec![live, retired, orphaned]);

        let resolved = catalog.resolve(ids.0).await.unwrap();
        assert_eq!(resolved.model.name, "Nano Banana");
        assert_eq!(resolved.provider.name, "Kie.ai");

        for id in [ids.1, ids.2, Uuid::new_v4()] {
            assert!(matches!(
                catalog.resolve(id).await,
                Err(AppError::NotFound(_))
            ));
        }

        let inactive = catalog.find(ids.1).await.unwrap().unwrap();
        assert!(!inactive.is_active());
        assert!(catalog.find(Uuid::new_v4()).await.unwrap().is_none());
    }
}
