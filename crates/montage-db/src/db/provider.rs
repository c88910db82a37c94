use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use montage_core::error::AppError;
use montage_core::models::{AiModel, ModelKind, ModelSeed, Provider, ResolvedModel};
use montage_core::registry::{ModelCatalog, ModelRegistry};

const PROVIDER_COLUMNS: &str =
    "id, name, base_url, api_key, is_active, created_at, updated_at";

const MODEL_COLUMNS: &str = r#"
    id, provider_id, name, kind, api_endpoint, request_template, parameters_schema,
    is_active, created_at, updated_at
"#;

/// Providers and models. Doubles as the database-backed [`ModelRegistry`].
#[derive(Clone)]
pub struct ProviderRepository {
    pool: PgPool,
}

impl ProviderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_providers(&self) -> Result<Vec<Provider>, AppError> {
        let providers = sqlx::query_as::<Postgres, Provider>(&format!(
            "SELECT {} FROM ai_providers ORDER BY name",
            PROVIDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(providers)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_models(&self) -> Result<Vec<AiModel>, AppError> {
        let models = sqlx::query_as::<Postgres, AiModel>(&format!(
            "SELECT {} FROM ai_models ORDER BY name",
            MODEL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(models)
    }

    /// Snapshot of the whole catalog.
    pub async fn catalog(&self) -> Result<ModelCatalog, AppError> {
        Ok(ModelCatalog::new(
            self.list_providers().await?,
            self.list_models().await?,
        ))
    }

    /// Insert or update a provider by name.
    #[tracing::instrument(skip(self, api_key))]
    pub async fn upsert_provider(
        &self,
        name: &str,
        base_url: &str,
        api_key: &str,
        is_active: bool,
    ) -> Result<Provider, AppError> {
        let provider = sqlx::query_as::<Postgres, Provider>(&format!(
            r#"
            INSERT INTO ai_providers (name, base_url, api_key, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
            SET base_url = EXCLUDED.base_url,
                api_key = CASE WHEN EXCLUDED.api_key = '' THEN ai_providers.api_key
                               ELSE EXCLUDED.api_key END,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING {}
            "#,
            PROVIDER_COLUMNS
        ))
        .bind(name)
        .bind(base_url)
        .bind(api_key)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(provider_id = %provider.id, name, "Provider upserted");
        Ok(provider)
    }

    /// Insert or update a model by (provider, name).
    #[tracing::instrument(skip(self, seed), fields(model = %seed.name))]
    pub async fn upsert_model(&self, provider_id: Uuid, seed: &ModelSeed) -> Result<AiModel, AppError> {
        let model = sqlx::query_as::<Postgres, AiModel>(&format!(
            r#"
            INSERT INTO ai_models (
                provider_id, name, kind, api_endpoint, request_template, parameters_schema,
                is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider_id, name) DO UPDATE
            SET kind = EXCLUDED.kind,
                api_endpoint = EXCLUDED.api_endpoint,
                request_template = EXCLUDED.request_template,
                parameters_schema = EXCLUDED.parameters_schema,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING {}
            "#,
            MODEL_COLUMNS
        ))
        .bind(provider_id)
        .bind(&seed.name)
        .bind(seed.kind)
        .bind(&seed.api_endpoint)
        .bind(&seed.request_template)
        .bind(&seed.parameters_schema)
        .bind(seed.is_active)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(model_id = %model.id, provider_id = %provider_id, "Model upserted");
        Ok(model)
    }

    async fn get_model(&self, model_id: Uuid) -> Result<Option<AiModel>, AppError> {
        let model = sqlx::query_as::<Postgres, AiModel>(&format!(
            "SELECT {} FROM ai_models WHERE id = $1",
            MODEL_COLUMNS
        ))
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(model)
    }

    async fn get_provider(&self, provider_id: Uuid) -> Result<Option<Provider>, AppError> {
        let provider = sqlx::query_as::<Postgres, Provider>(&format!(
            "SELECT {} FROM ai_providers WHERE id = $1",
            PROVIDER_COLUMNS
        ))
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(provider)
    }
}

#[async_trait]
impl ModelRegistry for ProviderRepository {
    async fn active_models(&self, kind: Option<ModelKind>) -> Result<Vec<ResolvedModel>, AppError> {
        Ok(self.catalog().await?.active(kind))
    }

    #[tracing::instrument(skip(self))]
    async fn find(&self, model_id: Uuid) -> Result<Option<ResolvedModel>, AppError> {
        let Some(model) = self.get_model(model_id).await? else {
            return Ok(None);
        };
        let provider = self.get_provider(model.provider_id).await?;
        Ok(provider.map(|provider| ResolvedModel { model, provider }))
    }
}
