use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Row};
use uuid::Uuid;

use montage_core::error::AppError;
use montage_core::lifecycle::{evaluate_transition, Transition, TransitionDecision};
use montage_core::models::{Asset, GenerationTarget};

use crate::generation_traits::{AssetStore, TransitionOutcome};

const ASSET_COLUMNS: &str = r#"
    id, scene_id, asset_type, file_url, thumbnail_url, prompt_text, ai_model_id,
    generation_config, seed, status, error_message, source_type, parent_asset_id,
    external_task_id, created_at, updated_at
"#;

#[derive(Clone)]
pub struct AssetRepository {
    pool: PgPool,
}

impl AssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetStore for AssetRepository {
    #[tracing::instrument(skip(self))]
    async fn load_for_generation(
        &self,
        asset_id: Uuid,
    ) -> Result<Option<GenerationTarget>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                a.id, a.scene_id, a.asset_type, a.file_url, a.thumbnail_url, a.prompt_text,
                a.ai_model_id, a.generation_config, a.seed, a.status, a.error_message,
                a.source_type, a.parent_asset_id, a.external_task_id, a.created_at,
                a.updated_at,
                s.project_id AS project_id,
                p.file_url AS parent_file_url
            FROM assets a
            JOIN scenes s ON s.id = a.scene_id
            LEFT JOIN assets p ON p.id = a.parent_asset_id
            WHERE a.id = $1
            "#,
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(GenerationTarget {
            asset: Asset::from_row(&row)?,
            project_id: row.try_get("project_id")?,
            parent_file_url: row.try_get("parent_file_url")?,
        }))
    }

    #[tracing::instrument(skip(self, transition), fields(target = %transition.target()))]
    async fn apply_transition(
        &self,
        asset_id: Uuid,
        transition: &Transition,
    ) -> Result<TransitionOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<Postgres, Asset>(&format!(
            "SELECT {} FROM assets WHERE id = $1 FOR UPDATE",
            ASSET_COLUMNS
        ))
        .bind(asset_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("asset {}", asset_id)))?;

        let project_id: Uuid = sqlx::query_scalar("SELECT project_id FROM scenes WHERE id = $1")
            .bind(current.scene_id)
            .fetch_one(&mut *tx)
            .await?;

        match evaluate_transition(current.status, transition)? {
            TransitionDecision::Skip(reason) => {
                tx.rollback().await.ok();
                tracing::debug!(
                    asset_id = %asset_id,
                    current = %current.status,
                    reason,
                    "Transition skipped"
                );
                return Ok(TransitionOutcome {
                    asset: current,
                    project_id,
                    applied: false,
                });
            }
            TransitionDecision::Apply => {}
        }

        let (sql, value) = match transition {
            Transition::Processing { external_task_id } => (
                "UPDATE assets
                 SET status = 'processing', external_task_id = $2, error_message = NULL,
                     updated_at = NOW()
                 WHERE id = $1",
                external_task_id,
            ),
            Transition::Completed { file_url } => (
                "UPDATE assets
                 SET status = 'completed', file_url = $2, error_message = NULL,
                     updated_at = NOW()
                 WHERE id = $1",
                file_url,
            ),
            Transition::Failed { error_message } => (
                "UPDATE assets
                 SET status = 'failed', error_message = $2, updated_at = NOW()
                 WHERE id = $1",
                error_message,
            ),
        };

        sqlx::query(sql)
            .bind(asset_id)
            .bind(value)
            .execute(&mut *tx)
            .await?;

        let updated = sqlx::query_as::<Postgres, Asset>(&format!(
            "SELECT {} FROM assets WHERE id = $1",
            ASSET_COLUMNS
        ))
        .bind(asset_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            asset_id = %asset_id,
            from = %current.status,
            to = %updated.status,
            "Asset status updated"
        );

        Ok(TransitionOutcome {
            asset: updated,
            project_id,
            applied: true,
        })
    }
}
