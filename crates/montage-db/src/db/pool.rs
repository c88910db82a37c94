//! Connection pool setup and migrations

use std::time::Duration;

use anyhow::{Context, Result};
use montage_core::MontageConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

const ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connect to Postgres with the configured pool size.
pub async fn connect(config: &MontageConfig) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );
    Ok(pool)
}

/// Apply pending migrations embedded from `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::migrate::Migrator;

    static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

    fn all_sql() -> String {
        MIGRATOR.iter().map(|m| m.sql.as_ref()).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn external_task_ids_are_unique() {
        let sql = all_sql();
        assert!(sql.contains("CREATE UNIQUE INDEX IF NOT EXISTS idx_assets_external_task"));
        assert!(sql.contains("ON assets (external_task_id)"));
    }

    #[test]
    fn task_dedupe_keys_are_unique() {
        let sql = all_sql();
        assert!(sql.contains("CREATE UNIQUE INDEX IF NOT EXISTS idx_generation_tasks_dedupe"));
        assert!(sql.contains("ON generation_tasks (dedupe_key)"));
    }
}
