use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Connect, create the schema, and close. Backs `wtf init`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index if missing. Safe to run on every startup.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Analyzed failures
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            id TEXT PRIMARY KEY,
            case_name TEXT NOT NULL,
            command TEXT NOT NULL,
            error_log TEXT NOT NULL,
            code_context_json TEXT,
            root_cause TEXT NOT NULL,
            solution TEXT NOT NULL,
            tags_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            vector_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per indexed failure trace
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS case_vectors (
            id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            document TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cases_created_at ON cases(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
