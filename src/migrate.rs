use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the nomenclature schema on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Nomenclature entries. `search_text` holds the folded description
    // used for candidate prefiltering.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ncm_entries (
            code TEXT PRIMARY KEY,
            digits TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL,
            search_text TEXT NOT NULL,
            description_hash TEXT NOT NULL,
            section TEXT,
            chapter TEXT NOT NULL,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One vector per entry, tagged with the description it was computed from
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ncm_vectors (
            code TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            description_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (code) REFERENCES ncm_entries(code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ncm_entries_chapter ON ncm_entries(chapter)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ncm_vectors_model ON ncm_vectors(model)")
        .execute(pool)
        .await?;

    Ok(())
}
