use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the chunk table and its indexes. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // `identity` is the digest of the full identity key; the unique index
    // is what makes re-inserting the same chunk a no-op.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rag_chunks (
            id TEXT PRIMARY KEY,
            identity TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            repo TEXT NOT NULL,
            source_type TEXT NOT NULL,
            path TEXT,
            pr_number INTEGER,
            head_sha TEXT,
            source_id TEXT,
            language TEXT,
            symbol TEXT,
            start_line INTEGER,
            end_line INTEGER,
            url TEXT,
            last_edited_time TEXT,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            embedding_model TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_chunks_user_repo ON rag_chunks(user_id, repo)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rag_chunks_user_source ON rag_chunks(user_id, source_type)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rag_chunks_pr ON rag_chunks(user_id, repo, pr_number, head_sha)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_chunks_hash ON rag_chunks(content_hash)")
        .execute(pool)
        .await?;

    Ok(())
}
