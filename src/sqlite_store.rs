//! SQLite-backed [`VectorStore`] implementation.
//!
//! One `rag_chunks` row per chunk. Embeddings are little-endian `f32`
//! BLOBs; search is a brute-force cosine scan over the rows that pass the
//! exact-match filters, which SQL narrows first. The `identity` column
//! carries a unique index, so inserting a chunk that already exists at the
//! same coordinates with the same content is a no-op.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use factgap_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use factgap_core::models::{Chunk, ChunkScope, SourceType};
use factgap_core::store::{DeleteScope, SearchHit, UpsertOutcome, VectorQuery, VectorStore};

/// Identities looked up per `IN (...)` query.
const EXISTS_BATCH: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of chunks owned by `user_id`.
    pub async fn count_chunks(&self, user_id: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<(String, Chunk)> {
    let source_type: String = row.try_get("source_type")?;
    let source_type: SourceType = source_type.parse()?;
    let pr_number: Option<i64> = row.try_get("pr_number")?;
    let start_line: Option<i64> = row.try_get("start_line")?;
    let end_line: Option<i64> = row.try_get("end_line")?;
    let blob: Vec<u8> = row.try_get("embedding")?;

    let chunk = Chunk {
        user_id: row.try_get("user_id")?,
        repo: row.try_get("repo")?,
        source_type,
        path: row.try_get("path")?,
        pr_number: pr_number.map(|n| n as u64),
        head_sha: row.try_get("head_sha")?,
        source_id: row.try_get("source_id")?,
        language: row.try_get("language")?,
        symbol: row.try_get("symbol")?,
        start_line: start_line.map(|n| n as usize),
        end_line: end_line.map(|n| n as usize),
        url: row.try_get("url")?,
        last_edited_time: row.try_get("last_edited_time")?,
        content: row.try_get("content")?,
        content_hash: row.try_get("content_hash")?,
        embedding: blob_to_vec(&blob),
        embedding_model: row.try_get("embedding_model")?,
    };
    Ok((row.try_get("id")?, chunk))
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn search(&self, query: &VectorQuery<'_>) -> Result<Vec<SearchHit>> {
        let filters = query.filters;
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM rag_chunks WHERE user_id = ");
        qb.push_bind(filters.user_id.clone());
        if let Some(repo) = &filters.repo {
            qb.push(" AND repo = ").push_bind(repo.clone());
        }
        if let Some(pr) = filters.pr_number {
            qb.push(" AND pr_number = ").push_bind(pr as i64);
        }
        if let Some(sha) = &filters.head_sha {
            qb.push(" AND head_sha = ").push_bind(sha.clone());
        }
        if !query.source_types.is_empty() {
            qb.push(" AND source_type IN (");
            let mut list = qb.separated(", ");
            for st in query.source_types {
                list.push_bind(st.as_str());
            }
            list.push_unseparated(")");
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("vector search query failed")?;

        let mut hits = Vec::new();
        for row in &rows {
            let (id, chunk) = row_to_chunk(row)?;
            let score = cosine_similarity(query.embedding, &chunk.embedding) as f64;
            if score >= query.min_score {
                hits.push(SearchHit { id, chunk, score });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(query.k);
        Ok(hits)
    }

    async fn upsert(&self, chunk: &Chunk) -> Result<UpsertOutcome> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO rag_chunks (id, identity, user_id, repo, source_type, path, pr_number,
                                    head_sha, source_id, language, symbol, start_line, end_line,
                                    url, last_edited_time, content, content_hash, embedding,
                                    embedding_model, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(chunk.identity())
        .bind(&chunk.user_id)
        .bind(&chunk.repo)
        .bind(chunk.source_type.as_str())
        .bind(&chunk.path)
        .bind(chunk.pr_number.map(|n| n as i64))
        .bind(&chunk.head_sha)
        .bind(&chunk.source_id)
        .bind(&chunk.language)
        .bind(&chunk.symbol)
        .bind(chunk.start_line.map(|n| n as i64))
        .bind(chunk.end_line.map(|n| n as i64))
        .bind(&chunk.url)
        .bind(&chunk.last_edited_time)
        .bind(&chunk.content)
        .bind(&chunk.content_hash)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(&chunk.embedding_model)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(UpsertOutcome::Duplicate)
        } else {
            Ok(UpsertOutcome::Inserted(id))
        }
    }

    async fn delete(&self, scope: &DeleteScope) -> Result<usize> {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM rag_chunks WHERE user_id = ");
        qb.push_bind(scope.user_id.clone());
        if let Some(repo) = &scope.repo {
            qb.push(" AND repo = ").push_bind(repo.clone());
        }
        if let Some(st) = scope.source_type {
            qb.push(" AND source_type = ").push_bind(st.as_str());
        }
        if let Some(source_id) = &scope.source_id {
            qb.push(" AND source_id = ").push_bind(source_id.clone());
        }

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn existing_hashes(
        &self,
        scope: &ChunkScope,
        hashes: &[String],
    ) -> Result<HashSet<String>> {
        let by_identity: HashMap<String, &String> =
            hashes.iter().map(|h| (scope.identity(h), h)).collect();
        let identities: Vec<&String> = by_identity.keys().collect();

        let mut found = HashSet::new();
        for batch in identities.chunks(EXISTS_BATCH) {
            let mut qb =
                QueryBuilder::<Sqlite>::new("SELECT identity FROM rag_chunks WHERE identity IN (");
            let mut list = qb.separated(", ");
            for identity in batch {
                list.push_bind((*identity).clone());
            }
            list.push_unseparated(")");

            let rows: Vec<String> = qb.build_query_scalar().fetch_all(&self.pool).await?;
            for identity in rows {
                if let Some(hash) = by_identity.get(&identity) {
                    found.insert((*hash).clone());
                }
            }
        }
        Ok(found)
    }
}
