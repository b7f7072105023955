//! SQLite-backed [`NomenclatureStore`] implementation.
//!
//! Entries live in `ncm_entries`, vectors in `ncm_vectors` (see
//! [`migrate`](crate::migrate)). Nearest-neighbour search is brute-force
//! cosine similarity over the current vectors.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::NomenclatureStore;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::lexical::fold;
use crate::models::{IndexStats, NomenclatureEntry, PendingEmbedding};

const ENTRY_COLUMNS: &str = "code, description, section, chapter, notes";

/// SQLite implementation of the [`NomenclatureStore`] trait.
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
}

fn entry_from_row(row: &SqliteRow) -> NomenclatureEntry {
    NomenclatureEntry {
        code: row.get("code"),
        description: row.get("description"),
        section: row.get("section"),
        chapter: row.get("chapter"),
        notes: row.get("notes"),
    }
}

#[async_trait]
impl NomenclatureStore for SqliteStore {
    async fn insert_entries(&self, entries: &[NomenclatureEntry]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for entry in entries {
            let result = sqlx::query(
                r#"
                INSERT INTO ncm_entries (code, digits, description, search_text,
                                         description_hash, section, chapter, notes,
                                         created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&entry.code)
            .bind(entry.digits())
            .bind(&entry.description)
            .bind(fold(&entry.description))
            .bind(entry.description_hash())
            .bind(&entry.section)
            .bind(&entry.chapter)
            .bind(&entry.notes)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn correct_entry(
        &self,
        code: &str,
        description: &str,
        notes: Option<&str>,
    ) -> Result<bool> {
        let description = description.trim();
        let now = chrono::Utc::now().timestamp();
        let hash = crate::models::hash_text(description);

        let result = match notes {
            Some(n) => {
                let notes = Some(n.trim()).filter(|n| !n.is_empty());
                sqlx::query(
                    r#"
                    UPDATE ncm_entries
                    SET description = ?, search_text = ?, description_hash = ?,
                        notes = ?, updated_at = ?
                    WHERE code = ?
                    "#,
                )
                .bind(description)
                .bind(fold(description))
                .bind(&hash)
                .bind(notes)
                .bind(now)
                .bind(code)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE ncm_entries
                    SET description = ?, search_text = ?, description_hash = ?,
                        updated_at = ?
                    WHERE code = ?
                    "#,
                )
                .bind(description)
                .bind(fold(description))
                .bind(&hash)
                .bind(now)
                .bind(code)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    async fn get_entry(&self, code: &str) -> Result<Option<NomenclatureEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ncm_entries WHERE code = ?",
            ENTRY_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(entry_from_row))
    }

    async fn upsert_embedding(
        &self,
        code: &str,
        vector: &[f32],
        model: &str,
        description_hash: &str,
    ) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM ncm_entries WHERE code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            bail!("no nomenclature entry with code {}", code);
        }

        let existing_dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM ncm_vectors WHERE code != ? LIMIT 1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(dims) = existing_dims {
            if dims as usize != vector.len() {
                bail!(
                    "embedding for {} has {} dimensions, index holds {}",
                    code,
                    vector.len(),
                    dims
                );
            }
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO ncm_vectors (code, model, dims, description_hash, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(code) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                description_hash = excluded.description_hash,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            "#,
        )
        .bind(code)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(description_hash)
        .bind(vec_to_blob(vector))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn pending_embeddings(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PendingEmbedding>> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            r#"
            SELECT e.code, e.description, e.description_hash
            FROM ncm_entries e
            LEFT JOIN ncm_vectors v ON v.code = e.code
            WHERE v.code IS NULL
               OR v.model != ?
               OR v.description_hash != e.description_hash
            ORDER BY e.code ASC
            LIMIT ?
            "#,
        )
        .bind(model)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PendingEmbedding {
                code: row.get("code"),
                description: row.get("description"),
                description_hash: row.get("description_hash"),
            })
            .collect())
    }

    async fn clear_embeddings(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ncm_vectors")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn nearest(
        &self,
        query_vec: &[f32],
        model: &str,
        limit: usize,
        threshold: Option<f64>,
    ) -> Result<Vec<(NomenclatureEntry, f64)>> {
        let rows = sqlx::query(
            r#"
            SELECT e.code, e.description, e.section, e.chapter, e.notes, v.embedding
            FROM ncm_vectors v
            JOIN ncm_entries e ON e.code = v.code
            WHERE v.description_hash = e.description_hash
              AND v.model = ?
            "#,
        )
        .bind(model)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(NomenclatureEntry, f64)> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
                if threshold.is_some_and(|t| similarity < t) {
                    return None;
                }
                Some((entry_from_row(row), similarity))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.code.cmp(&b.0.code))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn code_prefix_candidates(
        &self,
        digits: &str,
        limit: usize,
    ) -> Result<Vec<NomenclatureEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ncm_entries WHERE digits LIKE ? ORDER BY code ASC LIMIT ?",
            ENTRY_COLUMNS
        ))
        .bind(format!("{}%", digits))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn text_candidates(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<NomenclatureEntry>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // One capped subquery per term; UNION drops entries matched twice.
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("");
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                qb.push(" UNION ");
            }
            qb.push(format!(
                "SELECT {cols} FROM (SELECT {cols} FROM ncm_entries WHERE instr(search_text, ",
                cols = ENTRY_COLUMNS
            ));
            qb.push_bind(term.as_str());
            qb.push(") > 0 ORDER BY code ASC LIMIT ");
            qb.push_bind(limit as i64);
            qb.push(")");
        }
        qb.push(" ORDER BY code ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM ncm_entries) AS entries,
                (SELECT COUNT(DISTINCT chapter) FROM ncm_entries) AS chapters,
                (SELECT COUNT(*) FROM ncm_vectors v JOIN ncm_entries e ON e.code = v.code
                  WHERE v.description_hash = e.description_hash) AS embedded,
                (SELECT COUNT(*) FROM ncm_vectors v JOIN ncm_entries e ON e.code = v.code
                  WHERE v.description_hash != e.description_hash) AS stale,
                (SELECT dims FROM ncm_vectors LIMIT 1) AS dims
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let dims: Option<i64> = row.get("dims");
        Ok(IndexStats {
            entries: row.get::<i64, _>("entries") as u64,
            embedded: row.get::<i64, _>("embedded") as u64,
            stale: row.get::<i64, _>("stale") as u64,
            chapters: row.get::<i64, _>("chapters") as u64,
            dims: dims.map(|d| d as usize),
        })
    }
}
