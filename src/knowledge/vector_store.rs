use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Document, ScoredDocument};
use crate::error::Result;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a chunk; a chunk whose id is already stored is left untouched.
    /// Returns whether a row was written.
    async fn upsert(&self, document: Document, embedding: Vec<f32>) -> Result<bool>;

    /// The `top_k` nearest chunks by cosine similarity, best first.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>>;

    async fn count(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, document: Document, embedding: Vec<f32>) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|(doc, _)| doc.id == document.id) {
            return Ok(false);
        }
        entries.push((document, embedding));
        Ok(true)
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .map(|(doc, stored)| ScoredDocument {
                document: doc.clone(),
                score: cosine_similarity(stored, embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

#[cfg(feature = "persistence")]
pub use pgvector_store::PgVector;

#[cfg(feature = "persistence")]
mod pgvector_store {
    use async_trait::async_trait;
    use pgvector::Vector;
    use regex::Regex;
    use sqlx::postgres::PgPool;
    use sqlx::Row;
    use std::sync::OnceLock;
    use tracing::info;
    use uuid::Uuid;

    use super::VectorStore;
    use crate::config::DatabaseConfig;
    use crate::error::{AgentError, Result};
    use crate::knowledge::{Document, ScoredDocument};
    use crate::storage::connect_pool;

    fn table_name_pattern() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("valid table regex"))
    }

    /// Chunks stored in a PostgreSQL table with a pgvector `embedding` column.
    /// Similarity search runs in the database using cosine distance.
    #[derive(Clone)]
    pub struct PgVector {
        pool: PgPool,
        table: String,
        dimensions: usize,
    }

    impl PgVector {
        pub async fn connect(cfg: &DatabaseConfig, table: &str, dimensions: usize) -> Result<Self> {
            Self::from_pool(connect_pool(cfg).await?, table, dimensions).await
        }

        pub async fn from_pool(pool: PgPool, table: &str, dimensions: usize) -> Result<Self> {
            if !table_name_pattern().is_match(table) {
                return Err(AgentError::Config(format!(
                    "invalid vector table name `{table}`: use lowercase letters, digits and underscores"
                )));
            }
            let store = Self {
                pool,
                table: table.to_string(),
                dimensions,
            };
            store.init_schema().await?;
            info!(table = %store.table, dimensions, "vector table ready");
            Ok(store)
        }

        pub fn table(&self) -> &str {
            &self.table
        }

        async fn init_schema(&self) -> Result<()> {
            let statements = [
                "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ( \
                         id UUID PRIMARY KEY, \
                         name TEXT NOT NULL, \
                         content TEXT NOT NULL, \
                         meta_data TEXT NOT NULL DEFAULT '{{}}', \
                         embedding vector({}) NOT NULL, \
                         created_at TIMESTAMPTZ NOT NULL DEFAULT now() \
                     )",
                    self.table, self.dimensions
                ),
            ];
            for statement in &statements {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|err| {
                        AgentError::Storage(format!(
                            "failed initializing vector table `{}`: {err}",
                            self.table
                        ))
                    })?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl VectorStore for PgVector {
        async fn upsert(&self, document: Document, embedding: Vec<f32>) -> Result<bool> {
            if embedding.len() != self.dimensions {
                return Err(AgentError::Knowledge(format!(
                    "embedding has {} dimensions, table `{}` expects {}",
                    embedding.len(),
                    self.table,
                    self.dimensions
                )));
            }
            let sql = format!(
                "INSERT INTO {} (id, name, content, meta_data, embedding) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING",
                self.table
            );
            let result = sqlx::query(&sql)
                .bind(document.id)
                .bind(&document.name)
                .bind(&document.content)
                .bind(document.metadata.to_string())
                .bind(Vector::from(embedding))
                .execute(&self.pool)
                .await
                .map_err(|err| AgentError::Storage(format!("failed writing chunk: {err}")))?;
            Ok(result.rows_affected() == 1)
        }

        async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
            let sql = format!(
                "SELECT id, name, content, meta_data, 1 - (embedding <=> $1) AS score \
                 FROM {} ORDER BY embedding <=> $1 LIMIT $2",
                self.table
            );
            let rows = sqlx::query(&sql)
                .bind(Vector::from(embedding.to_vec()))
                .bind(top_k as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|err| AgentError::Storage(format!("vector search failed: {err}")))?;

            rows.iter()
                .map(|row| {
                    let decode =
                        |err: sqlx::Error| AgentError::Storage(format!("failed decoding chunk: {err}"));
                    let meta: String = row.try_get("meta_data").map_err(decode)?;
                    let score: f64 = row.try_get("score").map_err(decode)?;
                    Ok(ScoredDocument {
                        document: Document {
                            id: row.try_get::<Uuid, _>("id").map_err(decode)?,
                            name: row.try_get("name").map_err(decode)?,
                            content: row.try_get("content").map_err(decode)?,
                            metadata: serde_json::from_str(&meta).unwrap_or_default(),
                        },
                        score: score as f32,
                    })
                })
                .collect()
        }

        async fn count(&self) -> Result<usize> {
            let sql = format!("SELECT COUNT(*) AS n FROM {}", self.table);
            let row = sqlx::query(&sql)
                .fetch_one(&self.pool)
                .await
                .map_err(|err| AgentError::Storage(format!("failed counting chunks: {err}")))?;
            let n: i64 = row
                .try_get("n")
                .map_err(|err| AgentError::Storage(format!("failed decoding count: {err}")))?;
            Ok(n as usize)
        }

        async fn clear(&self) -> Result<()> {
            let sql = format!("DELETE FROM {}", self.table);
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(|err| AgentError::Storage(format!("failed clearing chunks: {err}")))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn table_names_are_restricted_to_identifiers() {
            assert!(table_name_pattern().is_match("basic_rag_demo"));
            assert!(table_name_pattern().is_match("agentic_rag_hf_hr_policies"));
            assert!(!table_name_pattern().is_match("docs; DROP TABLE x"));
            assert!(!table_name_pattern().is_match("1docs"));
            assert!(!table_name_pattern().is_match("Docs"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_store_orders_by_similarity_and_skips_duplicates() {
        let store = InMemoryVectorStore::new();
        let near = Document::new("doc", "near", json!({}));
        let far = Document::new("doc", "far", json!({}));

        assert!(store.upsert(near.clone(), vec![1.0, 0.0]).await.unwrap());
        assert!(store.upsert(far, vec![0.0, 1.0]).await.unwrap());
        assert!(!store.upsert(near, vec![1.0, 0.0]).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);

        let hits = store.search(&[0.9, 0.1], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.content, "near");

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }
}
