//! SQLite fact store.
//!
//! A single `facts` table holds every row; superseding a fact flips
//! `is_current` and never deletes. Filters compile to SQL predicates that
//! over-fetch candidates, and the shared [`FactFilter::select`] applies the
//! exact word-bounded match and ranking in Rust so every backend answers a
//! filter identically. Relevance candidates are ordered by LIKE hit count
//! in SQL so an older, better match is not cut by the over-fetch window.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use factlayer_core::error::MemoryError;
use factlayer_core::fact::{Fact, FactFilter, PersistentMemoryStore};
use factlayer_core::text;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Candidate rows fetched per requested row for filters refined in Rust.
const OVERFETCH: usize = 4;

/// A SQLite-backed fact store.
pub struct SqliteFactStore {
    pool: SqlitePool,
}

impl SqliteFactStore {
    /// Open (or create) a store at `path`.
    ///
    /// The database and all tables/indexes are created automatically.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite fact store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS facts (
                iid             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT UNIQUE NOT NULL,
                user_id         TEXT NOT NULL,
                content         TEXT NOT NULL,
                category_tag    TEXT NOT NULL DEFAULT '',
                created_at      TEXT NOT NULL,
                is_current      INTEGER NOT NULL DEFAULT 1,
                relevance_score REAL NOT NULL DEFAULT 0.0,
                metadata        TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("facts table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_facts_user_created ON facts(user_id, is_current, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("user/created_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Insert or replace a fact (ingestion path). Returns the fact id.
    pub async fn insert(&self, fact: &Fact) -> Result<String, MemoryError> {
        let id = if fact.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            fact.id.clone()
        };
        let metadata = serde_json::to_string(&fact.metadata)
            .map_err(|e| MemoryError::Storage(format!("Metadata serialization: {e}")))?;
        let created_at = fact.created_at.to_rfc3339_opts(SecondsFormat::Micros, true);

        sqlx::query(
            r#"
            INSERT INTO facts (id, user_id, content, category_tag, created_at, is_current, relevance_score, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                category_tag = excluded.category_tag,
                is_current = excluded.is_current,
                relevance_score = excluded.relevance_score,
                metadata = excluded.metadata
            "#,
        )
        .bind(&id)
        .bind(&fact.user_id)
        .bind(&fact.content)
        .bind(&fact.category_tag)
        .bind(&created_at)
        .bind(fact.is_current)
        .bind(f64::from(fact.relevance_score))
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!("Stored fact {id}");
        Ok(id)
    }

    /// Mark a fact as superseded. Returns false when the id is unknown.
    pub async fn supersede(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("UPDATE facts SET is_current = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("UPDATE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_fact(row: &sqlx::sqlite::SqliteRow) -> Result<Fact, MemoryError> {
        let column = |name: &str, e: sqlx::Error| MemoryError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let user_id: String = row.try_get("user_id").map_err(|e| column("user_id", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let category_tag: String = row.try_get("category_tag").map_err(|e| column("category_tag", e))?;
        let created_at_str: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let is_current: bool = row.try_get("is_current").map_err(|e| column("is_current", e))?;
        let relevance_score: f64 = row.try_get("relevance_score").unwrap_or(0.0);
        let metadata_json: String = row.try_get("metadata").map_err(|e| column("metadata", e))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MemoryError::QueryFailed(format!("created_at of {id}: {e}")))?;
        let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();

        Ok(Fact {
            id,
            user_id,
            content,
            category_tag,
            created_at,
            is_current,
            relevance_score: relevance_score as f32,
            metadata,
        })
    }

    /// Escape SQL LIKE wildcards so user text is matched literally.
    fn like_pattern(term: &str) -> String {
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{escaped}%")
    }
}

#[async_trait]
impl PersistentMemoryStore for SqliteFactStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn query(&self, user_id: &str, filter: &FactFilter, limit: usize) -> Result<Vec<Fact>, MemoryError> {
        let mut sql = String::from("SELECT * FROM facts WHERE user_id = ?");
        let mut binds: Vec<String> = vec![user_id.to_string()];
        if !filter.includes_superseded() {
            sql.push_str(" AND is_current = 1");
        }

        let mut fetch_limit = limit;
        let like_terms = match filter.predicate() {
            FactFilter::Relevance(query) => text::keywords(query),
            FactFilter::AnyKeyword(words) => words.clone(),
            _ => Vec::new(),
        };
        match filter.predicate() {
            FactFilter::Relevance(_) | FactFilter::AnyKeyword(_) => {
                if !like_terms.is_empty() {
                    let ors = vec!["content LIKE ? ESCAPE '\\'"; like_terms.len()].join(" OR ");
                    sql.push_str(&format!(" AND ({ors})"));
                    binds.extend(like_terms.iter().map(|t| Self::like_pattern(t)));
                }
                fetch_limit = limit.saturating_mul(OVERFETCH);
            }
            FactFilter::Category(category) => {
                sql.push_str(" AND category_tag = ? COLLATE NOCASE");
                binds.push(category.clone());
            }
            FactFilter::HasMetadata(key) => {
                if key.contains('"') || key.contains('\\') {
                    return Err(MemoryError::QueryFailed(format!("invalid metadata key: {key}")));
                }
                sql.push_str(" AND json_extract(metadata, ?) IS NOT NULL");
                binds.push(format!("$.\"{key}\""));
            }
            FactFilter::Recent | FactFilter::IncludingSuperseded(_) => {}
        }
        // Rank relevance candidates by term hits before the window is cut
        if matches!(filter.predicate(), FactFilter::Relevance(_)) && !like_terms.is_empty() {
            let hits = vec!["(content LIKE ? ESCAPE '\\')"; like_terms.len()].join(" + ");
            sql.push_str(&format!(" ORDER BY ({hits}) + relevance_score DESC, created_at DESC LIMIT ?"));
            binds.extend(like_terms.iter().map(|t| Self::like_pattern(t)));
        } else {
            sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        }

        let mut db_query = sqlx::query(&sql);
        for value in binds {
            db_query = db_query.bind(value);
        }
        let rows = db_query
            .bind(fetch_limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("fact query: {e}")))?;

        let facts = rows.iter().map(Self::row_to_fact).collect::<Result<Vec<_>, _>>()?;
        Ok(filter.select(&facts, limit))
    }

    async fn has_any(&self, user_id: &str) -> Result<bool, MemoryError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM facts WHERE user_id = ?1 AND is_current = 1) AS present",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("existence check: {e}")))?;

        let present: i64 = row
            .try_get("present")
            .map_err(|e| MemoryError::QueryFailed(format!("present column: {e}")))?;
        Ok(present != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store(dir: &tempfile::TempDir) -> SqliteFactStore {
        let path = dir.path().join("facts.db");
        SqliteFactStore::new(&format!("sqlite://{}", path.display())).await.unwrap()
    }

    #[tokio::test]
    async fn insert_and_query_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let id = store
            .insert(&Fact::new("", "u1", "I drive a 2019 Honda Civic").with_category("vehicle"))
            .await
            .unwrap();
        assert!(!id.is_empty());

        let facts = store.query("u1", &FactFilter::Recent, 10).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].id, id);
        assert_eq!(facts[0].category_tag, "vehicle");
    }

    #[tokio::test]
    async fn metadata_roundtrip_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store
            .insert(
                &Fact::new("f1", "u1", "My second code is BBB")
                    .with_metadata("ordinal", 2)
                    .with_metadata("ordinalSubject", "code")
                    .with_metadata("ordinalValue", "BBB"),
            )
            .await
            .unwrap();
        store.insert(&Fact::new("f2", "u1", "No metadata here")).await.unwrap();

        let facts = store
            .query("u1", &FactFilter::HasMetadata("ordinal".into()), 10)
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].ordinal(), Some(2));
        assert_eq!(facts[0].ordinal_value(), Some("BBB"));
    }

    #[tokio::test]
    async fn keyword_filter_is_word_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.insert(&Fact::new("f1", "u1", "My card expires in May")).await.unwrap();
        store.insert(&Fact::new("f2", "u1", "My car is a blue truck")).await.unwrap();

        let facts = store
            .query("u1", &FactFilter::AnyKeyword(vec!["car".into()]), 10)
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].id, "f2");
    }

    #[tokio::test]
    async fn older_relevant_fact_survives_overfetch_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let base = Utc::now() - chrono::Duration::days(30);
        let mut old = Fact::new("truck", "u1", "My truck is blue");
        old.created_at = base;
        store.insert(&old).await.unwrap();
        for i in 1..=8 {
            let mut newer = Fact::new(format!("scarf{i}"), "u1", format!("Bought a blue scarf, number {i}"));
            newer.created_at = base + chrono::Duration::days(i);
            store.insert(&newer).await.unwrap();
        }

        let facts = store
            .query("u1", &FactFilter::Relevance("blue truck".into()), 1)
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].id, "truck");
    }

    #[tokio::test]
    async fn like_wildcards_are_literal() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.insert(&Fact::new("f1", "u1", "Discount is 100 percent")).await.unwrap();

        let facts = store
            .query("u1", &FactFilter::AnyKeyword(vec!["%".into()]), 10)
            .await
            .unwrap();
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn supersede_hides_fact_from_default_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store
            .insert(&Fact::new("f1", "u1", "Favorite color is blue").with_metadata("anchors", json!({})))
            .await
            .unwrap();
        assert!(store.has_any("u1").await.unwrap());
        assert!(store.supersede("f1").await.unwrap());
        assert!(!store.has_any("u1").await.unwrap());

        assert!(store.query("u1", &FactFilter::Recent, 10).await.unwrap().is_empty());
        let all = store
            .query("u1", &FactFilter::Recent.including_superseded(), 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].is_current);
    }

    #[tokio::test]
    async fn category_filter_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.insert(&Fact::new("f1", "u1", "Works at Acme").with_category("Work")).await.unwrap();
        store.insert(&Fact::new("f2", "u1", "Likes tea").with_category("preference")).await.unwrap();

        let facts = store.query("u1", &FactFilter::Category("work".into()), 10).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].id, "f1");
    }
}
