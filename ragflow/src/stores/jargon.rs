//! SQLite-backed jargon store with an FTS5 index over the `jargon` column.

use super::scoring::tokenize;
use super::EmbeddingModel;
use crate::config::JargonConfig;
use crate::core::{JargonRecord, Metadata};
use crate::errors::StoreError;
use regex::Regex;
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static TABLE_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$"));

/// A jargon record with its relevance to a search term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredJargon {
    /// The stored record.
    pub record: JargonRecord,
    /// Relevance, higher is better.
    pub score: f64,
}

/// Persistent, full-text searchable table of jargon records.
///
/// No connection is kept between operations. Each call opens the database,
/// does its work on the blocking pool and closes it again, so nothing is
/// held while agents run.
#[derive(Debug, Clone)]
pub struct JargonStore {
    path: PathBuf,
    table: String,
    embedding_size: usize,
}

impl JargonStore {
    /// Opens (creating if needed) the store at `path`.
    ///
    /// The embedding model, when given, is probed once to record the width
    /// of its vectors.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid table name, a failing embedding probe
    /// or a schema creation failure.
    pub async fn open(
        path: impl Into<PathBuf>,
        table: impl Into<String>,
        embedding: Option<&dyn EmbeddingModel>,
    ) -> Result<Self, StoreError> {
        let table = table.into();
        validate_table_name(&table)?;

        let embedding_size = match embedding {
            Some(model) => model
                .embed(&["test".to_string()])
                .await?
                .first()
                .map_or(0, Vec::len),
            None => 0,
        };

        let store = Self {
            path: path.into(),
            table,
            embedding_size,
        };
        store.create().await?;

        tracing::info!(
            table = %store.table,
            path = %store.path.display(),
            embedding_size,
            "Opened jargon store"
        );
        Ok(store)
    }

    /// Opens the store named by the `database_path` and `table` settings.
    ///
    /// # Errors
    ///
    /// Same as [`JargonStore::open`].
    pub async fn from_config(
        config: &JargonConfig,
        embedding: Option<&dyn EmbeddingModel>,
    ) -> Result<Self, StoreError> {
        Self::open(config.database_path.clone(), config.table.clone(), embedding).await
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Width of the embedding model's vectors, zero when none was given.
    #[must_use]
    pub const fn embedding_size(&self) -> usize {
        self.embedding_size
    }

    /// Creates the table and its full-text index if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns a database error if the schema cannot be created.
    pub async fn create(&self) -> Result<(), StoreError> {
        self.with_connection(|conn, table| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                     pk INTEGER PRIMARY KEY,
                     id TEXT NOT NULL UNIQUE,
                     jargon TEXT NOT NULL,
                     evidence TEXT NOT NULL,
                     explanation TEXT NOT NULL,
                     metadata TEXT NOT NULL DEFAULT '{{}}'
                 );
                 CREATE VIRTUAL TABLE IF NOT EXISTS {table}_fts
                     USING fts5(jargon, content='{table}', content_rowid='pk');"
            ))
        })
        .await
    }

    /// Inserts records in one transaction, then rebuilds the full-text index.
    ///
    /// Records whose id already exists replace the stored row.
    ///
    /// # Errors
    ///
    /// Returns a database error; on error no record of the batch is stored.
    pub async fn add(&self, records: &[JargonRecord]) -> Result<(), StoreError> {
        let records = records.to_vec();
        let added = records.len();

        self.with_connection(move |conn, table| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT OR REPLACE INTO {table} (id, jargon, evidence, explanation, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5)"
                ))?;
                for record in &records {
                    let metadata = serde_json::to_string(&record.metadata)
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                    stmt.execute(params![
                        record.id,
                        record.jargon,
                        record.evidence,
                        record.explanation,
                        metadata
                    ])?;
                }
            }
            tx.execute(&format!("INSERT INTO {table}_fts({table}_fts) VALUES('rebuild')"), [])?;
            tx.commit()
        })
        .await?;

        tracing::debug!(table = %self.table, added, "Added jargon records and rebuilt index");
        Ok(())
    }

    /// Ranks records whose `jargon` matches `term` by BM25, best first.
    ///
    /// Only matching rows are returned, at most `limit` of them. Rows with
    /// equal scores come back in an order chosen by SQLite.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub async fn search(&self, term: &str, limit: usize) -> Result<Vec<ScoredJargon>, StoreError> {
        let tokens = tokenize(term);
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let query = tokens
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_connection(move |conn, table| {
            let mut stmt = conn.prepare(&format!(
                "SELECT t.id, t.jargon, t.evidence, t.explanation, t.metadata, bm25({table}_fts) AS rank
                 FROM {table}_fts
                 JOIN {table} t ON t.pk = {table}_fts.rowid
                 WHERE {table}_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![query, limit], |row| {
                let rank: f64 = row.get(5)?;
                Ok(ScoredJargon {
                    record: record_from_row(row)?,
                    score: -rank,
                })
            })?;
            rows.collect()
        })
        .await
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .with_connection(|conn, table| {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// All stored records in insertion order.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub async fn all(&self) -> Result<Vec<JargonRecord>, StoreError> {
        self.with_connection(|conn, table| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, jargon, evidence, explanation, metadata FROM {table} ORDER BY pk"
            ))?;
            let rows = stmt.query_map([], record_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn with_connection<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &str) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let table = self.table.clone();
        let store = self.table.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)?;
            op(&mut conn, &table)
        })
        .await
        .map_err(|e| StoreError::database(&store, format!("blocking task failed: {e}")))?
        .map_err(|e| StoreError::database(&store, e.to_string()))
    }
}

fn validate_table_name(table: &str) -> Result<(), StoreError> {
    match &*TABLE_NAME {
        Ok(pattern) if pattern.is_match(table) => Ok(()),
        _ => Err(StoreError::InvalidIdentifier(table.to_string())),
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JargonRecord> {
    let metadata: String = row.get(4)?;
    let metadata: Metadata = serde_json::from_str(&metadata)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(JargonRecord {
        id: row.get(0)?,
        jargon: row.get(1)?,
        evidence: row.get(2)?,
        explanation: row.get(3)?,
        metadata,
    })
}
