//! KNN search over knowledge embeddings, keyed by caller-meaningful string
//! ids.
//!
//! `vec0` virtual tables are addressed by integer rowid only, so every
//! string `entry_id` goes through an indirection: `vec_entries` allocates a
//! monotonic handle per id, and the embedding lives at that handle's rowid
//! in `vec_knowledge`. The handle stays stable across re-embeds of an
//! existing id — vec0 has no in-place update, so updates are delete-then-
//! insert at the same rowid.
//!
//! Search is advisory: any engine failure (including querying before
//! [`VectorIndex::initialize`]) degrades to an empty result with a warning.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use tracing::{info, warn};

use crate::corpus::KnowledgeCorpus;
use crate::db::Database;
use crate::embedding::{EmbeddingModel, EMBEDDING_DIM};
use crate::error::{Result, RetrievalError};
use crate::schema::apply_vec_schema;
use crate::types::{VectorHit, VectorStats};

/// Result-list bounds for [`VectorIndex::search`].
const MIN_SEARCH_LIMIT: usize = 1;
const MAX_SEARCH_LIMIT: usize = 100;

/// sqlite-vec KNN index with string-id indirection.
pub struct VectorIndex {
    db: Arc<Database>,
}

impl VectorIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create the vector tables if absent. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.db.conn()?;
        Ok(apply_vec_schema(&conn)?)
    }

    /// Insert or replace the embedding stored for `entry_id`.
    ///
    /// An existing id keeps its integer handle; a new id allocates the next
    /// handle through the metadata table's autoincrement. Metadata goes
    /// first for new ids because the vector row is keyed by the handle that
    /// insert produces.
    pub fn upsert(&self, entry_id: &str, embedding: &[f32]) -> Result<()> {
        check_dim(embedding)?;
        let conn = self.db.conn()?;
        let blob = embedding_blob(embedding);

        let existing: Option<i64> = conn
            .query_row(
                "SELECT handle FROM vec_entries WHERE entry_id = ?1",
                params![entry_id],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(handle) => {
                conn.execute(
                    "DELETE FROM vec_knowledge WHERE rowid = ?1",
                    params![handle],
                )?;
                conn.execute(
                    "INSERT INTO vec_knowledge (rowid, embedding) VALUES (?1, ?2)",
                    params![handle, blob],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO vec_entries (entry_id) VALUES (?1)",
                    params![entry_id],
                )?;
                let handle = conn.last_insert_rowid();
                conn.execute(
                    "INSERT INTO vec_knowledge (rowid, embedding) VALUES (?1, ?2)",
                    params![handle, blob],
                )?;
            }
        }
        Ok(())
    }

    /// Remove the vector record for `entry_id`. No-op if absent.
    pub fn remove(&self, entry_id: &str) -> Result<()> {
        let conn = self.db.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT handle FROM vec_entries WHERE entry_id = ?1",
                params![entry_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(handle) = existing {
            conn.execute(
                "DELETE FROM vec_knowledge WHERE rowid = ?1",
                params![handle],
            )?;
            conn.execute("DELETE FROM vec_entries WHERE handle = ?1", params![handle])?;
        }
        Ok(())
    }

    /// K-nearest-neighbor search, most similar first.
    ///
    /// `limit` is clamped to `[1, 100]`. Engine failures degrade to an
    /// empty list — retrieval is a best-effort signal, never a hard
    /// dependency for the caller.
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<VectorHit> {
        match self.knn(query, limit) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "vector search degraded to empty result");
                Vec::new()
            }
        }
    }

    fn knn(&self, query: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        check_dim(query)?;
        let limit = limit.clamp(MIN_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
        let conn = self.db.conn()?;
        let blob = embedding_blob(query);

        // Phase 1: pure KNN over the vec table. The LIMIT must stay on this
        // query — vec0 does not push a LIMIT through joins, so joining to
        // the metadata table here can silently return fewer or differently
        // ordered rows.
        let mut stmt = conn.prepare(
            "SELECT rowid, distance FROM vec_knowledge
             WHERE embedding MATCH ?1
             ORDER BY distance
             LIMIT ?2",
        )?;
        let pairs: Vec<(i64, f64)> = stmt
            .query_map(params![blob, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<_>>()?;
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        // Phase 2: one batched handle → entry_id lookup.
        let placeholders = vec!["?"; pairs.len()].join(", ");
        let sql =
            format!("SELECT handle, entry_id FROM vec_entries WHERE handle IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let ids: HashMap<i64, String> = stmt
            .query_map(
                rusqlite::params_from_iter(pairs.iter().map(|(handle, _)| *handle)),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
            .collect::<rusqlite::Result<_>>()?;

        let mut hits = Vec::with_capacity(pairs.len());
        for (handle, distance) in pairs {
            let Some(entry_id) = ids.get(&handle) else {
                warn!(handle, "vector row without metadata entry; skipping");
                continue;
            };
            hits.push(VectorHit {
                entry_id: entry_id.clone(),
                distance,
                score: (1.0 - distance as f32).max(0.0),
            });
        }
        Ok(hits)
    }

    /// Rebuild the whole index from the corpus.
    ///
    /// Rebuilds the vocabulary first, then clears and re-inserts every
    /// embedding inside one transaction — a crash mid-rebuild leaves the
    /// prior index intact. Returns the number of entries indexed; an empty
    /// corpus returns 0 with no side effects.
    pub fn index_all_knowledge(
        &self,
        corpus: &dyn KnowledgeCorpus,
        model: &EmbeddingModel,
    ) -> Result<usize> {
        let entries = corpus.entries()?;
        if entries.is_empty() {
            warn!("index_all_knowledge: corpus is empty; leaving existing index untouched");
            return Ok(0);
        }

        let documents: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        model.build_vocabulary(&documents);

        let conn = self.db.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM vec_knowledge", [])?;
        tx.execute("DELETE FROM vec_entries", [])?;

        let mut count = 0usize;
        for entry in &entries {
            let embedding = model.generate_embedding(&entry.text)?;
            tx.execute(
                "INSERT INTO vec_entries (entry_id) VALUES (?1)",
                params![entry.id],
            )?;
            let handle = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO vec_knowledge (rowid, embedding) VALUES (?1, ?2)",
                params![handle, embedding_blob(&embedding)],
            )?;
            count += 1;
        }
        tx.commit()?;

        info!(count, "knowledge index rebuilt");
        Ok(count)
    }

    /// Row counts, zeroed (with a warning) when the tables are unavailable.
    pub fn stats(&self) -> VectorStats {
        match self.count_rows() {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "vector stats unavailable");
                VectorStats::default()
            }
        }
    }

    fn count_rows(&self) -> Result<VectorStats> {
        let conn = self.db.conn()?;
        let vectors: i64 =
            conn.query_row("SELECT count(*) FROM vec_knowledge", [], |row| row.get(0))?;
        let entries: i64 =
            conn.query_row("SELECT count(*) FROM vec_entries", [], |row| row.get(0))?;
        Ok(VectorStats { vectors, entries })
    }

    /// Whether the vector tables exist and answer queries.
    pub fn is_available(&self) -> bool {
        self.count_rows().is_ok()
    }
}

fn check_dim(embedding: &[f32]) -> Result<()> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(RetrievalError::DimensionMismatch {
            expected: EMBEDDING_DIM,
            actual: embedding.len(),
        });
    }
    Ok(())
}

/// Little-endian f32 blob, the wire format sqlite-vec expects.
fn embedding_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
