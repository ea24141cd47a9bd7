//! Append-only episodic log with lexical recall.
//!
//! Every recorded episode lands in the `episodes` table and, via the schema
//! triggers, in its FTS5 shadow — recall never needs a re-index step.
//! Episodes are immutable once written; a retention window hard-deletes
//! anything older than 90 days when the log is constructed.

use std::sync::Arc;

use rusqlite::params;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::types::{now_rfc3339, parse_tags, tokenize, Episode};

/// Episodes older than this are pruned at log initialization.
const RETENTION_DAYS: i64 = 90;

/// Recall tokens keep a lower length floor than the embedding path.
const RECALL_TOKEN_MIN_LEN: usize = 2;

/// Default result caps for callers that have no opinion.
pub const DEFAULT_RECALL_LIMIT: usize = 10;
pub const DEFAULT_RECENT_LIMIT: usize = 20;

const EPISODE_COLUMNS: &str = "id, sprint_phase, timestamp, action, outcome, lesson, tags";

/// Append-only journal of action/outcome events.
pub struct EpisodeLog {
    db: Arc<Database>,
}

impl EpisodeLog {
    /// Wrap the shared database and apply the retention window.
    ///
    /// Pruned rows propagate to the FTS shadow through the delete trigger.
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let log = Self { db };
        let pruned = log.prune_expired()?;
        if pruned > 0 {
            info!(pruned, "expired episodes removed");
        }
        Ok(log)
    }

    /// Record a new episode; returns it with its assigned id and timestamp.
    pub fn record_episode(
        &self,
        sprint_phase: &str,
        action: &str,
        outcome: &str,
        lesson: Option<&str>,
        tags: &[String],
    ) -> Result<Episode> {
        let timestamp = now_rfc3339();
        let tags_json = serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_owned());

        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO episodes (sprint_phase, timestamp, action, outcome, lesson, tags) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![sprint_phase, timestamp, action, outcome, lesson, tags_json],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Episode {
            id,
            sprint_phase: sprint_phase.to_owned(),
            timestamp,
            action: action.to_owned(),
            outcome: outcome.to_owned(),
            lesson: lesson.map(str::to_owned),
            tags: tags.to_vec(),
        })
    }

    /// Lexical recall over the shadow index, most recent first.
    ///
    /// The query is tokenized with a 2-char floor; if no token survives, the
    /// result is empty immediately (no wildcard match). Surviving tokens are
    /// OR-combined into one MATCH expression. Engine failures degrade to an
    /// empty list — recall is advisory.
    pub fn recall_episodes(
        &self,
        query: &str,
        limit: usize,
        sprint_phase: Option<&str>,
    ) -> Vec<Episode> {
        let tokens = tokenize(query, RECALL_TOKEN_MIN_LEN);
        if tokens.is_empty() {
            return Vec::new();
        }
        match self.recall_match(&tokens, limit, sprint_phase) {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!(error = %e, "episode recall degraded to empty result");
                Vec::new()
            }
        }
    }

    fn recall_match(
        &self,
        tokens: &[String],
        limit: usize,
        sprint_phase: Option<&str>,
    ) -> Result<Vec<Episode>> {
        // Tokens are alphanumeric by construction, so quoting is all the
        // escaping FTS5 needs.
        let match_expr = tokens
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR ");

        let conn = self.db.conn()?;
        let mut episodes = Vec::new();
        match sprint_phase {
            Some(phase) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EPISODE_COLUMNS} FROM episodes \
                     WHERE id IN (SELECT rowid FROM episodes_fts WHERE episodes_fts MATCH ?1) \
                     AND sprint_phase = ?2 \
                     ORDER BY timestamp DESC LIMIT ?3"
                ))?;
                let rows = stmt.query_map(params![match_expr, phase, limit as i64], row_to_episode)?;
                for row in rows {
                    episodes.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EPISODE_COLUMNS} FROM episodes \
                     WHERE id IN (SELECT rowid FROM episodes_fts WHERE episodes_fts MATCH ?1) \
                     ORDER BY timestamp DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![match_expr, limit as i64], row_to_episode)?;
                for row in rows {
                    episodes.push(row?);
                }
            }
        }
        Ok(episodes)
    }

    /// Most recent episodes for a sprint phase, no lexical component.
    pub fn get_recent_episodes(&self, sprint_phase: &str, limit: usize) -> Vec<Episode> {
        match self.recent(sprint_phase, limit) {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!(error = %e, "recent-episode read degraded to empty result");
                Vec::new()
            }
        }
    }

    fn recent(&self, sprint_phase: &str, limit: usize) -> Result<Vec<Episode>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes \
             WHERE sprint_phase = ?1 ORDER BY timestamp DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![sprint_phase, limit as i64], row_to_episode)?;
        let mut episodes = Vec::new();
        for row in rows {
            episodes.push(row?);
        }
        Ok(episodes)
    }

    /// Total stored episodes.
    pub fn count(&self) -> Result<i64> {
        let conn = self.db.conn()?;
        Ok(conn.query_row("SELECT count(*) FROM episodes", [], |row| row.get(0))?)
    }

    fn prune_expired(&self) -> Result<usize> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(RETENTION_DAYS))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let conn = self.db.conn()?;
        let rows = conn.execute("DELETE FROM episodes WHERE timestamp < ?1", params![cutoff])?;
        Ok(rows)
    }
}

fn row_to_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<Episode> {
    let tags_json: String = row.get(6)?;
    Ok(Episode {
        id: row.get(0)?,
        sprint_phase: row.get(1)?,
        timestamp: row.get(2)?,
        action: row.get(3)?,
        outcome: row.get(4)?,
        lesson: row.get(5)?,
        tags: parse_tags(&tags_json),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
