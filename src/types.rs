//! Shared domain types and helpers for the retrieval stores.
//!
//! Everything here is store-agnostic: the episodic log, the knowledge graph,
//! and the vector index all pull their row types and the shared tokenizer
//! from this module.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Episodic log
// ---------------------------------------------------------------------------

/// One recorded action/outcome event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Auto-assigned row id.
    pub id: i64,
    pub sprint_phase: String,
    /// RFC 3339 UTC timestamp, assigned at insert.
    pub timestamp: String,
    pub action: String,
    pub outcome: String,
    pub lesson: Option<String>,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Knowledge graph
// ---------------------------------------------------------------------------

/// A typed node. `id` is caller-assigned and globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_type: String,
    pub label: String,
    /// Arbitrary JSON object; degraded to `{}` on malformed stored content.
    pub properties: serde_json::Value,
}

impl Node {
    /// Node with empty properties.
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            label: label.into(),
            properties: empty_properties(),
        }
    }
}

/// A directed weighted edge with composite identity
/// `(source, target, relationship)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub weight: f64,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relationship: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relationship: relationship.into(),
            weight,
        }
    }
}

/// Which side of an edge the queried node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The queried node is the edge source.
    Outgoing,
    /// The queried node is the edge target.
    Incoming,
}

/// A one-hop neighbor resolved to its node, with the connecting edge data.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub node: Node,
    pub direction: Direction,
    pub relationship: String,
    pub weight: f64,
}

/// A node found during BFS, reported at its first-discovery depth.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub node: Node,
    pub depth: usize,
}

/// Graph-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: i64,
    pub edges: i64,
    pub node_types: HashMap<String, i64>,
}

// ---------------------------------------------------------------------------
// Vector index
// ---------------------------------------------------------------------------

/// One nearest-neighbor match, most similar first in result lists.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub entry_id: String,
    /// Raw L2 distance from the index.
    pub distance: f64,
    /// `max(0, 1 - distance)` — a monotonic convenience transform, not a
    /// calibrated probability.
    pub score: f32,
}

/// Vector index counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorStats {
    /// Rows in the embedding table.
    pub vectors: i64,
    /// Rows in the handle metadata table.
    pub entries: i64,
}

// ---------------------------------------------------------------------------
// Helpers shared across stores
// ---------------------------------------------------------------------------

/// Lowercase, treat every non-alphanumeric run as a separator, and drop
/// tokens shorter than `min_len`. The embedding path uses a 3-char floor;
/// episode recall loosens it to 2.
pub(crate) fn tokenize(text: &str, min_len: usize) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= min_len)
        .map(str::to_owned)
        .collect()
}

/// Parse a stored JSON string array, degrading to empty on malformed content.
pub(crate) fn parse_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Parse stored node properties, degrading to `{}` on malformed content.
pub(crate) fn parse_properties(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| empty_properties())
}

fn empty_properties() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Fixed-width RFC 3339 UTC timestamp so stored values order lexically.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits_on_symbol_runs() {
        let tokens = tokenize("Sprint-Planning: code_review!!", 3);
        assert_eq!(tokens, vec!["sprint", "planning", "code", "review"]);
    }

    #[test]
    fn tokenize_drops_short_tokens() {
        assert_eq!(tokenize("a an the fox", 3), vec!["the", "fox"]);
        assert_eq!(tokenize("a an the fox", 2), vec!["an", "the", "fox"]);
    }

    #[test]
    fn tokenize_keeps_digits() {
        assert_eq!(tokenize("sqlite3 vec0", 3), vec!["sqlite3", "vec0"]);
    }

    #[test]
    fn tokenize_pure_punctuation_yields_nothing() {
        assert!(tokenize("! @ # $", 2).is_empty());
    }

    #[test]
    fn parse_tags_degrades_on_garbage() {
        assert!(parse_tags("not json").is_empty());
        assert!(parse_tags("{\"a\":1}").is_empty());
        assert_eq!(parse_tags("[\"x\",\"y\"]"), vec!["x", "y"]);
    }

    #[test]
    fn parse_properties_degrades_to_empty_object() {
        assert_eq!(parse_properties("}{"), serde_json::json!({}));
        assert_eq!(parse_properties("{\"k\":2}"), serde_json::json!({"k": 2}));
    }

    #[test]
    fn timestamps_order_lexically() {
        let a = now_rfc3339();
        let b = now_rfc3339();
        assert!(a <= b);
    }
}
