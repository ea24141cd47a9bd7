//! Typed nodes and directed weighted edges with bounded traversal.
//!
//! Nodes upsert by id (replace, not merge); edges upsert by their
//! `(source, target, relationship)` composite key, overwriting the weight.
//! Traversal is breadth-first over outgoing edges with cycle-safe
//! visitation and explicit depth/size bounds.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::Database;
use crate::error::Result;
use crate::types::{parse_properties, Direction, Discovery, Edge, GraphStats, Neighbor, Node};

/// Knowledge graph store.
pub struct KnowledgeGraph {
    db: Arc<Database>,
}

impl KnowledgeGraph {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a node by id.
    pub fn add_node(&self, node: &Node) -> Result<()> {
        let conn = self.db.conn()?;
        upsert_node(&conn, node)
    }

    /// Insert or replace a batch of nodes in one transaction.
    pub fn add_nodes(&self, nodes: &[Node]) -> Result<()> {
        let conn = self.db.conn()?;
        let tx = conn.unchecked_transaction()?;
        for node in nodes {
            upsert_node(&tx, node)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace an edge; a repeat write overwrites the weight.
    pub fn add_edge(&self, edge: &Edge) -> Result<()> {
        let conn = self.db.conn()?;
        upsert_edge(&conn, edge)
    }

    /// Insert or replace a batch of edges in one transaction.
    pub fn add_edges(&self, edges: &[Edge]) -> Result<()> {
        let conn = self.db.conn()?;
        let tx = conn.unchecked_transaction()?;
        for edge in edges {
            upsert_edge(&tx, edge)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let conn = self.db.conn()?;
        let node = conn
            .query_row(
                "SELECT id, node_type, label, properties FROM graph_nodes WHERE id = ?1",
                params![id],
                row_to_node,
            )
            .optional()?;
        Ok(node)
    }

    pub fn get_nodes_by_type(&self, node_type: &str) -> Result<Vec<Node>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, node_type, label, properties FROM graph_nodes \
             WHERE node_type = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![node_type], row_to_node)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }

    /// One-hop neighbors in both directions, each resolved to its node.
    pub fn get_neighbors(&self, id: &str) -> Result<Vec<Neighbor>> {
        let conn = self.db.conn()?;
        let mut neighbors = Vec::new();

        let mut stmt = conn.prepare(
            "SELECT n.id, n.node_type, n.label, n.properties, e.relationship, e.weight \
             FROM graph_edges e JOIN graph_nodes n ON n.id = e.target \
             WHERE e.source = ?1",
        )?;
        let outgoing = stmt.query_map(params![id], |row| {
            Ok((row_to_node(row)?, row.get::<_, String>(4)?, row.get(5)?))
        })?;
        for row in outgoing {
            let (node, relationship, weight) = row?;
            neighbors.push(Neighbor {
                node,
                direction: Direction::Outgoing,
                relationship,
                weight,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT n.id, n.node_type, n.label, n.properties, e.relationship, e.weight \
             FROM graph_edges e JOIN graph_nodes n ON n.id = e.source \
             WHERE e.target = ?1",
        )?;
        let incoming = stmt.query_map(params![id], |row| {
            Ok((row_to_node(row)?, row.get::<_, String>(4)?, row.get(5)?))
        })?;
        for row in incoming {
            let (node, relationship, weight) = row?;
            neighbors.push(Neighbor {
                node,
                direction: Direction::Incoming,
                relationship,
                weight,
            });
        }

        Ok(neighbors)
    }

    /// Breadth-first traversal along outgoing edges.
    ///
    /// Each node is visited at most once and reported at its
    /// first-discovery depth; `start_id` itself is never included. Nodes at
    /// `max_depth` are emitted but not expanded, and emission stops the
    /// moment `max_nodes` results exist, even mid-frontier.
    pub fn traverse_bfs(
        &self,
        start_id: &str,
        max_depth: usize,
        max_nodes: Option<usize>,
    ) -> Result<Vec<Discovery>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT n.id, n.node_type, n.label, n.properties \
             FROM graph_edges e JOIN graph_nodes n ON n.id = e.target \
             WHERE e.source = ?1",
        )?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start_id.to_owned());
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((start_id.to_owned(), 0));
        let mut discoveries = Vec::new();

        'frontier: while let Some((id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let neighbors: Vec<Node> = stmt
                .query_map(params![id], row_to_node)?
                .collect::<rusqlite::Result<_>>()?;
            for node in neighbors {
                if !visited.insert(node.id.clone()) {
                    continue;
                }
                queue.push_back((node.id.clone(), depth + 1));
                discoveries.push(Discovery {
                    node,
                    depth: depth + 1,
                });
                if let Some(cap) = max_nodes {
                    if discoveries.len() >= cap {
                        break 'frontier;
                    }
                }
            }
        }

        Ok(discoveries)
    }

    /// Case-insensitive substring OR-match against node labels.
    ///
    /// A lightweight fallback for graph content, which has no dedicated
    /// lexical index.
    pub fn find_nodes_by_keywords(&self, keywords: &[String]) -> Result<Vec<Node>> {
        let patterns: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| format!("%{}%", k.to_lowercase()))
            .collect();
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let clause = vec!["lower(label) LIKE ?"; patterns.len()].join(" OR ");
        let sql = format!(
            "SELECT id, node_type, label, properties FROM graph_nodes \
             WHERE {clause} ORDER BY id"
        );
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(patterns), row_to_node)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }

    pub fn stats(&self) -> Result<GraphStats> {
        let conn = self.db.conn()?;
        let nodes: i64 = conn.query_row("SELECT count(*) FROM graph_nodes", [], |row| row.get(0))?;
        let edges: i64 = conn.query_row("SELECT count(*) FROM graph_edges", [], |row| row.get(0))?;

        let mut node_types = HashMap::new();
        let mut stmt =
            conn.prepare("SELECT node_type, count(*) FROM graph_nodes GROUP BY node_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (node_type, count) = row?;
            node_types.insert(node_type, count);
        }

        Ok(GraphStats {
            nodes,
            edges,
            node_types,
        })
    }

    /// Delete every node and edge in one transaction.
    pub fn clear(&self) -> Result<()> {
        let conn = self.db.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM graph_edges", [])?;
        tx.execute("DELETE FROM graph_nodes", [])?;
        tx.commit()?;
        Ok(())
    }
}

fn upsert_node(conn: &Connection, node: &Node) -> Result<()> {
    conn.execute(
        "INSERT INTO graph_nodes (id, node_type, label, properties) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             node_type = excluded.node_type,
             label = excluded.label,
             properties = excluded.properties",
        params![
            node.id,
            node.node_type,
            node.label,
            node.properties.to_string()
        ],
    )?;
    Ok(())
}

fn upsert_edge(conn: &Connection, edge: &Edge) -> Result<()> {
    conn.execute(
        "INSERT INTO graph_edges (source, target, relationship, weight) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(source, target, relationship) DO UPDATE SET weight = excluded.weight",
        params![edge.source, edge.target, edge.relationship, edge.weight],
    )?;
    Ok(())
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let properties: String = row.get(3)?;
    Ok(Node {
        id: row.get(0)?,
        node_type: row.get(1)?,
        label: row.get(2)?,
        properties: parse_properties(&properties),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn test_graph() -> KnowledgeGraph {
        let db = Arc::new(Database::open_in_memory().expect("open in-memory db"));
        KnowledgeGraph::new(db)
    }

    /// Small fixture: A→B (produced), B→C (mentions), A→D (produced).
    fn diamond_fixture(graph: &KnowledgeGraph) {
        graph
            .add_nodes(&[
                Node::new("A", "decision", "Adopt SQLite"),
                Node::new("B", "artifact", "Storage module"),
                Node::new("C", "lesson", "WAL mode matters"),
                Node::new("D", "artifact", "Migration script"),
            ])
            .expect("add nodes");
        graph
            .add_edges(&[
                Edge::new("A", "B", "produced", 1.0),
                Edge::new("B", "C", "mentions", 0.5),
                Edge::new("A", "D", "produced", 1.0),
            ])
            .expect("add edges");
    }

    #[test]
    fn add_node_upserts_by_id() {
        let graph = test_graph();
        graph
            .add_node(&Node::new("n1", "decision", "old label"))
            .expect("first add");

        let mut replacement = Node::new("n1", "lesson", "new label");
        replacement.properties = serde_json::json!({"confidence": 0.9});
        graph.add_node(&replacement).expect("second add");

        let node = graph.get_node("n1").expect("get").expect("exists");
        assert_eq!(node.node_type, "lesson");
        assert_eq!(node.label, "new label");
        assert_eq!(node.properties, serde_json::json!({"confidence": 0.9}));
        assert_eq!(graph.stats().expect("stats").nodes, 1);
    }

    #[test]
    fn add_edge_twice_overwrites_weight_without_duplicating() {
        let graph = test_graph();
        diamond_fixture(&graph);

        graph
            .add_edge(&Edge::new("A", "B", "produced", 0.25))
            .expect("re-add");

        let stats = graph.stats().expect("stats");
        assert_eq!(stats.edges, 3, "edge count unchanged");

        let neighbors = graph.get_neighbors("B").expect("neighbors");
        let from_a = neighbors
            .iter()
            .find(|n| n.node.id == "A")
            .expect("A neighbor");
        assert!((from_a.weight - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn parallel_relationships_are_distinct_edges() {
        let graph = test_graph();
        graph
            .add_nodes(&[Node::new("x", "t", "x"), Node::new("y", "t", "y")])
            .expect("nodes");
        graph
            .add_edges(&[
                Edge::new("x", "y", "depends_on", 1.0),
                Edge::new("x", "y", "mentions", 0.2),
            ])
            .expect("edges");
        assert_eq!(graph.stats().expect("stats").edges, 2);
    }

    #[test]
    fn get_node_missing_returns_none() {
        let graph = test_graph();
        assert!(graph.get_node("ghost").expect("get").is_none());
    }

    #[test]
    fn get_nodes_by_type_filters() {
        let graph = test_graph();
        diamond_fixture(&graph);
        let artifacts = graph.get_nodes_by_type("artifact").expect("by type");
        let ids: Vec<&str> = artifacts.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "D"]);
    }

    #[test]
    fn get_neighbors_reports_both_directions() {
        let graph = test_graph();
        diamond_fixture(&graph);

        let neighbors = graph.get_neighbors("B").expect("neighbors");
        assert_eq!(neighbors.len(), 2);

        let outgoing = neighbors
            .iter()
            .find(|n| n.direction == Direction::Outgoing)
            .expect("outgoing");
        assert_eq!(outgoing.node.id, "C");
        assert_eq!(outgoing.relationship, "mentions");

        let incoming = neighbors
            .iter()
            .find(|n| n.direction == Direction::Incoming)
            .expect("incoming");
        assert_eq!(incoming.node.id, "A");
    }

    #[test]
    fn bfs_depth_two_reaches_transitive_nodes() {
        let graph = test_graph();
        diamond_fixture(&graph);

        let found = graph.traverse_bfs("A", 2, None).expect("bfs");
        let mut ids: Vec<&str> = found.iter().map(|d| d.node.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["B", "C", "D"]);

        let c = found.iter().find(|d| d.node.id == "C").expect("C");
        assert_eq!(c.depth, 2);
    }

    #[test]
    fn bfs_depth_one_excludes_deeper_nodes_and_start() {
        let graph = test_graph();
        diamond_fixture(&graph);

        let found = graph.traverse_bfs("A", 1, None).expect("bfs");
        let mut ids: Vec<&str> = found.iter().map(|d| d.node.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["B", "D"]);
        assert!(found.iter().all(|d| d.node.id != "A"));
        assert!(found.iter().all(|d| d.depth == 1));
    }

    #[test]
    fn bfs_follows_outgoing_edges_only() {
        let graph = test_graph();
        diamond_fixture(&graph);

        // C has only an incoming edge, so nothing is reachable from it.
        let found = graph.traverse_bfs("C", 3, None).expect("bfs");
        assert!(found.is_empty());
    }

    #[test]
    fn bfs_is_cycle_safe_and_reports_first_discovery_depth() {
        let graph = test_graph();
        graph
            .add_nodes(&[
                Node::new("a", "t", "a"),
                Node::new("b", "t", "b"),
                Node::new("c", "t", "c"),
            ])
            .expect("nodes");
        graph
            .add_edges(&[
                Edge::new("a", "b", "next", 1.0),
                Edge::new("b", "c", "next", 1.0),
                Edge::new("c", "a", "next", 1.0),
                Edge::new("a", "c", "skip", 1.0),
            ])
            .expect("edges");

        let found = graph.traverse_bfs("a", 10, None).expect("bfs");
        assert_eq!(found.len(), 2, "each node reported once, start excluded");
        let c = found.iter().find(|d| d.node.id == "c").expect("c");
        assert_eq!(c.depth, 1, "c is reported at its shallowest discovery");
    }

    #[test]
    fn bfs_max_nodes_stops_mid_frontier() {
        let graph = test_graph();
        diamond_fixture(&graph);

        let found = graph.traverse_bfs("A", 2, Some(1)).expect("bfs");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn bfs_from_unknown_start_returns_empty() {
        let graph = test_graph();
        diamond_fixture(&graph);
        assert!(graph.traverse_bfs("ghost", 3, None).expect("bfs").is_empty());
    }

    #[test]
    fn find_nodes_by_keywords_matches_substrings_case_insensitively() {
        let graph = test_graph();
        diamond_fixture(&graph);

        let found = graph
            .find_nodes_by_keywords(&["SQLITE".to_owned(), "migration".to_owned()])
            .expect("keywords");
        let mut ids: Vec<&str> = found.iter().map(|n| n.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["A", "D"]);
    }

    #[test]
    fn find_nodes_by_keywords_with_no_usable_keywords_returns_empty() {
        let graph = test_graph();
        diamond_fixture(&graph);
        assert!(graph.find_nodes_by_keywords(&[]).expect("empty").is_empty());
        assert!(graph
            .find_nodes_by_keywords(&["  ".to_owned()])
            .expect("blank")
            .is_empty());
    }

    #[test]
    fn stats_counts_nodes_edges_and_types() {
        let graph = test_graph();
        diamond_fixture(&graph);

        let stats = graph.stats().expect("stats");
        assert_eq!(stats.nodes, 4);
        assert_eq!(stats.edges, 3);
        assert_eq!(stats.node_types.get("artifact"), Some(&2));
        assert_eq!(stats.node_types.get("decision"), Some(&1));
    }

    #[test]
    fn clear_wipes_everything() {
        let graph = test_graph();
        diamond_fixture(&graph);
        graph.clear().expect("clear");
        assert_eq!(graph.stats().expect("stats"), GraphStats::default());
    }

    #[test]
    fn malformed_properties_degrade_to_empty_object() {
        let graph = test_graph();
        graph
            .add_node(&Node::new("n", "t", "label"))
            .expect("add");
        {
            let conn = graph.db.conn().expect("lock");
            conn.execute(
                "UPDATE graph_nodes SET properties = 'not-json' WHERE id = 'n'",
                [],
            )
            .expect("corrupt");
        }
        let node = graph.get_node("n").expect("get").expect("exists");
        assert_eq!(node.properties, serde_json::json!({}));
    }
}
