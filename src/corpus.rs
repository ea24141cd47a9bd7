//! Corpus access seam for bulk re-indexing.
//!
//! The knowledge text itself lives in an external lexical substrate; the
//! retrieval core only needs a full `(id, text)` read when rebuilding the
//! vector index. That read goes through [`KnowledgeCorpus`], chosen at
//! construction time — [`NullCorpus`] stands in when nothing is wired up.

use crate::error::Result;

/// One knowledge entry as seen by the retrieval core: the stable cross-store
/// join id plus the text to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub id: String,
    pub text: String,
}

/// Source of the full knowledge corpus.
pub trait KnowledgeCorpus {
    /// Every entry in the corpus.
    fn entries(&self) -> Result<Vec<CorpusEntry>>;
}

/// Always-empty corpus; the no-op default implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCorpus;

impl KnowledgeCorpus for NullCorpus {
    fn entries(&self) -> Result<Vec<CorpusEntry>> {
        Ok(Vec::new())
    }
}

/// In-memory corpus, mainly for tests and small fixed datasets.
#[derive(Debug, Clone, Default)]
pub struct StaticCorpus {
    entries: Vec<CorpusEntry>,
}

impl StaticCorpus {
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.entries.push(CorpusEntry {
            id: id.into(),
            text: text.into(),
        });
    }
}

impl KnowledgeCorpus for StaticCorpus {
    fn entries(&self) -> Result<Vec<CorpusEntry>> {
        Ok(self.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_corpus_is_empty() {
        assert!(NullCorpus.entries().expect("entries").is_empty());
    }

    #[test]
    fn static_corpus_returns_pushed_entries() {
        let mut corpus = StaticCorpus::default();
        corpus.push("a", "first entry");
        corpus.push("b", "second entry");
        let entries = corpus.entries().expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "a");
        assert_eq!(entries[1].text, "second entry");
    }

    #[test]
    fn static_corpus_from_prebuilt_entries() {
        let corpus = StaticCorpus::new(vec![CorpusEntry {
            id: "only".to_owned(),
            text: "a single entry".to_owned(),
        }]);
        assert_eq!(corpus.entries().expect("entries").len(), 1);
    }
}
