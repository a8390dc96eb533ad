//! Document retrieval
//!
//! The retriever plays two roles in a request: expansion asks it for the
//! documents matching a derived search term, and the fan-out asks it for an
//! answer of its own alongside the network agents.

use crate::error::Result;
use async_trait::async_trait;
use sensemaker_llm::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::RwLock;
use uuid::Uuid;

/// A document matched by a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Document id
    pub id: String,
    /// Document text
    pub content: String,
    /// Relevance; higher is better
    pub score: f32,
}

/// Document search and lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `limit` documents matching `term`, best first
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<RetrievedDocument>>;

    /// Answer `query` from the indexed documents; empty when nothing matches
    async fn answer(&self, query: &str, context: &[Message]) -> Result<String>;
}

struct IndexedDocument {
    id: String,
    content: String,
    terms: HashSet<String>,
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// In-process index ranking documents by query term overlap
pub struct DocumentIndex {
    documents: RwLock<Vec<IndexedDocument>>,
    answer_limit: usize,
}

impl Default for DocumentIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
            answer_limit: 2,
        }
    }

    /// Add a document and return its id
    pub fn ingest(&self, content: impl Into<String>) -> String {
        self.ingest_with_id(Uuid::new_v4().to_string(), content)
    }

    /// Add or replace a document under a known id
    pub fn ingest_with_id(&self, id: impl Into<String>, content: impl Into<String>) -> String {
        let id = id.into();
        let content = content.into();
        let document = IndexedDocument {
            id: id.clone(),
            terms: tokenize(&content),
            content,
        };

        let mut documents = self.documents.write().unwrap_or_else(|e| e.into_inner());
        documents.retain(|d| d.id != id);
        documents.push(document);
        id
    }

    /// Indexed documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing is indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rank(&self, text: &str, limit: usize) -> Vec<RetrievedDocument> {
        let wanted = tokenize(text);
        if wanted.is_empty() {
            return Vec::new();
        }

        let documents = self.documents.read().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<RetrievedDocument> = documents
            .iter()
            .filter_map(|d| {
                let overlap = d.terms.intersection(&wanted).count();
                (overlap > 0).then(|| RetrievedDocument {
                    id: d.id.clone(),
                    content: d.content.clone(),
                    score: overlap as f32 / wanted.len() as f32,
                })
            })
            .collect();

        // Stable sort keeps ingestion order among equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        hits
    }
}

#[async_trait]
impl Retriever for DocumentIndex {
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<RetrievedDocument>> {
        Ok(self.rank(term, limit))
    }

    async fn answer(&self, query: &str, _context: &[Message]) -> Result<String> {
        let hits = self.rank(query, self.answer_limit);
        Ok(hits
            .into_iter()
            .map(|d| d.content)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
