//! Vector-database backends behind the MCP tools.
//!
//! The dispatcher only sees [`VectorStore`]. Two implementations exist:
//!
//! - [`ChromaStore`]: talks to a Chroma server over its REST API
//! - [`InMemoryStore`]: process-local collections, for tests and local runs
//!
//! Chroma's HTTP API stores and searches vectors but does not embed text, so
//! both stores embed documents and queries with the same [`HashEmbedder`].

mod chroma;
mod embedding;
mod error;
mod memory;

pub use chroma::ChromaStore;
pub use embedding::{cosine_distance, HashEmbedder};
pub use error::{BackendError, BackendResult};
pub use memory::InMemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{BackendKind, Config};

/// Free-form metadata attached to a document.
pub type Metadata = Map<String, Value>;

/// Result of a similarity query.
///
/// Every field holds one inner list per query text, ordered by ascending
/// distance. This is the shape Chroma returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matching document ids.
    pub ids: Vec<Vec<String>>,
    /// Matching document texts.
    pub documents: Vec<Vec<Option<String>>>,
    /// Matching document metadata.
    pub metadatas: Vec<Vec<Option<Metadata>>>,
    /// Cosine distances to the query text.
    pub distances: Vec<Vec<f32>>,
}

impl QueryResult {
    /// Returns the best match's document for the given query text index.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn top_document(&self, query_index: usize) -> Option<&str> {
        self.documents
            .get(query_index)?
            .first()?
            .as_deref()
    }
}

/// Operations the MCP tools need from a vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Finds the `n_results` nearest documents to each query text.
    ///
    /// # Errors
    ///
    /// Fails if the collection does not exist or the backend is unreachable.
    async fn query(
        &self,
        collection: &str,
        query_texts: &[String],
        n_results: usize,
    ) -> BackendResult<QueryResult>;

    /// Adds documents to a collection, creating the collection if needed.
    ///
    /// `ids` and `metadatas` (when present) have one entry per document.
    ///
    /// # Errors
    ///
    /// Fails if the backend rejects the write or is unreachable.
    async fn add_texts(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        metadatas: Option<&[Metadata]>,
    ) -> BackendResult<()>;
}

/// Builds the store selected by the configuration.
///
/// # Errors
///
/// Returns an error if the Chroma client cannot be constructed.
pub fn from_config(config: &Config) -> BackendResult<Arc<dyn VectorStore>> {
    let embedder = HashEmbedder::new(config.embedding.dimension);
    let dimension = embedder.dimension();

    match config.backend {
        BackendKind::Chroma => {
            let store = ChromaStore::new(&config.chroma, embedder)?;
            tracing::info!(url = %store.base_url(), dimension, "Using Chroma backend");
            Ok(Arc::new(store))
        }
        BackendKind::Memory => {
            tracing::info!(dimension, "Using in-memory backend");
            Ok(Arc::new(InMemoryStore::new(embedder)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_document_of_empty_result() {
        let result = QueryResult::default();
        assert_eq!(result.top_document(0), None);
    }

    #[test]
    fn top_document_picks_first_match() {
        let result = QueryResult {
            ids: vec![vec!["1".into(), "2".into()]],
            documents: vec![vec![Some("a".into()), Some("b".into())]],
            metadatas: vec![vec![None, None]],
            distances: vec![vec![0.0, 0.5]],
        };
        assert_eq!(result.top_document(0), Some("a"));
        assert_eq!(result.top_document(1), None);
    }

    #[test]
    fn builds_memory_store_from_config() {
        let mut config = Config::default();
        config.backend = BackendKind::Memory;
        assert!(from_config(&config).is_ok());
    }

    #[test]
    fn builds_chroma_store_from_config() {
        let config = Config::default();
        assert!(from_config(&config).is_ok());
    }
}
