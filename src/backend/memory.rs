//! Process-local vector store.
//!
//! Collections live in a `HashMap` behind a `tokio::sync::RwLock` and vanish
//! with the process. Adding a document whose id already exists replaces it.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BackendError, BackendResult, HashEmbedder, Metadata, QueryResult, VectorStore};

#[derive(Debug, Clone)]
struct Record {
    id: String,
    document: String,
    metadata: Option<Metadata>,
    embedding: Vec<f32>,
}

#[derive(Debug, Default)]
struct Collection {
    records: Vec<Record>,
}

impl Collection {
    fn upsert(&mut self, record: Record) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }
}

/// In-memory [`VectorStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    embedder: HashEmbedder,
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(embedder: HashEmbedder) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of documents in a collection, or `None` if it does not exist.
    pub async fn collection_len(&self, collection: &str) -> Option<usize> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.records.len())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn query(
        &self,
        collection: &str,
        query_texts: &[String],
        n_results: usize,
    ) -> BackendResult<QueryResult> {
        let collections = self.collections.read().await;
        let records = &collections
            .get(collection)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))?
            .records;

        let mut result = QueryResult::default();

        for text in query_texts {
            let query = self.embedder.embed(text);

            let mut scored: Vec<(f32, &Record)> = records
                .iter()
                .map(|record| (super::cosine_distance(&query, &record.embedding), record))
                .collect();
            // Stable sort: equal distances keep insertion order
            scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            scored.truncate(n_results);

            result
                .ids
                .push(scored.iter().map(|(_, r)| r.id.clone()).collect());
            result
                .documents
                .push(scored.iter().map(|(_, r)| Some(r.document.clone())).collect());
            result
                .metadatas
                .push(scored.iter().map(|(_, r)| r.metadata.clone()).collect());
            result
                .distances
                .push(scored.iter().map(|(d, _)| *d).collect());
        }

        Ok(result)
    }

    async fn add_texts(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        metadatas: Option<&[Metadata]>,
    ) -> BackendResult<()> {
        if ids.len() != documents.len() {
            return Err(BackendError::InvalidResponse(format!(
                "{} ids for {} documents",
                ids.len(),
                documents.len()
            )));
        }

        let embeddings = self.embedder.embed_all(documents);

        let mut collections = self.collections.write().await;
        let target = collections.entry(collection.to_string()).or_default();

        for (index, (id, (document, embedding))) in ids
            .iter()
            .zip(documents.iter().zip(embeddings))
            .enumerate()
        {
            target.upsert(Record {
                id: id.clone(),
                document: document.clone(),
                metadata: metadatas.and_then(|m| m.get(index).cloned()),
                embedding,
            });
        }

        tracing::debug!(
            collection,
            added = documents.len(),
            total = target.records.len(),
            "Stored documents in memory"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn query_missing_collection() {
        let store = InMemoryStore::default();
        let err = store.query("nope", &strings(&["a"]), 1).await.unwrap_err();
        assert!(matches!(err, BackendError::CollectionNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn add_then_query_finds_exact_match() {
        let store = InMemoryStore::default();
        store
            .add_texts("c1", &strings(&["1", "2"]), &strings(&["a", "b"]), None)
            .await
            .unwrap();

        let result = store.query("c1", &strings(&["a"]), 1).await.unwrap();
        assert_eq!(result.ids, vec![strings(&["1"])]);
        assert_eq!(result.top_document(0), Some("a"));
        assert!(result.distances[0][0].abs() < 1e-5);
    }

    #[tokio::test]
    async fn results_are_ordered_and_truncated() {
        let store = InMemoryStore::default();
        store
            .add_texts(
                "c1",
                &strings(&["x", "y", "z"]),
                &strings(&["red apple", "green apple pie", "blue sky"]),
                None,
            )
            .await
            .unwrap();

        let result = store
            .query("c1", &strings(&["apple", "sky"]), 2)
            .await
            .unwrap();

        assert_eq!(result.ids.len(), 2);
        for distances in &result.distances {
            assert_eq!(distances.len(), 2);
            assert!(distances[0] <= distances[1]);
        }
        assert_eq!(result.top_document(1), Some("blue sky"));
    }

    #[tokio::test]
    async fn metadata_follows_documents() {
        let store = InMemoryStore::default();
        let mut meta = Metadata::new();
        meta.insert("source".into(), "unit".into());

        store
            .add_texts("c1", &strings(&["1"]), &strings(&["a"]), Some(&[meta.clone()]))
            .await
            .unwrap();

        let result = store.query("c1", &strings(&["a"]), 5).await.unwrap();
        assert_eq!(result.metadatas, vec![vec![Some(meta)]]);
    }

    #[tokio::test]
    async fn re_adding_an_id_replaces_it() {
        let store = InMemoryStore::default();
        store
            .add_texts("c1", &strings(&["1"]), &strings(&["old"]), None)
            .await
            .unwrap();
        store
            .add_texts("c1", &strings(&["1"]), &strings(&["new"]), None)
            .await
            .unwrap();

        assert_eq!(store.collection_len("c1").await, Some(1));
        let result = store.query("c1", &strings(&["new"]), 1).await.unwrap();
        assert_eq!(result.top_document(0), Some("new"));
    }
}
