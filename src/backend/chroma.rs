//! Chroma REST client.
//!
//! Speaks the Chroma v2 HTTP API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | get collection | `GET  {base}/collections/{name}` |
//! | create-or-get | `POST {base}/collections` with `get_or_create: true` |
//! | add | `POST {base}/collections/{id}/add` |
//! | query | `POST {base}/collections/{id}/query` |
//!
//! where `{base}` is `{scheme}://{host}:{port}/api/v2/tenants/{tenant}/databases/{database}`.
//! Embeddings are computed client-side; collections are created in cosine
//! space to match the embedder.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{BackendError, BackendResult, HashEmbedder, Metadata, QueryResult, VectorStore};
use crate::config::ChromaConfig;

/// Fields requested from `query`.
const QUERY_INCLUDE: [&str; 3] = ["documents", "metadatas", "distances"];

/// A Chroma collection as returned by the API.
#[derive(Debug, Clone, Deserialize)]
struct CollectionModel {
    id: String,
    name: String,
}

/// Body of `POST .../add`.
#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    ids: &'a [String],
    embeddings: Vec<Vec<f32>>,
    documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    metadatas: Option<&'a [Metadata]>,
}

/// Body of `POST .../query`.
#[derive(Debug, Serialize)]
struct QueryRequest {
    query_embeddings: Vec<Vec<f32>>,
    n_results: usize,
    include: [&'static str; 3],
}

/// Response of `POST .../query`. Excluded fields come back as `null`.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl QueryResponse {
    fn into_result(self) -> QueryResult {
        let shape: Vec<usize> = self.ids.iter().map(Vec::len).collect();

        QueryResult {
            documents: self
                .documents
                .unwrap_or_else(|| shape.iter().map(|&n| vec![None; n]).collect()),
            metadatas: self
                .metadatas
                .unwrap_or_else(|| shape.iter().map(|&n| vec![None; n]).collect()),
            distances: self.distances.map_or_else(
                || shape.iter().map(|&n| vec![f32::NAN; n]).collect(),
                |rows| {
                    rows.into_iter()
                        .map(|row| row.into_iter().map(|d| d.unwrap_or(f32::NAN)).collect())
                        .collect()
                },
            ),
            ids: self.ids,
        }
    }
}

/// [`VectorStore`] backed by a Chroma server.
#[derive(Debug, Clone)]
pub struct ChromaStore {
    http: Client,
    base: Url,
    embedder: HashEmbedder,
}

impl ChromaStore {
    /// Creates a client for the configured Chroma server.
    ///
    /// No request is made until the first tool call.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: &ChromaConfig, embedder: HashEmbedder) -> BackendResult<Self> {
        let base = Url::parse(&config.base_url())
            .map_err(|e| BackendError::Config(format!("invalid Chroma URL: {e}")))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        let mut store = Self {
            http,
            base,
            embedder,
        };
        store.base = store.endpoint(&[
            "api",
            "v2",
            "tenants",
            config.tenant.as_str(),
            "databases",
            config.database.as_str(),
        ])?;

        Ok(store)
    }

    /// Base URL of the tenant/database all requests go to.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::Config(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_collection(&self, name: &str) -> BackendResult<CollectionModel> {
        let url = self.endpoint(&["collections", name])?;
        let response = self.http.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::CollectionNotFound(name.to_string()));
        }

        let collection: CollectionModel = check(response).await?.json().await?;
        Ok(collection)
    }

    async fn get_or_create_collection(&self, name: &str) -> BackendResult<CollectionModel> {
        let url = self.endpoint(&["collections"])?;
        let body = json!({
            "name": name,
            "get_or_create": true,
            "metadata": { "hnsw:space": "cosine" },
        });

        let response = self.http.post(url).json(&body).send().await?;
        let collection: CollectionModel = check(response).await?.json().await?;
        Ok(collection)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn query(
        &self,
        collection: &str,
        query_texts: &[String],
        n_results: usize,
    ) -> BackendResult<QueryResult> {
        let target = self.get_collection(collection).await?;
        tracing::debug!(collection, id = %target.id, "Resolved Chroma collection");

        let url = self.endpoint(&["collections", target.id.as_str(), "query"])?;
        let body = QueryRequest {
            query_embeddings: self.embedder.embed_all(query_texts),
            n_results,
            include: QUERY_INCLUDE,
        };

        let response = self.http.post(url).json(&body).send().await?;
        let parsed: QueryResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        Ok(parsed.into_result())
    }

    async fn add_texts(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        metadatas: Option<&[Metadata]>,
    ) -> BackendResult<()> {
        let target = self.get_or_create_collection(collection).await?;
        tracing::debug!(
            collection = %target.name,
            id = %target.id,
            "Resolved Chroma collection"
        );

        let url = self.endpoint(&["collections", target.id.as_str(), "add"])?;
        let body = AddRequest {
            ids,
            embeddings: self.embedder.embed_all(documents),
            documents,
            metadatas,
        };

        let response = self.http.post(url).json(&body).send().await?;
        check(response).await?;
        Ok(())
    }
}

/// Turns a non-success response into [`BackendError::Api`].
async fn check(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(BackendError::Api {
        status: status.as_u16(),
        message: error_message(&text),
    })
}

/// Extracts Chroma's `message`/`error` field, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error", "detail"]
                .iter()
                .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
