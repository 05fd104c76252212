//! Typed parameters for the Chroma tools.
//!
//! Each tool is reachable both as a direct method (`tools/query`,
//! `tools/add_texts`) and through `tools/call` by tool name
//! (`chroma.query`, `chroma.add_texts`). Both paths validate through
//! [`ToolParams::parse`].

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::backend::Metadata;

/// Number of results returned by `chroma.query` when the client sends none.
pub const DEFAULT_N_RESULTS: usize = 10;

/// The tools exposed by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Similarity query against a collection.
    Query,
    /// Add documents to a collection, creating it if needed.
    AddTexts,
}

impl Tool {
    /// Every tool, in the order `tools/list` reports them.
    pub const ALL: [Self; 2] = [Self::Query, Self::AddTexts];

    /// Name used by `tools/call` and `tools/list`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Query => "chroma.query",
            Self::AddTexts => "chroma.add_texts",
        }
    }

    /// Direct JSON-RPC method for this tool.
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::Query => "tools/query",
            Self::AddTexts => "tools/add_texts",
        }
    }

    /// Resolves a `tools/call` name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Human-readable description for `tools/list`.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Query => "Query documents from a Chroma collection",
            Self::AddTexts => "Add documents to a Chroma collection",
        }
    }

    /// JSON Schema of the tool's arguments.
    #[must_use]
    pub fn input_schema(self) -> Value {
        match self {
            Self::Query => json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Name of the collection to query"
                    },
                    "query_texts": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Texts to find similar documents for"
                    },
                    "n_results": {
                        "type": "integer",
                        "minimum": 1,
                        "default": DEFAULT_N_RESULTS,
                        "description": "Number of results per query text"
                    }
                },
                "required": ["collection", "query_texts"]
            }),
            Self::AddTexts => json!({
                "type": "object",
                "properties": {
                    "collection": {
                        "type": "string",
                        "description": "Name of the collection (created if missing)"
                    },
                    "documents": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Documents to add"
                    },
                    "metadatas": {
                        "type": "array",
                        "items": { "type": "object" },
                        "description": "Optional metadata, one object per document"
                    },
                    "ids": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional ids, one per document (generated if omitted)"
                    }
                },
                "required": ["collection", "documents"]
            }),
        }
    }
}

/// Parameter validation failure, reported as JSON-RPC `-32602`.
#[derive(Debug, Error)]
pub enum ParamsError {
    /// `params` was absent or not a JSON object.
    #[error("params must be a JSON object")]
    NotAnObject,

    /// A required field is missing or has the wrong type.
    #[error("{0}")]
    Shape(#[from] serde_json::Error),

    /// A field is well-typed but violates a constraint.
    #[error("{field}: {reason}")]
    Field {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ParamsError {
    fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Field {
            field,
            reason: reason.into(),
        }
    }

    /// Returns the offending field, when the failure is field-specific.
    #[must_use]
    pub const fn field_name(&self) -> Option<&'static str> {
        match self {
            Self::Field { field, .. } => Some(field),
            Self::NotAnObject | Self::Shape(_) => None,
        }
    }
}

/// Parameters of `chroma.query`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryParams {
    /// Collection to search.
    pub collection: String,
    /// Texts to find neighbours for.
    pub query_texts: Vec<String>,
    /// Results per query text.
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

const fn default_n_results() -> usize {
    DEFAULT_N_RESULTS
}

impl QueryParams {
    fn validate(&self) -> Result<(), ParamsError> {
        validate_collection(&self.collection)?;
        if self.query_texts.is_empty() {
            return Err(ParamsError::field(
                "query_texts",
                "must contain at least one text",
            ));
        }
        if self.n_results == 0 {
            return Err(ParamsError::field("n_results", "must be at least 1"));
        }
        Ok(())
    }
}

/// Parameters of `chroma.add_texts`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddTextsParams {
    /// Collection to add to.
    pub collection: String,
    /// Documents, in order.
    pub documents: Vec<String>,
    /// Optional metadata, one per document.
    #[serde(default)]
    pub metadatas: Option<Vec<Metadata>>,
    /// Optional ids, one per document.
    #[serde(default)]
    pub ids: Option<Vec<String>>,
}

impl AddTextsParams {
    fn validate(&self) -> Result<(), ParamsError> {
        validate_collection(&self.collection)?;

        let count = self.documents.len();
        if count == 0 {
            return Err(ParamsError::field(
                "documents",
                "must contain at least one document",
            ));
        }

        if let Some(metadatas) = &self.metadatas {
            if metadatas.len() != count {
                return Err(ParamsError::field(
                    "metadatas",
                    format!(
                        "expected {count} entries (one per document), got {}",
                        metadatas.len()
                    ),
                ));
            }
        }

        if let Some(ids) = &self.ids {
            if ids.len() != count {
                return Err(ParamsError::field(
                    "ids",
                    format!("expected {count} entries (one per document), got {}", ids.len()),
                ));
            }
            let mut seen = HashSet::with_capacity(ids.len());
            if let Some(duplicate) = ids.iter().find(|id| !seen.insert(id.as_str())) {
                return Err(ParamsError::field(
                    "ids",
                    format!("duplicate id '{duplicate}'"),
                ));
            }
        }

        Ok(())
    }

    /// Returns the client's ids, or fresh UUIDs when none were sent.
    #[must_use]
    pub fn document_ids(&self) -> Vec<String> {
        self.ids.clone().unwrap_or_else(|| {
            self.documents
                .iter()
                .map(|_| uuid::Uuid::new_v4().to_string())
                .collect()
        })
    }
}

fn validate_collection(collection: &str) -> Result<(), ParamsError> {
    if collection.trim().is_empty() {
        return Err(ParamsError::field("collection", "must not be empty"));
    }
    Ok(())
}

/// Validated parameters for one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolParams {
    /// `chroma.query` / `tools/query`.
    Query(QueryParams),
    /// `chroma.add_texts` / `tools/add_texts`.
    AddTexts(AddTextsParams),
}

impl ToolParams {
    /// Validates `params` for `tool`.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamsError`] if `params` is not an object, a required
    /// field is missing or mistyped, or a field violates its constraints.
    pub fn parse(tool: Tool, params: Option<&Value>) -> Result<Self, ParamsError> {
        match tool {
            Tool::Query => {
                let params: QueryParams = from_object(params)?;
                params.validate()?;
                Ok(Self::Query(params))
            }
            Tool::AddTexts => {
                let params: AddTextsParams = from_object(params)?;
                params.validate()?;
                Ok(Self::AddTexts(params))
            }
        }
    }

    /// The tool these parameters belong to.
    #[must_use]
    pub const fn tool(&self) -> Tool {
        match self {
            Self::Query(_) => Tool::Query,
            Self::AddTexts(_) => Tool::AddTexts,
        }
    }
}

fn from_object<T: DeserializeOwned>(params: Option<&Value>) -> Result<T, ParamsError> {
    match params {
        Some(value @ Value::Object(_)) => Ok(T::deserialize(value)?),
        _ => Err(ParamsError::NotAnObject),
    }
}
