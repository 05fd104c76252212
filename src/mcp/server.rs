//! MCP request dispatcher for the Chroma tools.
//!
//! The server is stateless: every POST body is parsed, dispatched and answered
//! on its own, so one [`McpServer`] is shared by all connections without
//! locking. The `initialize` handshake is answered but not enforced.
//!
//! # Methods
//!
//! | Method | Result |
//! |--------|--------|
//! | `initialize` | protocol version, server info, capabilities |
//! | `ping` | `{}` |
//! | `tools/list` | `chroma.query`, `chroma.add_texts` |
//! | `tools/call` | same as the direct tool method |
//! | `tools/query` | Chroma-shaped query result |
//! | `tools/add_texts` | `{"status": "ok", "count": N}` |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::VectorStore;
use crate::mcp::params::{ParamsError, Tool, ToolParams};
use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcReply,
    JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};

/// `capabilities` member of the `initialize` result.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool support.
    pub tools: ToolCapabilities,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: ToolCapabilities {
                supported: true,
                list_changed: true,
            },
        }
    }
}

/// Tool support flags.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCapabilities {
    /// Whether tools are offered at all.
    pub supported: bool,
    /// Advertised as true.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// `serverInfo` member of the `initialize` result.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `clientInfo` sent by the client; only logged.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// `initialize` params.
///
/// Only read for logging; `initialize` succeeds whatever the client sends.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Version the client asked for. The reply always carries ours.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// One entry of the `tools/list` result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Shown to the model choosing a tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the `arguments` object.
    pub input_schema: Value,
}

impl From<Tool> for ToolDefinition {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: Some(tool.description().to_string()),
            input_schema: tool.input_schema(),
        }
    }
}

/// `tools/call` params.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// `chroma.query` or `chroma.add_texts`.
    pub name: String,
    /// Arguments for the tool. Absent arguments are treated as `{}`.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// The request methods this server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `initialize`
    Initialize,
    /// `ping`
    Ping,
    /// `tools/list`
    ToolsList,
    /// `tools/call`
    ToolsCall,
    /// `tools/query` or `tools/add_texts`
    Tool(Tool),
}

impl Method {
    /// Resolves a JSON-RPC method name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "initialize" => Some(Self::Initialize),
            "ping" => Some(Self::Ping),
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            other => Tool::ALL
                .into_iter()
                .find(|tool| tool.method() == other)
                .map(Self::Tool),
        }
    }

    /// The JSON-RPC method name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::Tool(tool) => tool.method(),
        }
    }
}

/// The MCP server exposing a vector store as tools.
pub struct McpServer {
    info: ServerInfo,
    capabilities: ServerCapabilities,
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("info", &self.info)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl McpServer {
    /// Creates a server backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            info: ServerInfo::default(),
            capabilities: ServerCapabilities::default(),
            store,
        }
    }

    /// Handles one raw message body.
    ///
    /// Returns `None` when nothing must be sent back, which is the case for
    /// every notification, well-formed or not.
    pub async fn handle_message(&self, body: &[u8]) -> Option<JsonRpcReply> {
        match parse_message(body) {
            Ok(IncomingMessage::Request(req)) => Some(self.handle_request(req).await),
            Ok(IncomingMessage::Notification(notif)) => {
                Self::handle_notification(&notif);
                None
            }
            Err(malformed) => {
                tracing::debug!(
                    code = malformed.error.code(),
                    message = %malformed.error.error.message,
                    notification = malformed.notification,
                    "Rejected malformed message"
                );
                malformed.into_reply().map(JsonRpcReply::from)
            }
        }
    }

    /// Routes a request by method name.
    pub async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcReply {
        let Some(method) = Method::from_name(&req.method) else {
            tracing::debug!(id = %req.id, method = %req.method, "Unknown method");
            return JsonRpcError::method_not_found(req.id, &req.method).into();
        };

        tracing::debug!(id = %req.id, method = method.name(), "Handling request");

        let response = match method {
            Method::Initialize => Ok(self.handle_initialize(&req)),
            Method::Ping => Ok(Self::handle_ping(&req)),
            Method::ToolsList => Ok(Self::handle_tools_list(&req)),
            Method::ToolsCall => self.handle_tools_call(&req).await,
            Method::Tool(tool) => self.call_tool(&req.id, tool, req.params.as_ref()).await,
        };

        match response {
            Ok(resp) => resp.into(),
            Err(error) => {
                tracing::debug!(
                    id = %req.id,
                    method = method.name(),
                    code = error.code(),
                    "Request failed"
                );
                error.into()
            }
        }
    }

    /// Logs a notification. Nothing is executed.
    ///
    /// Notifications never run tools.
    pub fn handle_notification(notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => tracing::debug!("Client initialised"),
            "notifications/cancelled" => {
                tracing::debug!(params = ?notif.params, "Client cancelled a request");
            }
            other => tracing::warn!(method = other, "Ignoring unsupported notification"),
        }
    }

    /// Reports protocol version, capabilities and server info.
    fn handle_initialize(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let params: InitializeParams = req
            .params
            .as_ref()
            .and_then(|p| InitializeParams::deserialize(p).ok())
            .unwrap_or_default();

        tracing::info!(
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            client_version = params
                .client_info
                .as_ref()
                .and_then(|c| c.version.as_deref())
                .unwrap_or("unknown"),
            requested_version = params.protocol_version.as_deref().unwrap_or("none"),
            "Client initialising"
        );

        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": self.capabilities,
            "serverInfo": self.info,
        });

        JsonRpcResponse::success(req.id.clone(), result)
    }

    /// Replies with an empty object.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Lists both tools with their input schemas.
    fn handle_tools_list(req: &JsonRpcRequest) -> JsonRpcResponse {
        let result = json!({
            "tools": Self::get_tool_definitions(),
        });

        JsonRpcResponse::success(req.id.clone(), result)
    }

    /// Runs a tool by its `chroma.*` name.
    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ToolCallParams = match req.params.as_ref() {
            Some(p @ Value::Object(_)) => ToolCallParams::deserialize(p).map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid tool call params: {e}"),
                )
            })?,
            _ => {
                return Err(JsonRpcError::invalid_params(
                    req.id.clone(),
                    ParamsError::NotAnObject.to_string(),
                ));
            }
        };

        let Some(tool) = Tool::from_name(&params.name) else {
            return Err(JsonRpcError::method_not_found(
                req.id.clone(),
                &format!("tools/call (unknown tool '{}')", params.name),
            ));
        };

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        self.call_tool(&req.id, tool, Some(&arguments)).await
    }

    /// Validates `params` and runs `tool` against the store.
    async fn call_tool(
        &self,
        id: &RequestId,
        tool: Tool,
        params: Option<&Value>,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let params = ToolParams::parse(tool, params).map_err(|e| params_error(id, &e))?;
        tracing::debug!(id = %id, tool = params.tool().name(), "Calling tool");

        let result = match params {
            ToolParams::Query(query) => {
                let result = self
                    .store
                    .query(&query.collection, &query.query_texts, query.n_results)
                    .await
                    .map_err(|e| {
                        tracing::warn!(collection = %query.collection, error = %e, "Query failed");
                        JsonRpcError::tool_execution(id.clone(), e)
                    })?;

                tracing::info!(
                    collection = %query.collection,
                    queries = query.query_texts.len(),
                    n_results = query.n_results,
                    "Query completed"
                );

                serde_json::to_value(&result).map_err(|e| {
                    tracing::error!(error = %e, "Failed to serialise query result");
                    JsonRpcError::internal_error(
                        id.clone(),
                        "Internal error: failed to serialise result",
                    )
                })?
            }
            ToolParams::AddTexts(add) => {
                let ids = add.document_ids();
                self.store
                    .add_texts(
                        &add.collection,
                        &ids,
                        &add.documents,
                        add.metadatas.as_deref(),
                    )
                    .await
                    .map_err(|e| {
                        tracing::warn!(collection = %add.collection, error = %e, "Add failed");
                        JsonRpcError::tool_execution(id.clone(), e)
                    })?;

                tracing::info!(
                    collection = %add.collection,
                    count = ids.len(),
                    "Documents added"
                );

                json!({ "status": "ok", "count": ids.len() })
            }
        };

        Ok(JsonRpcResponse::success(id.clone(), result))
    }

    /// Definitions in [`Tool::ALL`] order.
    fn get_tool_definitions() -> Vec<ToolDefinition> {
        Tool::ALL.into_iter().map(ToolDefinition::from).collect()
    }
}

/// Maps a parameter failure to `-32602`, naming the field when known.
fn params_error(id: &RequestId, error: &ParamsError) -> JsonRpcError {
    let mut reply = JsonRpcError::invalid_params(id.clone(), error.to_string());
    if let Some(field) = error.field_name() {
        reply.error = reply.error.with_data(json!({ "field": field }));
    }
    reply
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::backend::{
        BackendError, BackendResult, HashEmbedder, InMemoryStore, Metadata, QueryResult,
    };

    struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn query(&self, _: &str, _: &[String], _: usize) -> BackendResult<QueryResult> {
            Err(BackendError::Api {
                status: 500,
                message: "boom".to_string(),
            })
        }

        async fn add_texts(
            &self,
            _: &str,
            _: &[String],
            _: &[String],
            _: Option<&[Metadata]>,
        ) -> BackendResult<()> {
            Err(BackendError::Api {
                status: 500,
                message: "boom".to_string(),
            })
        }
    }

    fn server() -> McpServer {
        McpServer::new(Arc::new(InMemoryStore::new(HashEmbedder::new(64))))
    }

    async fn call(server: &McpServer, body: Value) -> Option<JsonRpcReply> {
        server.handle_message(body.to_string().as_bytes()).await
    }

    async fn request(server: &McpServer, method: &str, params: Value) -> JsonRpcReply {
        call(
            server,
            json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}),
        )
        .await
        .unwrap()
    }

    #[test]
    fn method_names_round_trip() {
        for method in [
            Method::Initialize,
            Method::Ping,
            Method::ToolsList,
            Method::ToolsCall,
            Method::Tool(Tool::Query),
            Method::Tool(Tool::AddTexts),
        ] {
            assert_eq!(Method::from_name(method.name()), Some(method));
        }
        assert_eq!(Method::from_name("chroma.query"), None);
        assert_eq!(Method::from_name("notifications/initialized"), None);
    }

    #[test]
    fn tool_definitions_valid() {
        let tools = McpServer::get_tool_definitions();
        assert_eq!(tools.len(), 2);

        for tool in &tools {
            assert!(!tool.name.is_empty());
            assert!(tool.input_schema.is_object());
        }
    }

    #[tokio::test]
    async fn initialize_ignores_params() {
        let server = server();
        for params in [json!({}), json!({"protocolVersion": 42}), Value::Null] {
            let reply = request(&server, "initialize", params).await;
            let result = reply.result().unwrap();
            assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
            assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
            assert_eq!(result["capabilities"]["tools"]["supported"], true);
            assert_eq!(result["capabilities"]["tools"]["listChanged"], true);
        }
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let reply = request(&server(), "ping", Value::Null).await;
        assert_eq!(reply.result(), Some(&json!({})));
    }

    #[tokio::test]
    async fn notifications_produce_no_reply() {
        let server = server();
        for method in [
            "notifications/initialized",
            "notifications/cancelled",
            "tools/add_texts",
        ] {
            let reply = call(
                &server,
                json!({
                    "jsonrpc": "2.0",
                    "method": method,
                    "params": {"collection": "c", "documents": ["x"]}
                }),
            )
            .await;
            assert!(reply.is_none(), "{method}");
        }
    }

    #[tokio::test]
    async fn notification_never_runs_tools() {
        let store = Arc::new(InMemoryStore::default());
        let server = McpServer::new(store.clone());

        let reply = call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "method": "tools/add_texts",
                "params": {"collection": "c", "documents": ["x"]}
            }),
        )
        .await;

        assert!(reply.is_none());
        assert_eq!(store.collection_len("c").await, None);
    }

    #[tokio::test]
    async fn unknown_method_echoes_id() {
        let reply = request(&server(), "resources/list", json!({})).await;
        let error = reply.error().unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found: resources/list");
        assert_eq!(reply.id(), Some(&RequestId::from(1)));
    }

    #[tokio::test]
    async fn malformed_body_replies_with_null_id() {
        let reply = server().handle_message(b"{not json").await.unwrap();
        assert_eq!(reply.error().unwrap().code, -32700);
        assert_eq!(reply.id(), None);
    }

    #[tokio::test]
    async fn malformed_notification_is_silent() {
        let reply = call(&server(), json!({"jsonrpc": "1.0", "method": "ping"})).await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn add_then_query() {
        let server = server();

        let reply = request(
            &server,
            "tools/add_texts",
            json!({"collection": "c1", "documents": ["a", "b"]}),
        )
        .await;
        assert_eq!(reply.result(), Some(&json!({"status": "ok", "count": 2})));

        let reply = request(
            &server,
            "tools/query",
            json!({"collection": "c1", "query_texts": ["a"], "n_results": 1}),
        )
        .await;
        let result = reply.result().unwrap();
        assert_eq!(result["documents"], json!([["a"]]));
        assert_eq!(result["ids"][0].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_params_name_the_field() {
        let reply = request(
            &server(),
            "tools/query",
            json!({"collection": "c1", "query_texts": ["a"], "n_results": 0}),
        )
        .await;

        let error = reply.error().unwrap();
        assert_eq!(error.code, -32602);
        assert!(error.message.starts_with("n_results"));
        assert_eq!(error.data, Some(json!({"field": "n_results"})));
    }

    #[tokio::test]
    async fn missing_params_are_invalid() {
        let reply = request(&server(), "tools/add_texts", Value::Null).await;
        let error = reply.error().unwrap();
        assert_eq!(error.code, -32602);
        assert_eq!(error.message, "params must be a JSON object");
    }

    #[tokio::test]
    async fn query_of_missing_collection_is_tool_error() {
        let reply = request(
            &server(),
            "tools/query",
            json!({"collection": "nope", "query_texts": ["a"]}),
        )
        .await;

        let error = reply.error().unwrap();
        assert_eq!(error.code, -32000);
        assert!(error.message.starts_with("Tool execution error: "));
    }

    #[tokio::test]
    async fn backend_failure_is_tool_error() {
        let server = McpServer::new(Arc::new(FailingStore));
        let reply = request(
            &server,
            "tools/add_texts",
            json!({"collection": "c", "documents": ["x"]}),
        )
        .await;

        let error = reply.error().unwrap();
        assert_eq!(error.code, -32000);
        assert!(error.message.contains("boom"));
    }

    #[tokio::test]
    async fn tools_list_reports_both_tools() {
        let reply = request(&server(), "tools/list", Value::Null).await;
        let tools = reply.result().unwrap()["tools"].as_array().unwrap().clone();

        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, ["chroma.query", "chroma.add_texts"]);
        assert_eq!(
            tools[0]["inputSchema"]["required"],
            json!(["collection", "query_texts"])
        );
    }

    #[tokio::test]
    async fn tools_call_matches_direct_method() {
        let server = server();
        let args = json!({"collection": "c1", "documents": ["x"], "ids": ["id-1"]});

        let direct = request(&server, "tools/add_texts", args.clone()).await;
        let via_call = request(
            &server,
            "tools/call",
            json!({"name": "chroma.add_texts", "arguments": args}),
        )
        .await;
        assert_eq!(direct.result(), via_call.result());

        let query = json!({"collection": "c1", "query_texts": ["x"]});
        let direct = request(&server, "tools/query", query.clone()).await;
        let via_call = request(
            &server,
            "tools/call",
            json!({"name": "chroma.query", "arguments": query}),
        )
        .await;
        assert_eq!(direct.result(), via_call.result());
    }

    #[tokio::test]
    async fn tools_call_unknown_tool() {
        let reply = request(&server(), "tools/call", json!({"name": "chroma.delete"})).await;
        let error = reply.error().unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(
            error.message,
            "Method not found: tools/call (unknown tool 'chroma.delete')"
        );
    }

    #[tokio::test]
    async fn tools_call_requires_name() {
        let server = server();
        for params in [json!({"arguments": {}}), json!({"name": 7}), json!([1])] {
            let reply = request(&server, "tools/call", params).await;
            assert_eq!(reply.error().unwrap().code, -32602);
        }
    }

    #[tokio::test]
    async fn tools_call_without_arguments_validates_them() {
        let reply = request(&server(), "tools/call", json!({"name": "chroma.query"})).await;
        let error = reply.error().unwrap();
        assert_eq!(error.code, -32602);
        assert!(error.message.contains("collection"));
    }
}
