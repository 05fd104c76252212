//! JSON-RPC 2.0 envelopes carried in HTTP bodies.
//!
//! This module defines the envelope types exchanged over the HTTP transport.
//! One POST body holds exactly one message. Batches are not supported.
//!
//! # Message Types
//!
//! - **Request**: carries an `id`; answered with exactly one reply
//! - **Reply**: a `result` or an `error`, echoing the request `id`
//! - **Notification**: has no `id` key; never answered, even when malformed
//!
//! The request/notification split is decided once, in [`parse_message`], so
//! downstream code cannot produce a reply for a notification.
//!
//! # MCP-Specific Constraints
//!
//! - An `id` is a string or a number, echoed exactly; `null` is rejected
//! - The `jsonrpc` member is optional, but must be `"2.0"` when present

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Protocol version reported by `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// `serverInfo.name` reported by `initialize`.
pub const SERVER_NAME: &str = "chroma-mcp-http-server";

/// The only JSON-RPC version accepted.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request ID.
///
/// Echoed verbatim in the reply. Numbers keep their JSON form, so `1.0`
/// and integers beyond `i64` come back as they were sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(Number),
    /// String request ID.
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A message that must be answered.
///
/// Requests expect exactly one response from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    /// Unique request identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Method parameters; `null` is stored as `None`.
    pub params: Option<Value>,
}

/// A message without an `id`.
///
/// Notifications do not have an ID and never receive a response.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcNotification {
    /// The notification method.
    pub method: String,

    /// Notification parameters, if any.
    pub params: Option<Value>,
}

/// A `result` reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// Echo of the request `id`.
    pub id: RequestId,

    /// Method output.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Wraps `result` in a reply to `id`.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// JSON-RPC 2.0 error codes used by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// `-32700`: unparseable body, or no usable `method`.
    ParseError,
    /// `-32600`: not an object, bad `id`, bad `jsonrpc`, empty `method`.
    InvalidRequest,
    /// `-32601`: unknown method or tool.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// The vector-database backend failed to execute a tool.
    ToolExecution,
}

impl ErrorCode {
    /// Numeric code placed in `error.code`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ToolExecution => -32000,
        }
    }

    /// Generic message for the code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ToolExecution => "Tool execution error",
        }
    }
}

/// The `error` member of an error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// Human-readable description.
    pub message: String,

    /// Structured detail, such as the offending parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Builds an error object with `message`.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches `data`.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An `error` reply.
///
/// The `id` serialises as `null` when it could not be recovered from the
/// inbound message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// Echo of the request `id`, or `None` when it could not be read.
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Builds an error reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error,
        }
    }

    /// Creates a parse error response.
    #[must_use]
    pub fn parse_error(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::ParseError, message),
        )
    }

    /// `-32600` reply.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, message),
        )
    }

    /// `-32601` reply naming `method`.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// `-32602` reply.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates a tool execution error response.
    #[must_use]
    pub fn tool_execution(id: RequestId, message: impl std::fmt::Display) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::ToolExecution,
                format!("{}: {message}", ErrorCode::ToolExecution.default_message()),
            ),
        )
    }

    /// `-32603` reply.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }

    /// Returns the numeric error code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.error.code
    }
}

/// Any reply the server writes back for a request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcReply {
    /// A `result` reply.
    Success(JsonRpcResponse),
    /// An `error` reply.
    Error(JsonRpcError),
}

impl JsonRpcReply {
    /// Returns the ID echoed in this reply, if any.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Success(resp) => Some(&resp.id),
            Self::Error(err) => err.id.as_ref(),
        }
    }

    /// Returns the error object if this is an error reply.
    #[must_use]
    pub const fn error(&self) -> Option<&JsonRpcErrorData> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(&err.error),
        }
    }

    /// Returns the result if this is a success reply.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(resp) => Some(&resp.result),
            Self::Error(_) => None,
        }
    }
}

impl From<JsonRpcResponse> for JsonRpcReply {
    fn from(resp: JsonRpcResponse) -> Self {
        Self::Success(resp)
    }
}

impl From<JsonRpcError> for JsonRpcReply {
    fn from(err: JsonRpcError) -> Self {
        Self::Error(err)
    }
}

/// A well-formed message, classified by the presence of `id`.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Has an `id`.
    Request(JsonRpcRequest),
    /// Has no `id`.
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Method name.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(notif) => &notif.method,
        }
    }

    /// Parameters, if any.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Option::as_ref is not const
    pub fn params(&self) -> Option<&Value> {
        match self {
            Self::Request(req) => req.params.as_ref(),
            Self::Notification(notif) => notif.params.as_ref(),
        }
    }

    /// The `id`, for requests.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Notification(_) => None,
        }
    }
}

/// A body that could not be turned into an [`IncomingMessage`].
#[derive(Debug, Clone)]
pub struct MalformedMessage {
    /// The error reply describing the failure.
    pub error: JsonRpcError,
    /// Whether the body was an object without an `id` member.
    ///
    /// Malformed notifications are dropped without a reply.
    pub notification: bool,
}

impl MalformedMessage {
    const fn new(error: JsonRpcError, notification: bool) -> Self {
        Self {
            error,
            notification,
        }
    }

    /// Returns the error reply, or `None` if the body was a notification.
    #[must_use]
    pub fn into_reply(self) -> Option<JsonRpcError> {
        if self.notification {
            None
        } else {
            Some(self.error)
        }
    }
}

/// Parses a raw HTTP body into an incoming message.
///
/// # Errors
///
/// Returns a [`MalformedMessage`] if the body is not valid JSON, is not a
/// JSON object, or is not a well-formed JSON-RPC 2.0 envelope.
pub fn parse_message(body: &[u8]) -> Result<IncomingMessage, MalformedMessage> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        MalformedMessage::new(
            JsonRpcError::parse_error(None, format!("Parse error: {e}")),
            false,
        )
    })?;

    let Value::Object(mut obj) = value else {
        return Err(MalformedMessage::new(
            JsonRpcError::invalid_request(None, "Invalid Request: body must be a JSON object"),
            false,
        ));
    };

    // An absent id makes this a notification, whatever the method is
    let notification = !obj.contains_key("id");
    let fail = |error| Err(MalformedMessage::new(error, notification));

    let id = match obj.remove("id") {
        None => None,
        Some(raw) => match serde_json::from_value::<RequestId>(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                return fail(JsonRpcError::invalid_request(
                    None,
                    "Invalid Request: id must be a string or a number",
                ));
            }
        },
    };

    if !jsonrpc_version_ok(&obj) {
        return fail(JsonRpcError::invalid_request(
            id,
            "Invalid Request: jsonrpc field must be \"2.0\"",
        ));
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) => method,
        Some(_) => {
            return fail(JsonRpcError::parse_error(
                id,
                "Parse error: method field must be a string",
            ));
        }
        None => {
            return fail(JsonRpcError::parse_error(
                id,
                "Parse error: missing method field",
            ));
        }
    };

    if method.is_empty() {
        return fail(JsonRpcError::invalid_request(
            id,
            "Invalid Request: method field cannot be empty",
        ));
    }

    let params = obj.remove("params").filter(|p| !p.is_null());

    Ok(match id {
        Some(id) => IncomingMessage::Request(JsonRpcRequest { id, method, params }),
        None => IncomingMessage::Notification(JsonRpcNotification { method, params }),
    })
}

fn jsonrpc_version_ok(obj: &Map<String, Value>) -> bool {
    match obj.get("jsonrpc") {
        None => true,
        Some(Value::String(version)) => version == JSONRPC_VERSION,
        Some(_) => false,
    }
}
