//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes the vector store as MCP tools over JSON-RPC 2.0.
//! Messages arrive as HTTP POST bodies; clients may also hold open an SSE
//! stream that announces the POST endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│   Server    │───▶│   Backend   │    │
//! │   │ (HTTP, SSE) │    │ (dispatch)  │    │ (Chroma)    │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                  │                              │
//! │          ▼                  ▼                              │
//! │   ┌─────────────────────────────────────────────────┐      │
//! │   │       JSON-RPC Messages / Tool Parameters       │      │
//! │   └─────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod params;
pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcReply, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::AppState;
