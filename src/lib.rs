//! chroma-mcp-server: MCP server exposing a Chroma vector database
//!
//! This library turns JSON-RPC 2.0 messages, delivered over HTTP POST, into
//! calls against a vector database, and answers them in MCP form.
//!
//! # Architecture
//!
//! The server is a thin protocol adapter:
//!
//! - **Envelope parsing**: Requests vs. notifications, JSON-RPC error codes
//! - **Dispatch**: `initialize`, `tools/list`, `tools/call` and the direct
//!   `tools/query` / `tools/add_texts` methods
//! - **Backends**: A Chroma REST client, or an in-memory store
//!
//! # Modules
//!
//! - [`backend`]: Vector store trait and implementations
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation and HTTP transport

pub mod backend;
pub mod config;
pub mod error;
pub mod mcp;
