//! Error types for chroma-mcp-server.
//!
//! Backend errors live in [`crate::backend`]; JSON-RPC error objects in
//! [`crate::mcp::protocol`].

use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading `config.json` or applying environment overrides.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but reading it failed.
    #[error("cannot read config {path}")]
    ReadError {
        /// File being read.
        path: PathBuf,
        /// Cause.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has unknown keys.
    #[error("invalid JSON in config {path}")]
    ParseError {
        /// File being parsed.
        path: PathBuf,
        /// Cause, with line and column.
        #[source]
        source: serde_json::Error,
    },

    /// A config path was given on the command line but does not exist.
    #[error("config file {path} does not exist")]
    NotFound {
        /// Path given by the user.
        path: PathBuf,
    },

    /// The `.env` file exists but is unreadable or malformed.
    #[error("cannot load dotenv file {path}")]
    DotEnvError {
        /// File being read.
        path: PathBuf,
        /// Cause.
        #[source]
        source: dotenvy::Error,
    },

    /// An environment variable override could not be parsed.
    #[error("invalid value for environment variable {name}: {message}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// Why the value was rejected.
        message: String,
    },

    /// A value is out of range after all overrides were applied.
    #[error("invalid configuration: {message}")]
    ValidationError {
        /// Which setting is wrong.
        message: String,
    },
}

/// Errors that stop the HTTP server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {address}")]
    Bind {
        /// `host:port` that was requested.
        address: String,
        /// Cause, usually address in use or permission denied.
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an IO error.
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}
