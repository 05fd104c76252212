//! Typed view of `config.json`.
//!
//! Every section and field has a default, so `{}` is a complete config.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::transport::DEFAULT_MAX_BODY_BYTES;

/// Whole server configuration.
///
/// Unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Editor hint, ignored.
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Free text, ignored.
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Which vector store serves the tools.
    #[serde(default)]
    pub backend: BackendKind,

    /// Chroma server connection.
    #[serde(default)]
    pub chroma: ChromaConfig,

    /// Text embedding settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Checks ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::ValidationError {
                message: message.to_string(),
            })
        };

        if self.chroma.host.trim().is_empty() {
            return invalid("chroma.host cannot be empty");
        }
        if self.chroma.tenant.is_empty() || self.chroma.database.is_empty() {
            return invalid("chroma.tenant and chroma.database cannot be empty");
        }
        if self.chroma.timeout_secs == 0 {
            return invalid("chroma.timeout_secs must be greater than 0");
        }
        if self.embedding.dimension == 0 {
            return invalid("embedding.dimension must be greater than 0");
        }
        if self.server.host.trim().is_empty() {
            return invalid("server.host cannot be empty");
        }
        if self.server.sse_keepalive_secs == 0 {
            return invalid("server.sse_keepalive_secs must be greater than 0");
        }
        Ok(())
    }

    /// Applies environment variable overrides.
    ///
    /// `lookup` returns the value of a variable, or `None` if unset. Recognised
    /// variables: `CHROMA_HOST`, `CHROMA_PORT`, `CHROMA_SSL`, `SERVER_HOST`,
    /// `SERVER_PORT`, `SERVER_MAX_BODY_BYTES`, `MCP_BACKEND`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CHROMA_HOST") {
            self.chroma.host = host.trim().to_string();
        }
        if let Some(port) = lookup("CHROMA_PORT") {
            self.chroma.port = parse_env("CHROMA_PORT", &port)?;
        }
        if let Some(ssl) = lookup("CHROMA_SSL") {
            self.chroma.ssl = parse_bool("CHROMA_SSL", &ssl)?;
        }
        if let Some(host) = lookup("SERVER_HOST") {
            self.server.host = host.trim().to_string();
        }
        if let Some(port) = lookup("SERVER_PORT") {
            self.server.port = parse_env("SERVER_PORT", &port)?;
        }
        if let Some(bytes) = lookup("SERVER_MAX_BODY_BYTES") {
            self.server.max_body_bytes = parse_env("SERVER_MAX_BODY_BYTES", &bytes)?;
        }
        if let Some(backend) = lookup("MCP_BACKEND") {
            self.backend = parse_env("MCP_BACKEND", &backend)?;
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar {
            name: name.to_string(),
            message: e.to_string(),
        })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            name: name.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

/// Which vector store serves the tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A Chroma server reached over HTTP.
    #[default]
    Chroma,
    /// Process-local collections that vanish on exit.
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chroma" => Ok(Self::Chroma),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "unknown backend '{other}', expected 'chroma' or 'memory'"
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chroma => write!(f, "chroma"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Chroma server connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChromaConfig {
    /// Server hostname.
    #[serde(default = "default_chroma_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_chroma_port")]
    pub port: u16,

    /// Use HTTPS.
    #[serde(default)]
    pub ssl: bool,

    /// Chroma tenant.
    #[serde(default = "default_tenant")]
    pub tenant: String,

    /// Chroma database within the tenant.
    #[serde(default = "default_database")]
    pub database: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ChromaConfig {
    /// Returns `http(s)://host:port`.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            host: default_chroma_host(),
            port: default_chroma_port(),
            ssl: false,
            tenant: default_tenant(),
            database: default_database(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_chroma_host() -> String {
    "chroma-db".to_string()
}

const fn default_chroma_port() -> u16 {
    8000
}

fn default_tenant() -> String {
    "default_tenant".to_string()
}

fn default_database() -> String {
    "default_database".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Text embedding settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Embedding vector width. Must match existing Chroma collections.
    ///
    /// Vectors come from the built-in feature-hashing embedder, not from
    /// Chroma's default embedding function. Collections written by other
    /// Chroma clients share neither the width nor the vector space, so
    /// queries against them give meaningless rankings. Keep the collections
    /// this server queries written by this server.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

const fn default_dimension() -> usize {
    384
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Seconds between SSE keep-alive comments.
    #[serde(default = "default_sse_keepalive_secs")]
    pub sse_keepalive_secs: u64,

    /// Largest accepted POST body in bytes; `0` means unlimited.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Returns `host:port`, bracketing IPv6 literals.
    #[must_use]
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            sse_keepalive_secs: default_sse_keepalive_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_server_port() -> u16 {
    8013
}

const fn default_sse_keepalive_secs() -> u64 {
    15
}

const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend, BackendKind::Chroma);
        assert_eq!(config.chroma.host, "chroma-db");
        assert_eq!(config.chroma.port, 8000);
        assert!(!config.chroma.ssl);
        assert_eq!(config.server.bind_address(), "0.0.0.0:8013");
        assert_eq!(config.server.max_body_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "backend": "memory",
            "chroma": {
                "host": "localhost",
                "port": 9000,
                "ssl": true,
                "tenant": "acme",
                "database": "docs",
                "timeout_secs": 5
            },
            "embedding": {
                "dimension": 128
            },
            "server": {
                "host": "127.0.0.1",
                "port": 9100,
                "sse_keepalive_secs": 30,
                "max_body_bytes": 0
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.chroma.base_url(), "https://localhost:9000");
        assert_eq!(config.chroma.tenant, "acme");
        assert_eq!(config.chroma.database, "docs");
        assert_eq!(config.chroma.timeout_secs, 5);
        assert_eq!(config.embedding.dimension, 128);
        assert_eq!(config.server.bind_address(), "127.0.0.1:9100");
        assert_eq!(config.server.sse_keepalive_secs, 30);
        assert_eq!(config.server.max_body_bytes, 0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
    }

    #[test]
    fn ipv6_bind_address_is_bracketed() {
        let config = ServerConfig {
            host: "::1".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_address(), "[::1]:8013");
    }

    #[test]
    fn reject_zero_dimension() {
        let json = r#"{ "embedding": { "dimension": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_empty_chroma_host() {
        let json = r#"{ "chroma": { "host": "  " } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn reject_unknown_backend() {
        let result: Result<Config, _> = serde_json::from_str(r#"{ "backend": "pinecone" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                ("CHROMA_HOST", " test-host "),
                ("CHROMA_PORT", "9000"),
                ("CHROMA_SSL", "True"),
                ("SERVER_HOST", "127.0.0.1"),
                ("SERVER_PORT", "8080"),
                ("SERVER_MAX_BODY_BYTES", "1048576"),
                ("MCP_BACKEND", "memory"),
            ]))
            .unwrap();

        assert_eq!(config.chroma.host, "test-host");
        assert_eq!(config.chroma.port, 9000);
        assert!(config.chroma.ssl);
        assert_eq!(config.server.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.server.max_body_bytes, 1_048_576);
        assert_eq!(config.backend, BackendKind::Memory);
    }

    #[test]
    fn env_overrides_leave_unset_values() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[])).unwrap();
        assert_eq!(config.chroma.host, "chroma-db");
        assert_eq!(config.server.port, 8013);
    }

    #[test]
    fn env_override_rejects_bad_port() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(env(&[("SERVER_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
    }

    #[test]
    fn env_override_rejects_bad_bool() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(env(&[("CHROMA_SSL", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("CHROMA_SSL"));
    }

    #[test]
    fn backend_kind_from_str() {
        assert_eq!("Memory".parse::<BackendKind>(), Ok(BackendKind::Memory));
        assert_eq!("chroma".parse::<BackendKind>(), Ok(BackendKind::Chroma));
        assert!("other".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Memory.to_string(), "memory");
    }
}
