//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk, applying
//! environment variable overrides and validating the result.
//!
//! # Configuration Sources
//!
//! Later sources override earlier ones:
//!
//! 1. Built-in defaults
//! 2. JSON configuration file:
//!    - Path given as the `CONFIG_FILE` CLI argument, or
//!    - **Linux/macOS:** `~/.chroma-mcp-server/config.json`
//!    - **Windows:** `%USERPROFILE%\.chroma-mcp-server\config.json`
//! 3. Variables from a `.env` file in the working directory
//! 4. Environment variables (`CHROMA_HOST`, `CHROMA_PORT`, `CHROMA_SSL`,
//!    `SERVER_HOST`, `SERVER_PORT`, `MCP_BACKEND`, `MAX_BODY_BYTES`)
//!
//! A missing file at the default location is not an error; a missing file
//! named on the command line is.

mod settings;

pub use settings::{
    BackendKind, ChromaConfig, Config, EmbeddingConfig, LoggingConfig, ServerConfig,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Dotenv file read from the working directory by [`load_config`].
pub const DOTENV_FILE: &str = ".env";

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.chroma-mcp-server/`
/// - **Windows:** `%USERPROFILE%\.chroma-mcp-server\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".chroma-mcp-server"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads the configuration using the process environment for overrides.
///
/// If `path` is `None`, uses the platform-specific default location.
/// Variables in [`DOTENV_FILE`] apply when the process environment does not
/// set them.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - The `.env` file exists but cannot be parsed
/// - An environment override cannot be parsed
/// - A value is out of range
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let dotenv = read_dotenv(Path::new(DOTENV_FILE))?;
    load_config_with(path, |name| {
        std::env::var(name).ok().or_else(|| dotenv.get(name).cloned())
    })
}

/// Reads `KEY=value` pairs from a dotenv file without touching the process
/// environment. A missing file yields an empty map.
///
/// # Errors
///
/// Returns [`ConfigError::DotEnvError`] if the file cannot be read or a line
/// cannot be parsed.
pub fn read_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let to_error = |source| ConfigError::DotEnvError {
        path: path.to_path_buf(),
        source,
    };

    match dotenvy::from_path_iter(path) {
        Ok(entries) => entries.collect::<Result<_, _>>().map_err(to_error),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(to_error(e)),
    }
}

/// Loads the configuration, resolving environment variables through `lookup`.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            read_config_file(p)?
        }
        None => match default_config_path() {
            Some(p) if p.exists() => read_config_file(&p)?,
            _ => Config::default(),
        },
    };

    config.apply_env_overrides(lookup)?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_dir_exists() {
        assert!(default_config_dir().is_some());
    }

    #[test]
    fn default_config_path_exists() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let err = load_config_with(Some(&missing), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn file_values_are_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "backend": "memory", "server": {{ "port": 9999 }} }}"#
        )
        .unwrap();

        let config = load_config_with(Some(file.path()), no_env).unwrap();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "chroma": {{ "host": "from-file" }} }}"#).unwrap();

        let config = load_config_with(Some(file.path()), |name| {
            (name == "CHROMA_HOST").then(|| "from-env".to_string())
        })
        .unwrap();
        assert_eq!(config.chroma.host, "from-env");
    }

    #[test]
    fn dotenv_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# deployment").unwrap();
        writeln!(file, "CHROMA_HOST=chroma.internal").unwrap();
        writeln!(file, "SERVER_PORT=\"9100\"").unwrap();

        let vars = read_dotenv(file.path()).unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["CHROMA_HOST"], "chroma.internal");
        assert_eq!(vars["SERVER_PORT"], "9100");
    }

    #[test]
    fn missing_dotenv_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_dotenv(&dir.path().join(DOTENV_FILE)).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn malformed_dotenv_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "NOT A VALID LINE").unwrap();

        let err = read_dotenv(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DotEnvError { .. }));
    }

    #[test]
    fn dotenv_values_override_file_below_process_env() {
        let mut env_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(env_file, "CHROMA_HOST=from-dotenv").unwrap();
        writeln!(env_file, "SERVER_PORT=9100").unwrap();
        let dotenv = read_dotenv(env_file.path()).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "chroma": {{ "host": "from-file" }} }}"#).unwrap();

        let process = |name: &str| (name == "SERVER_PORT").then(|| "9200".to_string());
        let config = load_config_with(Some(file.path()), |name| {
            process(name).or_else(|| dotenv.get(name).cloned())
        })
        .unwrap();
        assert_eq!(config.chroma.host, "from-dotenv");
        assert_eq!(config.server.port, 9200);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = load_config_with(Some(file.path()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
