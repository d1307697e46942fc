//! Configuration loading and types for statevault.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, basic authentication, backend naming and chunking,
//! the secrets store connection, and logging.

use serde::Deserialize;
use std::path::Path;

/// Fixed namespace under which every backend stores its entries in the
/// secrets store.  The configured backend name is appended so that several
/// backends can share one store without colliding.
pub const SECRETS_PREFIX: &str = "/statevault/tfstate";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Backend naming, chunking and error-body policy.
    pub backend: BackendConfig,

    /// Optional HTTP basic authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Secrets store settings.
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Base path in the secrets store for this backend's entries.
    pub fn base_path(&self) -> String {
        format!("{}/{}", SECRETS_PREFIX, self.backend.name)
    }

    /// Resource path for one logical state file.  Every derived key
    /// (chunks, index, lock) is a deterministic function of this path.
    pub fn resource_path(&self, name: &str) -> String {
        format!("{}/{}", self.base_path(), name)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Backend naming, chunking and error reporting.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Name of this backend.  Namespaces all entries in the secrets store
    /// so multiple backends can share one store.  Required.
    #[serde(default)]
    pub name: String,

    /// Maximum number of bytes stored per chunk record.  Bounds the size of
    /// each entry presented to the secrets store.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// When true, 500 responses echo error details in the body; otherwise
    /// only a generic status/title is returned.
    #[serde(default)]
    pub show_error: bool,
}

/// Optional basic authentication.  An empty username disables it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Username required on every API request.
    #[serde(default)]
    pub username: String,

    /// Password required on every API request.
    #[serde(default)]
    pub password: String,
}

/// Secrets store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    /// Engine: `memory` (in-process, for tests and dry runs).  The network
    /// client for a real secrets service plugs in behind the same trait.
    #[serde(default = "default_secrets_engine")]
    pub engine: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            engine: default_secrets_engine(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_chunk_size() -> usize {
    65_536
}

fn default_secrets_engine() -> String {
    "memory".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    if config.backend.name.is_empty() {
        anyhow::bail!(
            "backend.name must be set so this backend does not conflict with others in the secrets store"
        );
    }
    if config.backend.chunk_size == 0 {
        anyhow::bail!("backend.chunk_size must be greater than zero");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config: Config = serde_yaml::from_str("backend:\n  name: prod\n").unwrap();
        assert_eq!(config.backend.name, "prod");
        assert_eq!(config.backend.chunk_size, 65_536);
        assert!(!config.backend.show_error);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.secrets.engine, "memory");
        assert_eq!(config.base_path(), "/statevault/tfstate/prod");
        assert_eq!(
            config.resource_path("app"),
            "/statevault/tfstate/prod/app"
        );
    }

    #[test]
    fn load_rejects_missing_backend_name() {
        let dir = std::env::temp_dir().join("statevault-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("no-name.yml");
        std::fs::write(&path, "backend:\n  name: \"\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
