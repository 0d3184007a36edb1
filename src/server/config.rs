//! Configuration loading for grafeasd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.grafeas/config.toml` (user)
//! 3. `/etc/grafeas/config.toml` (system)
//!
//! When no explicit path is given and neither file exists, the built-in
//! defaults are used (in-memory storage, plaintext on `0.0.0.0:8080`).
//!
//! ```toml
//! storage_type = "memstore"
//!
//! [api]
//! address = "unix:///var/run/grafeas.sock"
//! cafile = "/etc/grafeas/ca.pem"
//! certfile = "/etc/grafeas/server.pem"
//! keyfile = "/etc/grafeas/server.key"
//! server_name = "grafeas.internal"
//! cors_allowed_origins = ["https://console.example.com"]
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::{GrafeasError, Result};

/// Storage backends that can be selected by `storage_type`.
pub const SUPPORTED_STORAGE_TYPES: &[&str] = &["memstore"];

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ServerConfig,
    /// Storage backend (default: "memstore").
    #[serde(default = "default_storage_type")]
    pub storage_type: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ServerConfig::default(),
            storage_type: default_storage_type(),
        }
    }
}

fn default_storage_type() -> String {
    "memstore".to_string()
}

/// Network, TLS and cross-origin settings for one server run.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Endpoint address, e.g. `localhost:8080` or `unix:///var/run/grafeas.sock`
    /// (default: 0.0.0.0:8080).
    #[serde(default = "default_address")]
    pub address: String,
    /// PEM encoded CA certificate used to verify client certificates.
    /// Empty disables TLS entirely.
    #[serde(default)]
    pub cafile: String,
    /// PEM encoded server certificate chain.
    #[serde(default)]
    pub certfile: String,
    /// PEM encoded private key for `certfile`.
    #[serde(default)]
    pub keyfile: String,
    /// Name the server certificate is verified against when the gateway
    /// dials back into the server.
    #[serde(default)]
    pub server_name: String,
    /// Permitted CORS origins. Empty permits none.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            cafile: String::new(),
            certfile: String::new(),
            keyfile: String::new(),
            server_name: String::new(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl ServerConfig {
    /// Whether mutual TLS is requested.
    pub fn tls_enabled(&self) -> bool {
        !self.cafile.is_empty()
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.grafeas/config.toml`
    /// 3. `/etc/grafeas/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            info!("no config file found, using defaults");
            return Ok(Config::default());
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            GrafeasError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            GrafeasError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(GrafeasError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".grafeas").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/grafeas/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Reject combinations that cannot produce a working server.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_STORAGE_TYPES.contains(&self.storage_type.as_str()) {
            return Err(GrafeasError::Configuration(format!(
                "Storage type unsupported: {}",
                self.storage_type
            )));
        }
        if self.api.address.trim().is_empty() {
            return Err(GrafeasError::Configuration(
                "api.address must not be empty".to_string(),
            ));
        }
        if self.api.tls_enabled() && (self.api.certfile.is_empty() || self.api.keyfile.is_empty())
        {
            return Err(GrafeasError::Configuration(
                "api.cafile is set but api.certfile or api.keyfile is missing".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.api.address, "0.0.0.0:8080");
        assert_eq!(config.storage_type, "memstore");
        assert!(!config.api.tls_enabled());
        assert!(config.api.cors_allowed_origins.is_empty());
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [api]
            address = "127.0.0.1:9090"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api.address, "127.0.0.1:9090");
        // Defaults preserved
        assert_eq!(config.storage_type, "memstore");
        assert!(config.api.cafile.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            storage_type = "memstore"

            [api]
            address = "unix:///var/run/grafeas.sock"
            cafile = "/etc/grafeas/ca.pem"
            certfile = "/etc/grafeas/server.pem"
            keyfile = "/etc/grafeas/server.key"
            server_name = "grafeas.internal"
            cors_allowed_origins = ["https://a.example", "https://*.b.example"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api.address, "unix:///var/run/grafeas.sock");
        assert!(config.api.tls_enabled());
        assert_eq!(config.api.server_name, "grafeas.internal");
        assert_eq!(
            config.api.cors_allowed_origins,
            vec!["https://a.example", "https://*.b.example"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unsupported_storage_type_is_rejected() {
        let config = Config {
            storage_type: "postgres".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Storage type unsupported: postgres"));
    }

    #[test]
    fn cafile_without_keypair_is_rejected() {
        let mut config = Config::default();
        config.api.cafile = "/etc/grafeas/ca.pem".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api]\naddress = \"localhost:7000\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.api.address, "localhost:7000");
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api\naddress = ").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }
}
