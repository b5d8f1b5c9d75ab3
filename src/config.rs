//! Configuration parsing and structures
//!
//! Server entries are deliberately kept raw after parsing: validation
//! happens in [`Config::resolve_server`], which the client registry calls
//! on every miss. A malformed entry therefore only fails operations that
//! actually touch it, and the `connect` listing can still show it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::dav::Auth;
use crate::env::substitute_env_vars;

/// Supported `authtype` values.
const AUTH_BASIC: &str = "basic";
const AUTH_DIGEST: &str = "digest";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Server entries keyed by identifier (the mount authority)
    #[serde(default)]
    pub servers: BTreeMap<String, ServerEntry>,
}

/// One configured server, as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerEntry {
    /// Server host, e.g. `dav.example.com` or `example.com:8443`
    pub host: Option<String>,

    /// Use HTTPS (default) or plain HTTP
    pub ssl: Option<bool>,

    /// Authentication mode: `basic` or `digest`; anything else is fatal
    pub authtype: Option<String>,

    pub username: Option<String>,

    pub password: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Connection parameters for one server, ready for client construction.
#[derive(Debug, Clone)]
pub struct ResolvedServer {
    /// Base URL, `scheme://host` with no trailing slash
    pub base_url: String,

    /// Credentials to attach to every request
    pub auth: Auth,
}

impl Config {
    /// Load configuration from a YAML file, substituting `${VAR}`
    /// environment references first.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;
        let content = substitute_env_vars(&content)?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one server must be configured under 'servers'".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the entry for `identifier` into connection parameters.
    ///
    /// Fails if the entry is missing, has no host, or names an
    /// unsupported authentication type. None of these are retried.
    pub fn resolve_server(&self, identifier: &str) -> Result<ResolvedServer, ConfigError> {
        let entry = self.servers.get(identifier).ok_or_else(|| {
            ConfigError::ValidationError(format!("no entry for server '{identifier}'"))
        })?;

        let host = entry.host.as_deref().ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "server '{identifier}': no 'host' of type 'string' in config"
            ))
        })?;

        let auth = match entry.authtype.as_deref() {
            None => Auth::None,
            Some(AUTH_BASIC) => Auth::Basic {
                username: entry.username.clone().unwrap_or_default(),
                password: entry.password.clone().unwrap_or_default(),
            },
            Some(AUTH_DIGEST) => Auth::Digest {
                username: entry.username.clone().unwrap_or_default(),
                password: entry.password.clone().unwrap_or_default(),
            },
            Some(other) => return Err(ConfigError::UnsupportedAuth(other.to_string())),
        };

        let scheme = if entry.ssl.unwrap_or(true) {
            "https"
        } else {
            "http"
        };

        Ok(ResolvedServer {
            base_url: format!("{scheme}://{host}"),
            auth,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),

    #[error("Authentication type '{0}' is not supported")]
    UnsupportedAuth(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_servers() {
        let yaml = r#"
logging:
  level: debug

servers:
  srv1:
    host: example.com
  backup:
    host: backup.example.com:8443
    ssl: false
    authtype: basic
    username: alice
    password: secret
"#;

        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers["srv1"].host.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_resolve_defaults_to_https() {
        let yaml = "servers:\n  srv1:\n    host: example.com\n";
        let config = Config::from_str(yaml).unwrap();

        let resolved = config.resolve_server("srv1").unwrap();
        assert_eq!(resolved.base_url, "https://example.com");
        assert!(matches!(resolved.auth, Auth::None));
    }

    #[test]
    fn test_resolve_plain_http_when_ssl_disabled() {
        let yaml = "servers:\n  srv1:\n    host: example.com\n    ssl: false\n";
        let config = Config::from_str(yaml).unwrap();

        let resolved = config.resolve_server("srv1").unwrap();
        assert_eq!(resolved.base_url, "http://example.com");
    }

    #[test]
    fn test_resolve_basic_credentials() {
        let yaml = r#"
servers:
  srv1:
    host: example.com
    authtype: basic
    username: alice
    password: secret
"#;
        let config = Config::from_str(yaml).unwrap();

        match config.resolve_server("srv1").unwrap().auth {
            Auth::Basic { username, password } => {
                assert_eq!(username, "alice");
                assert_eq!(password, "secret");
            }
            other => panic!("expected basic auth, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_authtype_is_fatal() {
        let yaml = "servers:\n  srv1:\n    host: example.com\n    authtype: bearer\n";
        let config = Config::from_str(yaml).unwrap();

        let err = config.resolve_server("srv1").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedAuth(ref t) if t == "bearer"));
        assert!(err.to_string().contains("'bearer' is not supported"));
    }

    #[test]
    fn test_missing_host_error() {
        let yaml = "servers:\n  srv1:\n    ssl: true\n";
        let config = Config::from_str(yaml).unwrap();

        let err = config.resolve_server("srv1").unwrap_err();
        assert!(err.to_string().contains("no 'host'"));
    }

    #[test]
    fn test_unknown_identifier_error() {
        let yaml = "servers:\n  srv1:\n    host: example.com\n";
        let config = Config::from_str(yaml).unwrap();

        let err = config.resolve_server("nope").unwrap_err();
        assert!(err.to_string().contains("no entry for server 'nope'"));
    }

    #[test]
    fn test_validate_empty_servers() {
        let config = Config::from_str("logging:\n  level: info\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_substitutes_env_vars() {
        std::env::set_var("WEBDAV_FUSE_TEST_PW", "hunter2");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "servers:\n  srv1:\n    host: example.com\n    authtype: basic\n    password: ${{WEBDAV_FUSE_TEST_PW}}\n"
        )
        .unwrap();

        let config = Config::from_file(&file.path().to_path_buf()).unwrap();
        match config.resolve_server("srv1").unwrap().auth {
            Auth::Basic { password, .. } => assert_eq!(password, "hunter2"),
            other => panic!("expected basic auth, got {other:?}"),
        }

        std::env::remove_var("WEBDAV_FUSE_TEST_PW");
    }
}
