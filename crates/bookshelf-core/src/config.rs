//! Bookshelf Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with sensible defaults for development. The token signing secret has
//! no default: a missing secret is a startup failure.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default lifetime of an issued session token (24 hours)
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Longest accepted token lifetime (one year)
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database connection
    pub database: DatabaseConfig,

    /// Token signing configuration
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_vars(|key| std::env::var(key).ok())
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup
    ///
    /// Only keys that are present replace the current value.
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        for key in ["SERVICE_PORT", "API_PORT"] {
            if let Some(port) = lookup(key) {
                self.server.port = parse_value(key, port)?;
                break;
            }
        }
        if let Some(timeout) = lookup("REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = parse_value("REQUEST_TIMEOUT_SECS", timeout)?;
        }
        // CORS origins from environment variable (comma-separated)
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Database
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(size) = lookup("DATABASE_POOL_SIZE") {
            self.database.pool_size = parse_value("DATABASE_POOL_SIZE", size)?;
        }

        // Auth
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(ttl) = lookup("JWT_TTL_SECS") {
            self.auth.token_ttl_secs = parse_value("JWT_TTL_SECS", ttl)?;
        }
        if let Some(issuer) = lookup("JWT_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Some(kid) = lookup("JWT_KEY_ID") {
            self.auth.key_id = Some(kid).filter(|k| !k.is_empty());
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("LOG_JSON") {
            self.logging.json_format = parse_value("LOG_JSON", json)?;
        }

        Ok(self)
    }

    /// Check values that must be present before the server starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&self.auth.token_ttl_secs) {
            return Err(ConfigError::InvalidValue {
                key: "JWT_TTL_SECS".to_string(),
                value: self.auth.token_ttl_secs.to_string(),
            });
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SERVICE_PORT".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1323,
            request_timeout_secs: 10,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; the in-memory store is used when unset
    pub url: Option<String>,

    /// PostgreSQL connection pool size
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 10,
        }
    }
}

/// Session token configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC signing secret (required, never serialized back out)
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Token lifetime in seconds
    pub token_ttl_secs: u64,

    /// Issuer written into and required from every token
    pub issuer: String,

    /// Identifier of the signing key, reserved for key rotation
    pub key_id: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            issuer: "bookshelf".to_string(),
            key_id: None,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("issuer", &self.issuer)
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter directive (trace, debug, info, warn, error, or a full EnvFilter)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "bookshelf_api=debug,tower_http=debug".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 1323);
        assert_eq!(config.auth.token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
        assert_eq!(config.auth.issuer, "bookshelf");
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(key)) if key == "JWT_SECRET"
        ));

        let blank = AppConfig::default()
            .apply_vars(vars(&[("JWT_SECRET", "   ")]))
            .unwrap();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_apply_vars() {
        let config = AppConfig::default()
            .apply_vars(vars(&[
                ("JWT_SECRET", "s3cret"),
                ("JWT_TTL_SECS", "3600"),
                ("JWT_KEY_ID", "k1"),
                ("SERVICE_PORT", "8081"),
                ("DATABASE_URL", "postgres://localhost/books"),
                ("CORS_ORIGINS", "http://a.test, ,http://b.test"),
                ("LOG_JSON", "true"),
            ]))
            .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.token_ttl_secs, 3600);
        assert_eq!(config.auth.key_id.as_deref(), Some("k1"));
        assert_eq!(config.server.port, 8081);
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/books")
        );
        assert_eq!(config.server.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_service_port_wins_over_api_port() {
        let config = AppConfig::default()
            .apply_vars(vars(&[("SERVICE_PORT", "9000"), ("API_PORT", "9001")]))
            .unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_invalid_values() {
        let result = AppConfig::default().apply_vars(vars(&[("JWT_TTL_SECS", "forever")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key, .. }) if key == "JWT_TTL_SECS"
        ));

        let zero_ttl = AppConfig::default()
            .apply_vars(vars(&[("JWT_SECRET", "x"), ("JWT_TTL_SECS", "0")]))
            .unwrap();
        assert!(zero_ttl.validate().is_err());
    }

    #[test]
    fn test_ttl_upper_bound() {
        let huge = AppConfig::default()
            .apply_vars(vars(&[
                ("JWT_SECRET", "x"),
                ("JWT_TTL_SECS", "18446744073709551615"),
            ]))
            .unwrap();
        assert!(matches!(
            huge.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "JWT_TTL_SECS"
        ));

        let max_ttl = MAX_TOKEN_TTL_SECS.to_string();
        let max = AppConfig::default()
            .apply_vars(vars(&[("JWT_SECRET", "x"), ("JWT_TTL_SECS", max_ttl.as_str())]))
            .unwrap();
        assert!(max.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = AppConfig::default()
            .apply_vars(vars(&[("JWT_SECRET", "hunter2-signing-key")]))
            .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2-signing-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_parse_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [auth]
            jwt_secret = "from-file"
            token_ttl_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt_secret, "from-file");
        assert_eq!(config.auth.token_ttl_secs, 600);
        assert_eq!(config.auth.issuer, "bookshelf");
    }
}
