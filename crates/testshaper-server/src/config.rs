//! Server configuration

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use testshaper_core::{Error, Result};

/// Environment variable names read by [`ServerConfig::from_env`]
pub mod env {
    pub const DATA_DIR: &str = "TESTSHAPER_DATA_DIR";
    pub const HTTP_PORT: &str = "TESTSHAPER_HTTP_PORT";
    pub const JWT_SECRET: &str = "TESTSHAPER_JWT_SECRET";
    pub const ENCRYPTION_KEY: &str = "TESTSHAPER_ENCRYPTION_KEY";
    pub const POLICY_CACHE_TTL_SECS: &str = "TESTSHAPER_POLICY_CACHE_TTL_SECS";
    pub const ADMIN_EMAIL: &str = "TESTSHAPER_ADMIN_EMAIL";
    pub const ADMIN_PASSWORD: &str = "TESTSHAPER_ADMIN_PASSWORD";
    pub const CORS_ALLOWED_ORIGINS: &str = "TESTSHAPER_CORS_ALLOWED_ORIGINS";
    pub const LOG_LEVEL: &str = "TESTSHAPER_LOG_LEVEL";
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Data directory
    pub data_dir: PathBuf,

    /// Address the HTTP API binds to
    pub bind_address: String,

    /// HTTP API port; `0` picks a free port
    pub http_port: u16,

    /// HS256 signing secret for access tokens
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Secret the at-rest encryption key is derived from
    #[serde(skip_serializing)]
    pub encryption_key: String,

    /// Policy cache bucket lifetime in seconds; `None` disables expiry
    pub policy_cache_ttl_secs: Option<u64>,

    /// How often idle rate-limit counters are purged, in seconds
    pub rate_limit_purge_interval_secs: u64,

    /// Super administrator created on first start when no identity exists
    pub admin_email: Option<String>,

    #[serde(skip_serializing)]
    pub admin_password: Option<String>,

    /// Origins allowed to call the API from a browser; empty allows any
    pub cors_allowed_origins: Vec<String>,

    /// Sync the storage WAL on every write
    pub sync_writes: bool,

    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            jwt_secret: String::new(),
            encryption_key: String::new(),
            policy_cache_ttl_secs: Some(60),
            rate_limit_purge_interval_secs: 60,
            admin_email: None,
            admin_password: None,
            cors_allowed_origins: Vec::new(),
            sync_writes: true,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Create configuration for development. Uses fixed, publicly known
    /// secrets.
    pub fn for_development<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            bind_address: "127.0.0.1".to_string(),
            jwt_secret: "testshaper-development-jwt-secret".to_string(),
            encryption_key: "testshaper-development-encryption-key".to_string(),
            sync_writes: false,
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }

    /// Create configuration for production. Secrets must be supplied.
    pub fn for_production<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            sync_writes: true,
            log_level: "info".to_string(),
            ..Default::default()
        }
    }

    /// Build a configuration from `TESTSHAPER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    ///
    /// A missing JWT secret is replaced with a random one (tokens then do
    /// not survive a restart). A missing encryption key is an error since
    /// stored secrets could never be decrypted again.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::for_production(get(env::DATA_DIR).unwrap_or_else(|| "./data".to_string()));

        if let Some(port) = get(env::HTTP_PORT) {
            config.http_port = port.parse().map_err(|_| {
                Error::Configuration(format!("{} must be a port number, got '{}'", env::HTTP_PORT, port))
            })?;
        }

        config.jwt_secret = match get(env::JWT_SECRET) {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    "{} not set, using a random signing secret for this process",
                    env::JWT_SECRET
                );
                random_secret()
            }
        };

        config.encryption_key = get(env::ENCRYPTION_KEY).ok_or_else(|| {
            Error::Configuration(format!("{} must be set", env::ENCRYPTION_KEY))
        })?;

        if let Some(ttl) = get(env::POLICY_CACHE_TTL_SECS) {
            let secs: u64 = ttl.parse().map_err(|_| {
                Error::Configuration(format!(
                    "{} must be a number of seconds, got '{}'",
                    env::POLICY_CACHE_TTL_SECS,
                    ttl
                ))
            })?;
            config.policy_cache_ttl_secs = (secs > 0).then_some(secs);
        }

        config.admin_email = get(env::ADMIN_EMAIL);
        config.admin_password = get(env::ADMIN_PASSWORD);

        if let Some(origins) = get(env::CORS_ALLOWED_ORIGINS) {
            config.cors_allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(level) = get(env::LOG_LEVEL) {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can start a server
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.is_empty() {
            return Err(Error::Configuration("JWT secret must not be empty".to_string()));
        }
        if self.encryption_key.is_empty() {
            return Err(Error::Configuration("Encryption key must not be empty".to_string()));
        }
        if self.admin_email.is_some() != self.admin_password.is_some() {
            return Err(Error::Configuration(
                "Admin email and password must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Policy cache TTL as a duration
    pub fn policy_cache_ttl(&self) -> Option<Duration> {
        self.policy_cache_ttl_secs.map(Duration::from_secs)
    }

    /// Builder: set HTTP port
    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Builder: set bind address
    pub fn bind_address(mut self, address: &str) -> Self {
        self.bind_address = address.to_string();
        self
    }

    /// Builder: set the token signing and encryption secrets
    pub fn with_secrets(mut self, jwt_secret: &str, encryption_key: &str) -> Self {
        self.jwt_secret = jwt_secret.to_string();
        self.encryption_key = encryption_key.to_string();
        self
    }

    /// Builder: set the policy cache TTL
    pub fn policy_cache_ttl_secs(mut self, ttl: Option<u64>) -> Self {
        self.policy_cache_ttl_secs = ttl;
        self
    }

    /// Builder: bootstrap a super administrator
    pub fn with_admin(mut self, email: &str, password: &str) -> Self {
        self.admin_email = Some(email.to_string());
        self.admin_password = Some(password.to_string());
        self
    }

    /// Builder: restrict browser origins
    pub fn cors_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_allowed_origins = origins;
        self
    }

    /// Builder: set log level
    pub fn log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 48];
    OsRng.fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}
