//! Configuration management for S3Gateway
//!
//! Supports configuration via:
//! - Environment variables (primary)
//! - Optional TOML config file (secondary)
//!
//! Environment variables take precedence over config file values. The
//! backend section is the opaque settings object handed to the storage
//! collaborator once at startup.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;

/// Page size used for listings when the client does not send `maxKeys`
pub const DEFAULT_MAX_KEYS: i32 = 1000;

/// Backend storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// AWS S3 or any S3-compatible endpoint
    S3,
    /// In-process store, for local development
    Memory,
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" | "aws" => Ok(BackendType::S3),
            "memory" | "mem" | "inmemory" => Ok(BackendType::Memory),
            _ => Err(format!("Unknown backend type: {}", s)),
        }
    }
}

/// Backend storage configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend type (s3, memory)
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: BackendType,

    /// Region (defaults to the SDK's region provider chain)
    #[serde(default)]
    pub region: Option<String>,

    /// Endpoint URL (for S3-compatible services)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Static access key; when unset the default credential chain is used
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Static secret key, required together with `access_key_id`
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    #[serde(default)]
    pub force_path_style: bool,
}

// Keep the secret out of the startup log line.
impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("backend_type", &self.backend_type)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Request timeout in seconds (default: 300)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Max request body size in bytes (default: 5GB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Honor X-Forwarded-Proto / X-Forwarded-Host when building links
    #[serde(default)]
    pub trust_proxy: bool,

    /// Listing page size when `maxKeys` is absent
    #[serde(default = "default_max_keys")]
    pub default_max_keys: i32,
}

fn default_backend_type() -> BackendType {
    BackendType::S3
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_timeout_secs() -> u64 {
    300
}

/// 5 GiB, clamped to the address space on narrower targets
const DEFAULT_MAX_BODY_SIZE: u64 = 5 * 1024 * 1024 * 1024;

fn default_max_body_size() -> usize {
    usize::try_from(DEFAULT_MAX_BODY_SIZE).unwrap_or(usize::MAX)
}

fn default_max_keys() -> i32 {
    DEFAULT_MAX_KEYS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            timeout_secs: default_timeout_secs(),
            max_body_size: default_max_body_size(),
            trust_proxy: false,
            default_max_keys: default_max_keys(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: default_backend_type(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Backend storage configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Log level (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - S3GATEWAY_BACKEND_TYPE: s3|memory
    /// - S3GATEWAY_BACKEND_REGION: region (optional)
    /// - S3GATEWAY_BACKEND_ENDPOINT: custom endpoint URL (optional)
    /// - S3GATEWAY_BACKEND_ACCESS_KEY_ID / S3GATEWAY_BACKEND_SECRET_ACCESS_KEY
    /// - S3GATEWAY_BACKEND_FORCE_PATH_STYLE: true|false
    /// - S3GATEWAY_BIND_ADDRESS: server bind address (default: 0.0.0.0:8080)
    /// - S3GATEWAY_TIMEOUT_SECS: request timeout (default: 300)
    /// - S3GATEWAY_MAX_BODY_SIZE: max request size in bytes (default: 5GB)
    /// - S3GATEWAY_TRUST_PROXY: true|false
    /// - S3GATEWAY_DEFAULT_MAX_KEYS: listing page size (default: 1000)
    /// - S3GATEWAY_LOG_LEVEL: log level (default: info)
    /// - S3GATEWAY_CONFIG_FILE: optional path to TOML config file
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("S3GATEWAY_CONFIG_FILE") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(backend_type) = lookup("S3GATEWAY_BACKEND_TYPE") {
            config.backend.backend_type =
                BackendType::from_str(&backend_type).map_err(anyhow::Error::msg)?;
        }

        if let Some(region) = lookup("S3GATEWAY_BACKEND_REGION") {
            config.backend.region = Some(region);
        }

        if let Some(endpoint) = lookup("S3GATEWAY_BACKEND_ENDPOINT") {
            config.backend.endpoint = Some(endpoint);
        }

        if let Some(key) = lookup("S3GATEWAY_BACKEND_ACCESS_KEY_ID") {
            config.backend.access_key_id = Some(key);
        }

        if let Some(secret) = lookup("S3GATEWAY_BACKEND_SECRET_ACCESS_KEY") {
            config.backend.secret_access_key = Some(secret);
        }

        if let Some(flag) = lookup("S3GATEWAY_BACKEND_FORCE_PATH_STYLE") {
            config.backend.force_path_style = flag
                .parse()
                .context("S3GATEWAY_BACKEND_FORCE_PATH_STYLE must be true or false")?;
        }

        if let Some(addr) = lookup("S3GATEWAY_BIND_ADDRESS") {
            config.server.bind_address = addr
                .parse()
                .with_context(|| format!("invalid bind address {addr}"))?;
        }

        if let Some(timeout) = lookup("S3GATEWAY_TIMEOUT_SECS") {
            config.server.timeout_secs = timeout
                .parse()
                .context("S3GATEWAY_TIMEOUT_SECS must be an integer")?;
        }

        if let Some(size) = lookup("S3GATEWAY_MAX_BODY_SIZE") {
            config.server.max_body_size = size
                .parse()
                .context("S3GATEWAY_MAX_BODY_SIZE must be an integer")?;
        }

        if let Some(flag) = lookup("S3GATEWAY_TRUST_PROXY") {
            config.server.trust_proxy = flag
                .parse()
                .context("S3GATEWAY_TRUST_PROXY must be true or false")?;
        }

        if let Some(max_keys) = lookup("S3GATEWAY_DEFAULT_MAX_KEYS") {
            config.server.default_max_keys = max_keys
                .parse()
                .context("S3GATEWAY_DEFAULT_MAX_KEYS must be an integer")?;
        }

        if let Some(level) = lookup("S3GATEWAY_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("failed to parse {path}"))?;
        Ok(config)
    }

    /// Reject settings the backend could only fail on later
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(endpoint) = &self.backend.endpoint {
            url::Url::parse(endpoint)
                .with_context(|| format!("backend endpoint {endpoint} is not an absolute URL"))?;
        }

        match (
            &self.backend.access_key_id,
            &self.backend.secret_access_key,
        ) {
            (Some(_), None) | (None, Some(_)) => {
                bail!("access_key_id and secret_access_key must be set together")
            }
            _ => {}
        }

        if self.server.default_max_keys < 0 {
            bail!("default_max_keys must not be negative");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!(BackendType::from_str("s3").unwrap(), BackendType::S3);
        assert_eq!(BackendType::from_str("AWS").unwrap(), BackendType::S3);
        assert_eq!(BackendType::from_str("memory").unwrap(), BackendType::Memory);
        assert!(BackendType::from_str("azure").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server.default_max_keys, DEFAULT_MAX_KEYS);
        assert_eq!(config.server.bind_address.port(), 8080);
        assert!(!config.server.trust_proxy);
        assert_eq!(config.backend.backend_type, BackendType::S3);
        assert_eq!(config.log_level, "info");
        assert_eq!(
            config.server.max_body_size as u64,
            DEFAULT_MAX_BODY_SIZE.min(usize::MAX as u64)
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("S3GATEWAY_BACKEND_TYPE", "memory"),
            ("S3GATEWAY_BIND_ADDRESS", "127.0.0.1:9000"),
            ("S3GATEWAY_TRUST_PROXY", "true"),
            ("S3GATEWAY_DEFAULT_MAX_KEYS", "50"),
        ]))
        .unwrap();
        assert_eq!(config.backend.backend_type, BackendType::Memory);
        assert_eq!(config.server.bind_address.to_string(), "127.0.0.1:9000");
        assert!(config.server.trust_proxy);
        assert_eq!(config.server.default_max_keys, 50);
    }

    #[test]
    fn test_toml_sections_are_optional() {
        let config: Config = toml::from_str(
            r#"
            log_level = "debug"

            [backend]
            type = "s3"
            region = "eu-west-1"
            endpoint = "http://localhost:9000"
            force_path_style = true
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.backend.region.as_deref(), Some("eu-west-1"));
        assert!(config.backend.force_path_style);
        assert_eq!(config.server.timeout_secs, 300);
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_relative_endpoint() {
        let err = Config::from_lookup(lookup(&[("S3GATEWAY_BACKEND_ENDPOINT", "localhost")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_half_credentials() {
        let err = Config::from_lookup(lookup(&[("S3GATEWAY_BACKEND_ACCESS_KEY_ID", "AKIA")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let backend = BackendConfig {
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("hunter2".into()),
            ..BackendConfig::default()
        };
        let printed = format!("{:?}", backend);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }
}
