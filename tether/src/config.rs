//! File and environment configuration.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use tether_client::ClientOptions;
use tether_codec::DEFAULT_CONTENT_TYPE;
use tether_core::ConfigError;
use tether_middleware::RetryPolicy;
use tether_server::ServerOptions;

/// File read by [`TetherConfig::load`].
pub const CONFIG_FILE: &str = "tether.toml";
/// Prefix of overriding environment variables; `__` separates nested keys,
/// e.g. `TETHER_SERVER__PORT`.
pub const ENV_PREFIX: &str = "TETHER_";

/// Component names and option defaults for services and clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_registry")]
    pub registry: String,
    #[serde(default = "default_selector")]
    pub selector: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 lets the server pick a free port.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_version")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Retry failed dials.
    #[serde(default = "default_true")]
    pub retry: bool,
    /// Retries after the first dial.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_transport() -> String {
    crate::builder::TRANSPORT_GRPC.to_owned()
}

fn default_registry() -> String {
    crate::builder::REGISTRY_MDNS.to_owned()
}

fn default_selector() -> String {
    crate::builder::SELECTOR_STATIC.to_owned()
}

fn default_host() -> String {
    tether_server::DEFAULT_HOST.to_owned()
}

fn default_version() -> String {
    tether_server::DEFAULT_VERSION.to_owned()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    tether_client::DEFAULT_MAX_ATTEMPTS
}

fn default_retry_interval_ms() -> u64 {
    2000
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_owned()
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            registry: default_registry(),
            selector: default_selector(),
            server: ServerConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            version: default_version(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: true,
            max_attempts: default_max_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
            content_type: default_content_type(),
        }
    }
}

impl TetherConfig {
    /// Load from `tether.toml` in the working directory, if present, with
    /// `TETHER_*` overrides.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] when a source is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load from `path`, if present, with `TETHER_*` overrides.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] when a source is malformed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Parse TOML text, without environment overrides.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] when `content` is malformed.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Server options for `name`. Transport and registry are left to the
    /// [`Builder`](crate::Builder).
    #[must_use]
    pub fn server_options(&self, name: impl Into<String>) -> ServerOptions {
        ServerOptions::new(name)
            .host(self.server.host.clone())
            .port(self.server.port)
            .version(self.server.version.clone())
    }

    /// Client options with retry and content type applied.
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        let mut retry = RetryPolicy::fixed(
            Duration::from_millis(self.client.retry_interval_ms),
            self.client.max_attempts,
        );
        retry.enabled = self.client.retry;
        ClientOptions::new()
            .retry_policy(retry)
            .content_type(self.client.content_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = TetherConfig::parse("").unwrap();
        assert_eq!(config, TetherConfig::default());
        assert_eq!(config.transport, "grpc");
        assert_eq!(config.registry, "mdns");
        assert_eq!(config.selector, "static");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 0);
        assert_eq!(config.server.version, "v0.0.1");
        assert!(config.client.retry);
        assert_eq!(config.client.max_attempts, 3);
        assert_eq!(config.client.retry_interval_ms, 2000);
        assert_eq!(config.client.content_type, "application/protobuf");
    }

    #[test]
    fn test_parse_partial() {
        let config = TetherConfig::parse(
            r#"
            transport = "memory"
            selector = "memory"

            [server]
            port = 9000

            [client]
            retry = false
            "#,
        )
        .unwrap();

        assert_eq!(config.transport, "memory");
        assert_eq!(config.registry, "mdns");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.client.retry);
        assert_eq!(config.client.max_attempts, 3);
    }

    #[test]
    fn test_parse_error() {
        let err = TetherConfig::parse("[server]\nport = \"high\"").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("TETHER_REGISTRY", "memory");
        std::env::set_var("TETHER_SERVER__PORT", "7100");
        let config = TetherConfig::load_from("does-not-exist.toml");
        std::env::remove_var("TETHER_REGISTRY");
        std::env::remove_var("TETHER_SERVER__PORT");

        let config = config.unwrap();
        assert_eq!(config.registry, "memory");
        assert_eq!(config.server.port, 7100);
        assert_eq!(config.transport, "grpc");
    }

    #[test]
    fn test_option_mapping() {
        let mut config = TetherConfig::default();
        config.server.port = 8123;
        config.client.retry = false;
        config.client.max_attempts = 5;
        config.client.retry_interval_ms = 50;
        config.client.content_type = "application/json".into();

        let server = config.server_options("orders");
        assert_eq!(server.service_name, "orders");
        assert_eq!(server.port, 8123);
        assert_eq!(server.version, "v0.0.1");

        let client = config.client_options();
        assert!(!client.retry.enabled);
        assert_eq!(client.retry.max_retries, 5);
        assert_eq!(client.content_type, "application/json");
    }
}
