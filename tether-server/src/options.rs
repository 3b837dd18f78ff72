//! Server and handler configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tether_codec::{Codec, CodecTable};
use tether_core::Registry;
use tether_middleware::{Interceptor, Interceptors};
use tether_transport::{NetworkTransport, TlsServerConfig, Transport};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_VERSION: &str = "v0.0.1";

/// Bound on deregistration during teardown.
pub const DEFAULT_DEREGISTER_TIMEOUT: Duration = Duration::from_secs(3);

/// Bound on waiting for in-flight calls during teardown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for a [`Server`](crate::Server).
#[derive(Clone)]
pub struct ServerOptions {
    pub service_name: String,
    pub version: String,
    pub host: String,
    /// 0 picks a free port (network transports only).
    pub port: u16,
    /// Extra node metadata published to the registry.
    pub metadata: HashMap<String, String>,
    pub registry: Option<Arc<dyn Registry>>,
    pub transport: Arc<dyn Transport>,
    pub tls: Option<TlsServerConfig>,
    pub interceptors: Interceptors,
    /// Per-server codecs consulted before the default table.
    pub codecs: CodecTable,
    pub deregister_timeout: Duration,
    pub drain_timeout: Duration,
    /// Tear down on SIGINT/SIGTERM.
    pub handle_signals: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            version: DEFAULT_VERSION.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: 0,
            metadata: HashMap::new(),
            registry: None,
            transport: Arc::new(NetworkTransport::default()),
            tls: None,
            interceptors: Interceptors::default(),
            codecs: CodecTable::new(),
            deregister_timeout: DEFAULT_DEREGISTER_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            handle_signals: true,
        }
    }
}

impl ServerOptions {
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn tls(mut self, config: TlsServerConfig) -> Self {
        self.tls = Some(config);
        self
    }

    #[must_use]
    pub fn unary_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.unary = self.interceptors.unary.with(interceptor);
        self
    }

    #[must_use]
    pub fn stream_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.stream = self.interceptors.stream.with(interceptor);
        self
    }

    /// Add or replace a codec for this server only.
    #[must_use]
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codecs = self.codecs.with(codec);
        self
    }

    #[must_use]
    pub fn deregister_timeout(mut self, timeout: Duration) -> Self {
        self.deregister_timeout = timeout;
        self
    }

    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions")
            .field("service_name", &self.service_name)
            .field("version", &self.version)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("registry", &self.registry.as_ref().map(|r| r.name().to_string()))
            .field("transport", &self.transport.name())
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

/// Per-handler registration controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOptions {
    /// Serve the handler but leave its endpoints out of the registry record.
    pub internal: bool,
    /// Extra metadata per endpoint, keyed by `"<Handler>.<Method>"`.
    pub metadata: HashMap<String, HashMap<String, String>>,
}

impl HandlerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    #[must_use]
    pub fn endpoint_metadata(
        mut self,
        endpoint: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Self {
        self.metadata.insert(endpoint.into(), metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ServerOptions::new("greeter");
        assert_eq!(options.service_name, "greeter");
        assert_eq!(options.version, "v0.0.1");
        assert_eq!(options.host, "0.0.0.0");
        assert_eq!(options.port, 0);
        assert_eq!(options.transport.name(), "grpc");
        assert_eq!(options.deregister_timeout, Duration::from_secs(3));
        assert!(options.registry.is_none());
    }

    #[test]
    fn test_handler_options() {
        let options = HandlerOptions::new().internal(true).endpoint_metadata(
            "Greeter.Hello",
            HashMap::from([("auth".to_string(), "none".to_string())]),
        );
        assert!(options.internal);
        assert_eq!(options.metadata["Greeter.Hello"]["auth"], "none");
    }
}
