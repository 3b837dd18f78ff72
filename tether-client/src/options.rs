//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use tether_codec::{Codec, CodecTable, DEFAULT_CONTENT_TYPE};
use tether_discovery::{SelectOptions, Selector};
use tether_middleware::{Interceptor, Interceptors, RetryPolicy};
use tether_transport::{Channel, NetworkTransport, TlsClientConfig, Transport};

/// Default number of retries after the initial dial.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default interval between dial retries.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Settings for a [`Client`](crate::Client).
///
/// Built with chained setters; anything left unset keeps its default:
/// network transport, no selector, protobuf content type, and a fixed
/// 2s retry interval with 3 retries.
#[derive(Clone)]
pub struct ClientOptions {
    pub transport: Arc<dyn Transport>,
    pub selector: Option<Arc<dyn Selector>>,
    pub select_options: SelectOptions,
    /// Dial this host instead of resolving the service.
    pub host: Option<String>,
    /// Use this connection instead of dialing.
    pub connection: Option<Channel>,
    pub retry: RetryPolicy,
    pub content_type: String,
    /// Per-client codecs consulted before the default table.
    pub codecs: CodecTable,
    pub interceptors: Interceptors,
    pub tls: Option<TlsClientConfig>,
    pub dial_timeout: Option<Duration>,
    pub call_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            transport: Arc::new(NetworkTransport::default()),
            selector: None,
            select_options: SelectOptions::default(),
            host: None,
            connection: None,
            retry: RetryPolicy::fixed(DEFAULT_RETRY_INTERVAL, DEFAULT_MAX_ATTEMPTS),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            codecs: CodecTable::new(),
            interceptors: Interceptors::default(),
            tls: None,
            dial_timeout: None,
            call_timeout: None,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.selector = Some(selector);
        self
    }

    #[must_use]
    pub fn select_options(mut self, options: SelectOptions) -> Self {
        self.select_options = options;
        self
    }

    /// Skip discovery and dial `host` directly.
    #[must_use]
    pub fn host_override(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Reuse an existing connection; `connect` will not dial.
    #[must_use]
    pub fn with_connection(mut self, channel: Channel) -> Self {
        self.connection = Some(channel);
        self
    }

    /// Turn dial retries on or off.
    #[must_use]
    pub fn connection_attempts(mut self, enabled: bool) -> Self {
        self.retry.enabled = enabled;
        self
    }

    /// Retries made after the initial dial.
    #[must_use]
    pub fn max_connection_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_retries = attempts;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Add or replace a codec for this client only.
    #[must_use]
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codecs = self.codecs.with(codec);
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

    #[must_use]
    pub fn tls(mut self, config: TlsClientConfig) -> Self {
        self.tls = Some(config);
        self
    }

    #[must_use]
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }

    /// Deadline for calls whose context carries none.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("transport", &self.transport.name())
            .field("selector", &self.selector.as_ref().map(|s| s.name().to_string()))
            .field("host", &self.host)
            .field("retry", &self.retry)
            .field("content_type", &self.content_type)
            .field("codecs", &self.codecs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_codec::JsonCodec;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.transport.name(), "grpc");
        assert!(options.selector.is_none());
        assert!(options.retry.enabled);
        assert_eq!(options.retry.max_retries, 3);
        assert_eq!(options.retry.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(options.content_type, "application/protobuf");
        assert!(options.codecs.is_empty());
    }

    #[test]
    fn test_later_setters_override() {
        let options = ClientOptions::new()
            .max_connection_attempts(5)
            .connection_attempts(false)
            .content_type("application/json")
            .codec(JsonCodec::new())
            .host_override("10.0.0.1:9000");

        assert!(!options.retry.enabled);
        assert_eq!(options.retry.max_retries, 5);
        assert_eq!(options.content_type, "application/json");
        assert!(options.codecs.contains("application/json"));
        assert_eq!(options.host.as_deref(), Some("10.0.0.1:9000"));
    }
}
