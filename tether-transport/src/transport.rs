//! Transport and listener contracts shared by the network and memory
//! transports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncRead, AsyncWrite};

use tether_codec::{Codec, ProtobufCodec};
use tether_core::{TetherError, TransportError};
use tether_middleware::Interceptors;

use crate::channel::Channel;
use crate::tls::{TlsClientConfig, TlsServerConfig};

/// Dial timeout applied when neither the transport nor the dial overrides it.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// A bidirectional byte stream produced by a transport.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased connection stream.
pub type BoxedIo = Box<dyn Io>;

/// Transport-wide settings applied through [`Transport::init`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Dial with TLS even without an explicit client config.
    pub secure: bool,
    /// Client TLS settings; implies `secure`.
    pub tls_client: Option<TlsClientConfig>,
    /// Server TLS settings used by `listen`.
    pub tls_server: Option<TlsServerConfig>,
    /// Upper bound on establishing a connection.
    pub timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            secure: false,
            tls_client: None,
            tls_server: None,
            timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

impl TransportOptions {
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn tls_client(mut self, config: TlsClientConfig) -> Self {
        self.tls_client = Some(config);
        self
    }

    #[must_use]
    pub fn tls_server(mut self, config: TlsServerConfig) -> Self {
        self.tls_server = Some(config);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Per-dial settings: the envelope codec, client interceptors and timeouts.
#[derive(Clone)]
pub struct DialOptions {
    pub codec: Arc<dyn Codec>,
    pub interceptors: Interceptors,
    /// Overrides the transport's dial timeout.
    pub timeout: Option<Duration>,
    /// Deadline given to calls whose context carries none.
    pub call_timeout: Option<Duration>,
    /// Overrides the transport's client TLS settings.
    pub tls: Option<TlsClientConfig>,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            codec: Arc::new(ProtobufCodec::new()),
            interceptors: Interceptors::default(),
            timeout: None,
            call_timeout: None,
            tls: None,
        }
    }
}

impl DialOptions {
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn interceptors(mut self, interceptors: Interceptors) -> Self {
        self.interceptors = interceptors;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn tls(mut self, config: TlsClientConfig) -> Self {
        self.tls = Some(config);
        self
    }
}

impl std::fmt::Debug for DialOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialOptions")
            .field("content_type", &self.codec.content_type())
            .field("interceptors", &self.interceptors)
            .field("timeout", &self.timeout)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

/// Per-listen settings.
#[derive(Debug, Clone, Default)]
pub struct ListenOptions {
    /// Overrides the transport's server TLS settings.
    pub tls: Option<TlsServerConfig>,
}

/// A connection taken off a listener whose setup, such as a TLS handshake,
/// has not run yet.
///
/// Listeners hand these out without blocking on the peer; the caller runs
/// [`Accepted::establish`] on the connection's own task.
pub struct Accepted {
    peer: String,
    setup: BoxFuture<'static, Result<BoxedIo, TransportError>>,
}

impl Accepted {
    /// A connection that needs no further setup.
    pub fn ready(io: impl Io, peer: impl Into<String>) -> Self {
        let io: BoxedIo = Box::new(io);
        Self {
            peer: peer.into(),
            setup: futures::future::ready(Ok(io)).boxed(),
        }
    }

    /// A connection that becomes usable once `setup` completes.
    pub fn pending<F>(peer: impl Into<String>, setup: F) -> Self
    where
        F: std::future::Future<Output = Result<BoxedIo, TransportError>> + Send + 'static,
    {
        Self {
            peer: peer.into(),
            setup: setup.boxed(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Finish setup and return the stream.
    ///
    /// # Errors
    ///
    /// Fails if the handshake fails or times out.
    pub async fn establish(self) -> Result<BoxedIo, TransportError> {
        self.setup.await
    }
}

impl std::fmt::Debug for Accepted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accepted")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Accepts inbound connections.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Wait for the next connection. Only the accept itself is awaited here;
    /// handshakes run when the result is established.
    async fn accept(&self) -> Result<Accepted, TransportError>;

    /// Address this listener is bound to.
    fn addr(&self) -> String;

    /// Stop accepting. Pending and future `accept` calls fail.
    fn close(&self);
}

/// Strategy for establishing connections.
///
/// `connect` opens a raw stream; `dial` runs the connection preface over it
/// and returns a multiplexed [`Channel`]. Dial failures are returned as-is:
/// retrying is the client's job.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Apply transport-wide options. Called before the transport is shared.
    fn init(&mut self, options: TransportOptions);

    fn options(&self) -> &TransportOptions;

    /// Open a raw stream to `addr`.
    async fn connect(&self, addr: &str, options: &DialOptions) -> Result<BoxedIo, TransportError>;

    /// Bind a listener at `addr`.
    async fn listen(
        &self,
        addr: &str,
        options: ListenOptions,
    ) -> Result<Box<dyn Listener>, TransportError>;

    /// Implementation name, e.g. `grpc` or `memory`.
    fn name(&self) -> &str;

    /// Connect to `addr` and set up a call channel.
    async fn dial(&self, addr: &str, options: DialOptions) -> Result<Channel, TetherError> {
        let io = self.connect(addr, &options).await?;
        Channel::establish(io, addr, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_codec::CONTENT_TYPE_PROTOBUF;

    #[test]
    fn test_defaults() {
        let options = TransportOptions::default();
        assert!(!options.secure);
        assert_eq!(options.timeout, DEFAULT_DIAL_TIMEOUT);

        let dial = DialOptions::default();
        assert_eq!(dial.codec.content_type(), CONTENT_TYPE_PROTOBUF);
        assert!(dial.interceptors.unary.is_empty());
        assert!(dial.timeout.is_none());
    }
}
