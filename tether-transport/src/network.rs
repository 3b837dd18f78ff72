//! TCP transport with optional TLS.

use std::io;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use tether_core::TransportError;

use crate::tls::{TlsClientConfig, TlsServerConfig};
use crate::transport::{
    Accepted, BoxedIo, DialOptions, Listener, ListenOptions, Transport, TransportOptions,
};

/// Transport over real TCP sockets.
///
/// Dials use TLS when the dial or transport carries a client config, or when
/// the transport is marked `secure` (in which case server certificates are
/// not verified). Otherwise connections are plaintext.
#[derive(Debug, Default)]
pub struct NetworkTransport {
    options: TransportOptions,
}

impl NetworkTransport {
    #[must_use]
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }

    fn client_tls(&self, dial: &DialOptions) -> Option<TlsClientConfig> {
        dial.tls
            .clone()
            .or_else(|| self.options.tls_client.clone())
            .or_else(|| self.options.secure.then(TlsClientConfig::insecure))
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    fn init(&mut self, options: TransportOptions) {
        self.options = options;
    }

    fn options(&self) -> &TransportOptions {
        &self.options
    }

    async fn connect(&self, addr: &str, options: &DialOptions) -> Result<BoxedIo, TransportError> {
        let timeout = options.timeout.unwrap_or(self.options.timeout);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::DialTimeout {
                addr: addr.to_string(),
                timeout,
            })?
            .map_err(|e| {
                tracing::error!(addr, error = %e, "can't dial");
                TransportError::ConnectionFailed(format!("{addr}: {e}"))
            })?;
        stream.set_nodelay(true)?;

        match self.client_tls(options) {
            Some(tls) => Ok(Box::new(tls.connect(host_of(addr), stream).await?)),
            None => Ok(Box::new(stream)),
        }
    }

    async fn listen(
        &self,
        addr: &str,
        options: ListenOptions,
    ) -> Result<Box<dyn Listener>, TransportError> {
        let inner = TcpListener::bind(addr).await.map_err(|e| match e.kind() {
            io::ErrorKind::AddrInUse => TransportError::AddressInUse(addr.to_string()),
            _ => TransportError::from(e),
        })?;
        let local = inner.local_addr()?.to_string();
        tracing::info!(addr = %local, "listening");

        let tls = options
            .tls
            .or_else(|| self.options.tls_server.clone())
            .map(|config| {
                let acceptor = config.acceptor();
                (config, acceptor)
            });

        Ok(Box::new(NetworkListener {
            inner,
            tls,
            local,
            closed: CancellationToken::new(),
        }))
    }

    fn name(&self) -> &str {
        "grpc"
    }
}

struct NetworkListener {
    inner: TcpListener,
    tls: Option<(TlsServerConfig, TlsAcceptor)>,
    local: String,
    closed: CancellationToken,
}

#[async_trait]
impl Listener for NetworkListener {
    async fn accept(&self) -> Result<Accepted, TransportError> {
        let (stream, peer) = tokio::select! {
            () = self.closed.cancelled() => {
                return Err(TransportError::ListenerClosed(self.local.clone()));
            }
            accepted = self.inner.accept() => accepted?,
        };
        stream.set_nodelay(true)?;

        let peer = peer.to_string();
        match &self.tls {
            Some((config, acceptor)) => {
                let config = config.clone();
                let acceptor = acceptor.clone();
                Ok(Accepted::pending(peer, async move {
                    let io: BoxedIo = Box::new(config.accept(&acceptor, stream).await?);
                    Ok(io)
                }))
            }
            None => Ok(Accepted::ready(stream, peer)),
        }
    }

    fn addr(&self) -> String {
        self.local.clone()
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

/// Host part of `host:port`, without IPv6 brackets.
fn host_of(addr: &str) -> &str {
    let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
    host.trim_start_matches('[').trim_end_matches(']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("api.example.com:443"), "api.example.com");
        assert_eq!(host_of("[::1]:8080"), "::1");
        assert_eq!(host_of("localhost"), "localhost");
    }

    #[tokio::test]
    async fn test_tcp_listen_and_dial() {
        let transport = NetworkTransport::default();
        let listener = transport
            .listen("127.0.0.1:0", ListenOptions::default())
            .await
            .unwrap();
        let addr = listener.addr();

        let mut client = transport.connect(&addr, &DialOptions::default()).await.unwrap();
        let mut server = listener.accept().await.unwrap().establish().await.unwrap();

        client.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to obtain a port nothing listens on.
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let transport = NetworkTransport::new(
            TransportOptions::default().timeout(Duration::from_secs(1)),
        );

        let result = transport
            .connect(&format!("127.0.0.1:{port}"), &DialOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed(_) | TransportError::DialTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_address_in_use() {
        let transport = NetworkTransport::default();
        let first = transport
            .listen("127.0.0.1:0", ListenOptions::default())
            .await
            .unwrap();

        let err = transport
            .listen(&first.addr(), ListenOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::AddressInUse(_)));
    }
}
