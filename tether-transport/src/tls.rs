//! TLS support for the network transport using Rustls.
//!
//! - [`TlsClientConfig`] - Client-side TLS configuration
//! - [`TlsServerConfig`] - Server-side TLS configuration
//! - [`ClientAuth`] - Client authentication modes for mutual TLS
//!
//! ## Client Configuration
//!
//! ```rust,ignore
//! use tether_transport::TlsClientConfig;
//!
//! // Public servers, verified against Mozilla's root certificates
//! let config = TlsClientConfig::new();
//!
//! // Private CA
//! let root_certs = tether_transport::load_root_certs("ca-cert.pem")?;
//! let config = TlsClientConfig::with_root_certs(root_certs);
//! ```
//!
//! A transport marked `secure` without any client config dials with
//! [`TlsClientConfig::insecure`], which accepts any server certificate.
//!
//! ## Server Configuration
//!
//! ```rust,ignore
//! use tether_transport::TlsServerConfig;
//!
//! let config = TlsServerConfig::load_from_pem("server-cert.pem", "server-key.pem")?;
//! ```

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::{client, server, TlsAcceptor, TlsConnector};

use tether_core::TransportError;

/// Default bound on a TLS handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// TLS configuration for clients.
#[derive(Clone)]
pub struct TlsClientConfig {
    config: Arc<ClientConfig>,
    pub handshake_timeout: Duration,
}

impl std::fmt::Debug for TlsClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsClientConfig")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

impl TlsClientConfig {
    /// Client config trusting Mozilla's root certificates.
    #[must_use]
    pub fn new() -> Self {
        let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_root_certs(root_store)
    }

    /// Client config trusting a custom root store.
    #[must_use]
    pub fn with_root_certs(root_certs: RootCertStore) -> Self {
        let config = ClientConfig::builder()
            .with_root_certificates(root_certs)
            .with_no_client_auth();

        Self::from_rustls(config)
    }

    /// Client config presenting a certificate for mutual TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate or key is invalid.
    pub fn with_client_cert(
        root_certs: RootCertStore,
        cert_chain: Vec<CertificateDer<'static>>,
        private_key: PrivateKeyDer<'static>,
    ) -> Result<Self, rustls::Error> {
        let config = ClientConfig::builder()
            .with_root_certificates(root_certs)
            .with_client_auth_cert(cert_chain, private_key)?;

        Ok(Self::from_rustls(config))
    }

    /// Client config that accepts any server certificate.
    #[must_use]
    pub fn insecure() -> Self {
        let provider = CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));

        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
            .with_no_client_auth();

        Self::from_rustls(config)
    }

    /// Wrap an existing Rustls client config.
    #[must_use]
    pub fn from_rustls(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn rustls_config(&self) -> Arc<ClientConfig> {
        self.config.clone()
    }

    /// Run the client handshake over `stream`. `host` is used for SNI and
    /// certificate name checks.
    pub(crate) async fn connect(
        &self,
        host: &str,
        stream: TcpStream,
    ) -> Result<client::TlsStream<TcpStream>, TransportError> {
        let name = server_name(host).map_err(|e| TransportError::Tls(e.to_string()))?;
        let connector = TlsConnector::from(self.config.clone());

        tokio::time::timeout(self.handshake_timeout, connector.connect(name, stream))
            .await
            .map_err(|_| TransportError::Tls(format!("handshake with {host} timed out")))?
            .map_err(|e| TransportError::Tls(e.to_string()))
    }
}

impl Default for TlsClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Client authentication mode for TLS servers.
#[derive(Clone)]
pub enum ClientAuth {
    None,
    /// Request a client certificate but don't require it.
    Optional(Arc<RootCertStore>),
    /// Require a valid client certificate.
    Required(Arc<RootCertStore>),
}

impl std::fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "ClientAuth::None"),
            Self::Optional(_) => write!(f, "ClientAuth::Optional"),
            Self::Required(_) => write!(f, "ClientAuth::Required"),
        }
    }
}

/// TLS configuration for servers.
#[derive(Clone)]
pub struct TlsServerConfig {
    config: Arc<ServerConfig>,
    pub handshake_timeout: Duration,
}

impl std::fmt::Debug for TlsServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsServerConfig")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

impl TlsServerConfig {
    /// # Errors
    ///
    /// Returns an error if the certificate or key is invalid.
    pub fn new(
        cert_chain: Vec<CertificateDer<'static>>,
        private_key: PrivateKeyDer<'static>,
    ) -> Result<Self, rustls::Error> {
        Self::with_client_auth(cert_chain, private_key, ClientAuth::None)
    }

    /// Load the server certificate chain and key from PEM files.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be read or parsed.
    pub fn load_from_pem(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> io::Result<Self> {
        let cert_chain = load_certs(cert_path)?;
        let private_key = load_private_key(key_path)?;

        Self::new(cert_chain, private_key)
            .map_err(|e| io::Error::other(format!("TLS config error: {e}")))
    }

    /// # Errors
    ///
    /// Returns an error if the certificate or key is invalid.
    pub fn with_client_auth(
        cert_chain: Vec<CertificateDer<'static>>,
        private_key: PrivateKeyDer<'static>,
        client_auth: ClientAuth,
    ) -> Result<Self, rustls::Error> {
        let builder = ServerConfig::builder();

        let config = match client_auth {
            ClientAuth::None => builder
                .with_no_client_auth()
                .with_single_cert(cert_chain, private_key)?,
            ClientAuth::Optional(root_certs) => {
                let verifier = rustls::server::WebPkiClientVerifier::builder(root_certs)
                    .allow_unauthenticated()
                    .build()
                    .map_err(|e| rustls::Error::General(e.to_string()))?;
                builder
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(cert_chain, private_key)?
            }
            ClientAuth::Required(root_certs) => {
                let verifier = rustls::server::WebPkiClientVerifier::builder(root_certs)
                    .build()
                    .map_err(|e| rustls::Error::General(e.to_string()))?;
                builder
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(cert_chain, private_key)?
            }
        };

        Ok(Self {
            config: Arc::new(config),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn rustls_config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    pub(crate) fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.config.clone())
    }

    pub(crate) async fn accept(
        &self,
        acceptor: &TlsAcceptor,
        stream: TcpStream,
    ) -> Result<server::TlsStream<TcpStream>, TransportError> {
        tokio::time::timeout(self.handshake_timeout, acceptor.accept(stream))
            .await
            .map_err(|_| TransportError::Tls("handshake timed out".into()))?
            .map_err(|e| TransportError::Tls(e.to_string()))
    }
}

/// Accepts every server certificate; handshake signatures are still checked.
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn load_certs(path: impl AsRef<Path>) -> io::Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader).collect()
}

fn load_private_key(path: impl AsRef<Path>) -> io::Result<PrivateKeyDer<'static>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| io::Error::other("no private key found in file"))
}

/// Create a `ServerName` from a host name or IP literal.
///
/// # Errors
///
/// Returns an error if the name is not a valid DNS name or IP address.
pub fn server_name(name: &str) -> io::Result<ServerName<'static>> {
    ServerName::try_from(name.to_string())
        .map_err(|e| io::Error::other(format!("invalid server name: {e}")))
}

/// Load root certificates from a PEM file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains invalid certificates.
pub fn load_root_certs(path: impl AsRef<Path>) -> io::Result<RootCertStore> {
    let certs = load_certs(path)?;
    let mut store = RootCertStore::empty();
    for cert in certs {
        store
            .add(cert)
            .map_err(|e| io::Error::other(format!("invalid root certificate: {e}")))?;
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name() {
        assert!(server_name("api.example.com").is_ok());
        assert!(server_name("10.0.0.1").is_ok());
        assert!(server_name("not a host").is_err());
    }

    #[test]
    fn test_insecure_config_builds() {
        let config = TlsClientConfig::insecure().handshake_timeout(Duration::from_secs(2));
        assert_eq!(config.handshake_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_missing_pem_file() {
        assert!(load_root_certs("/nonexistent/ca.pem").is_err());
        assert!(TlsServerConfig::load_from_pem("/nonexistent/a.pem", "/nonexistent/b.pem").is_err());
    }
}
