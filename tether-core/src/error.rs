//! Error types for the tether RPC framework.

use std::sync::Arc;
use std::time::Duration;

/// Main error type for tether operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TetherError {
    /// Transport-level error (dial, listen, IO).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Codec error (framing or envelope serialization).
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The selector could not produce a node.
    #[error("selection error: {0}")]
    Select(#[from] SelectError),

    /// Registry backend failure.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Misconfiguration detected at construction or lookup time.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Service-level error returned by an RPC handler.
    #[error("service error [{code}]: {message}")]
    Service {
        /// Error code for programmatic handling
        code: u32,
        /// Human-readable error message
        message: String,
    },

    /// Request timed out
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Method not found on the handler
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// No handler registered under this name
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// Invalid request format
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Every dial attempt allowed by the retry policy failed.
    #[error("could not create client for {service}. Exhausted connection attempts: {attempts}")]
    ConnectionExhausted {
        /// Target service name
        service: String,
        /// Number of retries made after the initial dial
        attempts: u32,
    },

    /// The client finished connecting without holding a connection.
    #[error("no connection available for {0}")]
    NoConnection(String),
}

/// Transport-level errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// IO error from the underlying stream
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    /// Connection was closed unexpectedly
    #[error("connection closed")]
    ConnectionClosed,

    /// Failed to connect to the remote endpoint
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Dial did not complete within the configured timeout
    #[error("dial to {addr} timed out after {timeout:?}")]
    DialTimeout {
        /// Address being dialed
        addr: String,
        /// Configured dial timeout
        timeout: Duration,
    },

    /// Memory transport has no listener under the dialed address.
    #[error("memory transport can't find listener {addr}, registered listeners: [{}]", available.join(", "))]
    ListenerNotFound {
        /// Address that was dialed
        addr: String,
        /// Names currently registered
        available: Vec<String>,
    },

    /// Listener was closed while accepting or being dialed
    #[error("listener closed: {0}")]
    ListenerClosed(String),

    /// Another listener already owns the address
    #[error("address already in use: {0}")]
    AddressInUse(String),

    /// TLS configuration or handshake failure
    #[error("tls error: {0}")]
    Tls(String),

    /// Protocol violation
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Codec errors for framing and envelope serialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    /// Frame size exceeds maximum allowed
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Invalid frame format
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization or validation failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// IO error while reading or writing frames
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
}

/// Node selection errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    /// No record of the service exists.
    #[error("service not found: {0}")]
    NotFound(String),

    /// The service exists but every node was filtered out or is tripped.
    #[error("no nodes available for {0}")]
    NoneAvailable(String),

    /// The backing registry query failed.
    #[error("registry lookup failed: {0}")]
    Registry(String),

    /// The selector has been closed.
    #[error("selector closed")]
    Closed,
}

/// Registry backend errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Advertising the service failed
    #[error("register failed: {0}")]
    Register(String),

    /// Removing the service failed
    #[error("deregister failed: {0}")]
    Deregister(String),

    /// Service is unknown to the registry
    #[error("service not found: {0}")]
    NotFound(String),

    /// Operation exceeded its deadline
    #[error("registry operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No codec registered for the content type
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Static selector suffix mode is not recognized
    #[error("static selector misconfigured, suffix mode = '{mode}'")]
    InvalidSuffixMode {
        /// The offending mode string
        mode: String,
    },

    /// A registry-backed component was built without a registry
    #[error("a registry is required for {0}")]
    MissingRegistry(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Configuration source could not be loaded
    #[error("failed to load configuration: {0}")]
    Load(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<std::io::Error> for TetherError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.into())
    }
}

impl TetherError {
    /// Create a service error with code and message.
    #[must_use]
    pub fn service(code: u32, message: impl Into<String>) -> Self {
        Self::Service {
            code,
            message: message.into(),
        }
    }

    /// Status code carried in an error envelope for this error.
    #[must_use]
    pub fn code(&self) -> u32 {
        use crate::message::status;
        match self {
            Self::Service { code, .. } => *code,
            Self::Timeout(_) => status::DEADLINE_EXCEEDED,
            Self::Cancelled => status::CANCELLED,
            Self::MethodNotFound(_) | Self::ServiceNotFound(_) => status::UNIMPLEMENTED,
            Self::InvalidRequest(_) | Self::Codec(_) => status::INVALID_ARGUMENT,
            Self::Transport(_) | Self::ConnectionExhausted { .. } | Self::NoConnection(_) => {
                status::UNAVAILABLE
            }
            _ => status::INTERNAL,
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(
                TransportError::Io(_)
                    | TransportError::ConnectionClosed
                    | TransportError::ConnectionFailed(_)
                    | TransportError::DialTimeout { .. }
                    | TransportError::ListenerNotFound { .. }
            ) | Self::Timeout(_)
        )
    }

    /// Check if this error means the connection is no longer usable.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(
                TransportError::ConnectionClosed
                    | TransportError::Io(_)
                    | TransportError::Protocol(_)
            )
        )
    }
}
