//! # tether-transport
//!
//! Transport implementations for the tether RPC framework.
//!
//! This crate provides:
//! - `Transport` / `Listener` - the dial and listen contract
//! - `NetworkTransport` - TCP, optionally secured with rustls
//! - `MemoryTransport` - in-process transport over a caller-owned `ListenerRegistry`
//! - `Channel` - a multiplexed client connection with unary and streaming calls
//! - `Multiplexer` - request/response correlation

mod channel;
mod memory;
mod mux;
mod network;
mod tls;
mod transport;

pub use channel::{Channel, ClientStream};
pub use memory::{ListenerRegistry, MemoryListener, MemoryTransport, MEMORY_BACKLOG, MEMORY_PIPE_BUFFER};
pub use mux::Multiplexer;
pub use network::NetworkTransport;
pub use tls::{
    load_root_certs, server_name, ClientAuth, TlsClientConfig, TlsServerConfig,
    DEFAULT_HANDSHAKE_TIMEOUT,
};
pub use transport::{
    Accepted, BoxedIo, DialOptions, Io, Listener, ListenOptions, Transport, TransportOptions,
    DEFAULT_DIAL_TIMEOUT,
};
