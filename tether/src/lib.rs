//! # tether
//!
//! Service discovery, node selection and pluggable transports for RPC
//! services.
//!
//! tether provides:
//! - **Discovery**: publish a service and its endpoint schema to a [`Registry`]
//! - **Selection**: resolve service names to nodes with fixed, static (DNS
//!   template), memory or registry-backed [`Selector`]s
//! - **Transports**: TCP with optional TLS, or an in-process memory
//!   transport that behaves the same for tests
//! - **Assembly**: a [`Builder`] that turns configuration names into
//!   components, and a [`Service`] wrapper around a server
//!
//! ## Quick Start
//!
//! ```rust
//! use tether::{Builder, Context};
//!
//! let builder = Builder::new();
//! let components = builder.components("memory", "memory", "memory").unwrap();
//! assert_eq!(components.registry.name(), "memory");
//!
//! let ctx = Context::with_timeout(std::time::Duration::from_secs(5));
//! assert!(ctx.deadline.is_some());
//! ```
//!
//! ## Architecture
//!
//! - [`tether-core`](tether_core) - errors, context, registry records, handler trait
//! - [`tether-codec`](tether_codec) - framing and content-type codecs
//! - [`tether-transport`](tether_transport) - network and memory transports
//! - [`tether-discovery`](tether_discovery) - selectors and the memory registry
//! - [`tether-middleware`](tether_middleware) - interceptors and retry policy
//! - [`tether-macros`](tether_macros) - `#[handler]` and `#[derive(Schema)]`
//! - [`tether-client`](tether_client) / [`tether-server`](tether_server)
//!
//! Code generated by the macros refers to `::tether_core`, so crates that
//! use them depend on `tether-core` as well.

pub mod builder;
pub mod config;
pub mod logging;
pub mod service;

pub use tether_client;
pub use tether_codec;
pub use tether_core;
pub use tether_discovery;
pub use tether_middleware;
pub use tether_server;
pub use tether_transport;

pub use builder::{BuildError, Builder, Components};
pub use config::TetherConfig;
pub use service::{commit, version, Closer, Service};

pub use tether_client::{Client, ClientOptions};
pub use tether_core::{
    Context, Endpoint, Env, Handler, Node, Registry, Schema, Sender, Streaming, TetherError, Value,
};
pub use tether_discovery::{
    FixedSelector, MemoryRegistry, MemorySelector, RegistrySelector, Selector, StaticSelector,
};
pub use tether_macros::{handler, Schema};
pub use tether_middleware::{Interceptor, RetryPolicy, TimeoutInterceptor, TracingInterceptor};
pub use tether_server::{HandlerOptions, Server, ServerOptions};
pub use tether_transport::{ListenerRegistry, MemoryTransport, NetworkTransport, Transport};

pub use rkyv::{Archive, Deserialize, Serialize};

/// Prelude module for convenient imports.
///
/// ```rust
/// use tether::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        handler, Archive, Builder, Client, ClientOptions, Context, Deserialize, HandlerOptions,
        Schema, Sender, Serialize, Service, Streaming, TetherError,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
