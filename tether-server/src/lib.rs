//! # tether-server
//!
//! Server side of the tether RPC framework.
//!
//! A [`Server`] serves registered [`Handler`](tether_core::Handler)s over a
//! transport. [`Server::run`] picks a port, publishes the service and its
//! endpoints to the configured registry, and accepts connections until
//! [`Server::stop`] or a shutdown signal tears it down: deregister with a
//! bounded timeout, then drain in-flight calls.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_server::{HandlerOptions, Server, ServerOptions};
//!
//! let server = Server::new(
//!     ServerOptions::new("greeter")
//!         .transport(transport)
//!         .registry(registry),
//! );
//! server.add_handler(Greeter, HandlerOptions::new());
//! server.run().await?;
//! ```

mod dispatch;
mod handler;
mod net;
mod options;
mod server;
mod signal;

pub use handler::RegisteredHandler;
pub use net::{extract_host, free_port, generate_id, host_port};
pub use options::{
    HandlerOptions, ServerOptions, DEFAULT_DEREGISTER_TIMEOUT, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_HOST, DEFAULT_VERSION,
};
pub use server::{
    Server, PROTOCOL, PROTOCOL_METADATA_KEY, REGISTRY_METADATA_KEY, TRANSPORT_METADATA_KEY,
};
pub use signal::shutdown_signal;
