//! # tether-client
//!
//! Client side of the tether RPC framework.
//!
//! A [`Client`] resolves a service to a host (override, selector, or the
//! name itself), dials it through its transport with bounded retry, and
//! caches the resulting channel for its lifetime.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_client::{Client, ClientOptions};
//! use tether_discovery::MemorySelector;
//!
//! let client = Client::new(
//!     ClientOptions::new()
//!         .transport(transport)
//!         .selector(Arc::new(MemorySelector::new())),
//! );
//! client.connect("greeter").await?;
//! let reply: HelloReply = client.call(Context::new(), "Greeter.SayHello", &request).await?;
//! ```

mod client;
mod options;

pub use client::Client;
pub use options::{ClientOptions, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL};
