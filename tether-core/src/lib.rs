//! # tether-core
//!
//! Core types, traits, and error definitions for the tether RPC framework.
//!
//! This crate provides:
//! - Error types (`TetherError` and the per-layer errors it wraps)
//! - Call context (`Context`)
//! - The wire `Envelope`
//! - Registry records (`Node`, `Service`, `Endpoint`, `Value`) and the `Registry` trait
//! - The `Schema` trait for bounded request/response descriptions
//! - The `Handler` trait and typed stream handles
//! - The deployment `Env` tag

mod context;
mod env;
mod error;
mod handler;
mod message;
mod registry;
mod schema;
mod stream;

pub mod wire;

pub use context::{Context, Metadata, TraceId, TIMEOUT_HEADER, TRACE_HEADER};
pub use env::{Env, ENV_VAR};
pub use error::{
    CodecError, ConfigError, RegistryError, SelectError, TetherError, TransportError,
};
pub use handler::{error_only_value, EndpointDescriptor, EndpointKind, Handler, Payload};
pub use message::{status, Envelope, MessageKind};
pub use registry::{
    DeregisterOptions, Endpoint, Node, Registry, Service, Value, STREAM_IN_KEY, STREAM_KEY,
    STREAM_OUT_KEY,
};
pub use schema::{push_field, Schema, MAX_DEPTH};
pub use stream::{Inbound, InboundSender, Outbound, Sender, Streaming, STREAM_BUFFER};

#[doc(hidden)]
pub mod __private {
    pub use futures::future::BoxFuture;
}
