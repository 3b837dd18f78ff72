//! Handler contract used by the server for dispatch and advertisement.

use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::TetherError;
use crate::registry::{Endpoint, Value, STREAM_IN_KEY, STREAM_KEY, STREAM_OUT_KEY};
use crate::stream::{Inbound, Outbound};

/// Streaming mode of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// One request, one response.
    Unary,
    /// Client streams requests, server answers once.
    StreamIn,
    /// One request, server streams responses.
    StreamOut,
}

/// Self-description of one handler method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Method name without the handler prefix.
    pub method: String,
    pub kind: EndpointKind,
    pub request: Option<Value>,
    pub response: Option<Value>,
}

impl EndpointDescriptor {
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        kind: EndpointKind,
        request: Option<Value>,
        response: Option<Value>,
    ) -> Self {
        Self {
            method: method.into(),
            kind,
            request,
            response,
        }
    }

    /// Registry endpoint named `"<handler>.<method>"`, with streaming tags
    /// and any `extra` metadata merged in.
    #[must_use]
    pub fn to_endpoint(&self, handler: &str, extra: Option<&HashMap<String, String>>) -> Endpoint {
        let mut metadata = HashMap::new();
        match self.kind {
            EndpointKind::Unary => {}
            EndpointKind::StreamIn => {
                metadata.insert(STREAM_KEY.to_string(), "true".to_string());
                metadata.insert(STREAM_IN_KEY.to_string(), "true".to_string());
            }
            EndpointKind::StreamOut => {
                metadata.insert(STREAM_KEY.to_string(), "true".to_string());
                metadata.insert(STREAM_OUT_KEY.to_string(), "true".to_string());
            }
        }
        if let Some(extra) = extra {
            metadata.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Endpoint {
            name: format!("{handler}.{}", self.method),
            request: self.request.clone(),
            response: self.response.clone(),
            metadata,
        }
    }
}

/// Response schema of a stream-in endpoint, which only reports success or error.
#[must_use]
pub fn error_only_value() -> Value {
    Value::leaf("error")
}

/// Body handed to a handler method.
#[derive(Debug)]
pub enum Payload {
    /// Encoded request of a unary call.
    Unary(Vec<u8>),
    /// Incoming request stream.
    StreamIn(Inbound),
    /// Encoded request plus the outbound response stream.
    StreamOut(Vec<u8>, Outbound),
}

/// An object serving RPC methods.
///
/// Implemented by `#[handler]`; hand-written implementations must keep
/// `endpoints` and `call` consistent.
pub trait Handler: Send + Sync + 'static {
    /// Type name used as the endpoint prefix.
    fn name(&self) -> &str;

    /// Every method this handler serves.
    fn endpoints(&self) -> Vec<EndpointDescriptor>;

    /// Invoke `method`. Unary calls return the encoded response; streaming
    /// calls return an empty body.
    fn call<'a>(
        &'a self,
        method: &'a str,
        ctx: Context,
        payload: Payload,
    ) -> BoxFuture<'a, Result<Vec<u8>, TetherError>>;
}
