//! Interceptor trait and chain implementation.

use std::sync::Arc;

use tether_core::{status, Context, EndpointKind, TetherError};

/// Error type for interceptor operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InterceptorError {
    /// Request was rejected by the interceptor.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Interceptor internal error.
    #[error("interceptor error: {0}")]
    Internal(String),
}

impl From<InterceptorError> for TetherError {
    fn from(err: InterceptorError) -> Self {
        let code = match err {
            InterceptorError::Rejected(_) => status::PERMISSION_DENIED,
            InterceptorError::Internal(_) => status::INTERNAL,
        };
        TetherError::Service {
            code,
            message: err.to_string(),
        }
    }
}

/// Identity of the call being intercepted.
#[derive(Debug, Clone, Copy)]
pub struct CallInfo<'a> {
    /// Handler name.
    pub service: &'a str,
    pub method: &'a str,
    pub kind: EndpointKind,
}

impl<'a> CallInfo<'a> {
    #[must_use]
    pub fn new(service: &'a str, method: &'a str, kind: EndpointKind) -> Self {
        Self {
            service,
            method,
            kind,
        }
    }
}

/// Hook around outgoing (client) or incoming (server) calls.
///
/// ## Example
///
/// ```rust
/// use tether_core::Context;
/// use tether_middleware::{CallInfo, Interceptor, InterceptorError};
///
/// struct ApiKey(String);
///
/// impl Interceptor for ApiKey {
///     fn intercept_request(
///         &self,
///         ctx: &mut Context,
///         _call: &CallInfo<'_>,
///     ) -> Result<(), InterceptorError> {
///         ctx.metadata.insert("authorization".to_string(), self.0.clone());
///         Ok(())
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync + 'static {
    /// Runs before the call is sent (client) or dispatched (server).
    /// Returning an error aborts the call.
    fn intercept_request(
        &self,
        ctx: &mut Context,
        call: &CallInfo<'_>,
    ) -> Result<(), InterceptorError> {
        let _ = (ctx, call);
        Ok(())
    }

    /// Runs on each response body: the unary reply, or each stream item.
    fn intercept_response(
        &self,
        ctx: &Context,
        call: &CallInfo<'_>,
        response: &mut Vec<u8>,
    ) -> Result<(), InterceptorError> {
        let _ = (ctx, call, response);
        Ok(())
    }

    /// Called when the call fails.
    fn on_error(&self, ctx: &Context, call: &CallInfo<'_>, error: &TetherError) {
        let _ = (ctx, call, error);
    }
}

/// An ordered chain of interceptors.
///
/// Requests pass through first to last, responses last to first.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn with_shared(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Append every interceptor of `other` after this chain's.
    pub fn extend(&mut self, other: &InterceptorChain) {
        self.interceptors.extend(other.interceptors.iter().cloned());
    }

    pub fn intercept_request(
        &self,
        ctx: &mut Context,
        call: &CallInfo<'_>,
    ) -> Result<(), InterceptorError> {
        for interceptor in &self.interceptors {
            interceptor.intercept_request(ctx, call)?;
        }
        Ok(())
    }

    pub fn intercept_response(
        &self,
        ctx: &Context,
        call: &CallInfo<'_>,
        response: &mut Vec<u8>,
    ) -> Result<(), InterceptorError> {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.intercept_response(ctx, call, response)?;
        }
        Ok(())
    }

    pub fn on_error(&self, ctx: &Context, call: &CallInfo<'_>, error: &TetherError) {
        for interceptor in &self.interceptors {
            interceptor.on_error(ctx, call, error);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

/// Unary and stream interceptor chains applied to one side of a connection.
#[derive(Debug, Clone, Default)]
pub struct Interceptors {
    pub unary: InterceptorChain,
    pub stream: InterceptorChain,
}

impl Interceptors {
    /// Chain for calls of `kind`.
    #[must_use]
    pub fn for_kind(&self, kind: EndpointKind) -> &InterceptorChain {
        match kind {
            EndpointKind::Unary => &self.unary,
            EndpointKind::StreamIn | EndpointKind::StreamOut => &self.stream,
        }
    }
}
