//! Tracing interceptor.

use tether_core::{Context, TetherError, TraceId};
use tracing::{info_span, Span};

use crate::interceptor::{CallInfo, Interceptor, InterceptorError};

pub const TRACE_ID_KEY: &str = "x-trace-id";
pub const CALL_ID_KEY: &str = "x-request-id";
pub const CALLER_KEY: &str = "x-service";

/// Stamps trace and caller identity onto call metadata and logs failures.
///
/// ```rust
/// use tether_middleware::TracingInterceptor;
///
/// let interceptor = TracingInterceptor::new("billing");
/// ```
#[derive(Debug, Clone)]
pub struct TracingInterceptor {
    service_name: String,
}

impl TracingInterceptor {
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl Interceptor for TracingInterceptor {
    fn intercept_request(
        &self,
        ctx: &mut Context,
        call: &CallInfo<'_>,
    ) -> Result<(), InterceptorError> {
        let trace_id = *ctx.trace_id.get_or_insert_with(TraceId::new);

        ctx.metadata
            .insert(TRACE_ID_KEY.to_string(), trace_id.to_string());
        ctx.metadata
            .insert(CALL_ID_KEY.to_string(), ctx.call_id.to_string());
        ctx.metadata
            .entry(CALLER_KEY.to_string())
            .or_insert_with(|| self.service_name.clone());

        tracing::debug!(
            trace_id = %trace_id,
            call_id = ctx.call_id,
            service = call.service,
            method = call.method,
            "rpc call"
        );
        Ok(())
    }

    fn on_error(&self, ctx: &Context, call: &CallInfo<'_>, error: &TetherError) {
        let trace_id = ctx
            .trace_id
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::error!(
            trace_id = %trace_id,
            call_id = ctx.call_id,
            service = call.service,
            method = call.method,
            error = %error,
            "rpc call failed"
        );
    }
}

/// Span helpers for call contexts.
pub trait ContextSpanExt {
    fn span(&self, call: &CallInfo<'_>) -> Span;
}

impl ContextSpanExt for Context {
    fn span(&self, call: &CallInfo<'_>) -> Span {
        let trace_id = self
            .trace_id
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        info_span!(
            "rpc",
            service = call.service,
            method = call.method,
            trace_id = %trace_id,
            call_id = self.call_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::EndpointKind;

    fn call() -> CallInfo<'static> {
        CallInfo::new("Greeter", "Hello", EndpointKind::Unary)
    }

    #[test]
    fn test_adds_trace_and_caller() {
        let interceptor = TracingInterceptor::new("frontend");
        let mut ctx = Context::new();

        interceptor.intercept_request(&mut ctx, &call()).unwrap();

        assert!(ctx.trace_id.is_some());
        assert_eq!(
            ctx.get_metadata(TRACE_ID_KEY),
            Some(ctx.trace_id.unwrap().to_string().as_str())
        );
        assert_eq!(ctx.get_metadata(CALLER_KEY), Some("frontend"));
    }

    #[test]
    fn test_preserves_existing_trace_and_caller() {
        let interceptor = TracingInterceptor::new("frontend");
        let original = TraceId::new();
        let mut ctx = Context::new().with_metadata(CALLER_KEY, "upstream");
        ctx.trace_id = Some(original);

        interceptor.intercept_request(&mut ctx, &call()).unwrap();

        assert_eq!(ctx.trace_id, Some(original));
        assert_eq!(ctx.get_metadata(CALLER_KEY), Some("upstream"));
    }
}
