//! # tether-middleware
//!
//! Interceptors and retry policies for the tether RPC framework.
//!
//! This crate provides:
//! - `Interceptor` trait, `InterceptorChain`, and the unary/stream pair `Interceptors`
//! - `RetryPolicy` for bounded, cancellable retries
//! - `TimeoutInterceptor` for enforcing deadlines
//! - `TracingInterceptor` for trace propagation and failure logging

mod interceptor;
mod retry;
mod timeout;
mod tracing_middleware;

pub use interceptor::{CallInfo, Interceptor, InterceptorChain, InterceptorError, Interceptors};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use timeout::TimeoutInterceptor;
pub use tracing_middleware::{ContextSpanExt, TracingInterceptor, CALLER_KEY, CALL_ID_KEY, TRACE_ID_KEY};
