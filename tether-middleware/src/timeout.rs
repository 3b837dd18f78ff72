//! Deadline enforcement interceptor.

use std::time::{Duration, Instant};

use tether_core::Context;

use crate::interceptor::{CallInfo, Interceptor, InterceptorError};

/// Ensures every call carries a deadline.
///
/// Calls without a deadline get `default_timeout`; with `with_max`, longer
/// deadlines are clamped. Calls whose deadline already passed are rejected.
///
/// ```rust
/// use std::time::Duration;
/// use tether_middleware::TimeoutInterceptor;
///
/// let interceptor = TimeoutInterceptor::new(Duration::from_secs(30))
///     .with_max(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct TimeoutInterceptor {
    default_timeout: Duration,
    max_timeout: Option<Duration>,
}

impl TimeoutInterceptor {
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            max_timeout: None,
        }
    }

    #[must_use]
    pub fn with_max(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = Some(max_timeout);
        self
    }
}

impl Interceptor for TimeoutInterceptor {
    fn intercept_request(
        &self,
        ctx: &mut Context,
        call: &CallInfo<'_>,
    ) -> Result<(), InterceptorError> {
        let now = Instant::now();

        let deadline = match (ctx.deadline, self.max_timeout) {
            (Some(deadline), Some(max)) => deadline.min(now + max),
            (Some(deadline), None) => deadline,
            (None, _) => now + self.default_timeout,
        };
        ctx.deadline = Some(deadline);

        if ctx.is_expired() {
            return Err(InterceptorError::Rejected(format!(
                "{}.{} deadline already passed",
                call.service, call.method
            )));
        }
        Ok(())
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
    fn test_sets_default_deadline() {
        let interceptor = TimeoutInterceptor::new(Duration::from_secs(30));
        let mut ctx = Context::new();

        interceptor.intercept_request(&mut ctx, &call()).unwrap();
        assert!(ctx.remaining().unwrap() <= Duration::from_secs(30));
    }

    #[test]
    fn test_preserves_existing_deadline() {
        let interceptor = TimeoutInterceptor::new(Duration::from_secs(30));
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut ctx = Context::new();
        ctx.deadline = Some(deadline);

        interceptor.intercept_request(&mut ctx, &call()).unwrap();
        assert_eq!(ctx.deadline, Some(deadline));
    }

    #[test]
    fn test_clamps_to_max() {
        let interceptor =
            TimeoutInterceptor::new(Duration::from_secs(30)).with_max(Duration::from_secs(5));
        let mut ctx = Context::with_timeout(Duration::from_secs(100));

        interceptor.intercept_request(&mut ctx, &call()).unwrap();
        assert!(ctx.remaining().unwrap() <= Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_expired() {
        let interceptor = TimeoutInterceptor::new(Duration::from_secs(30));
        let mut ctx = Context::new();
        ctx.deadline = Some(Instant::now() - Duration::from_secs(1));

        let err = interceptor.intercept_request(&mut ctx, &call()).unwrap_err();
        assert!(err.to_string().contains("Greeter.Hello"));
    }
}
