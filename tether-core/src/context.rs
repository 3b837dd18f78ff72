//! Call context carried with every RPC.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Header carrying the remaining time budget in milliseconds.
pub const TIMEOUT_HEADER: &str = "tether-timeout-ms";

/// Header carrying the hex trace id.
pub const TRACE_HEADER: &str = "tether-trace-id";

static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_call_id() -> u64 {
    CALL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Distributed tracing identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(pub [u8; 16]);

impl TraceId {
    /// Create a new random trace ID.
    #[must_use]
    pub fn new() -> Self {
        Self(rand::random())
    }

    /// Parse a 32 character hex string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 32 || !s.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Metadata key-value pairs.
pub type Metadata = HashMap<String, String>;

/// Per-call context: identity, deadline, tracing and metadata.
///
/// The client serializes a context into envelope headers; the server rebuilds
/// it with [`Context::from_headers`] before invoking the handler.
#[derive(Debug, Clone)]
pub struct Context {
    /// Process-local identifier for this call.
    pub call_id: u64,

    /// Absolute deadline, if any.
    pub deadline: Option<Instant>,

    /// Custom key-value metadata.
    pub metadata: Metadata,

    /// Distributed tracing identifier.
    pub trace_id: Option<TraceId>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self {
            call_id: next_call_id(),
            deadline: None,
            metadata: HashMap::new(),
            trace_id: None,
        }
    }

    /// Create a context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// Set a timeout from now.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Add metadata to the context.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Enable tracing with a new trace ID.
    #[must_use]
    pub fn with_tracing(mut self) -> Self {
        self.trace_id = Some(TraceId::new());
        self
    }

    /// Remaining time until the deadline, `None` without one or once passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .and_then(|d| d.checked_duration_since(Instant::now()))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Flatten into envelope headers.
    #[must_use]
    pub fn to_headers(&self) -> Metadata {
        let mut headers = self.metadata.clone();
        if let Some(remaining) = self.remaining() {
            headers.insert(TIMEOUT_HEADER.to_string(), remaining.as_millis().to_string());
        }
        if let Some(trace_id) = self.trace_id {
            headers.insert(TRACE_HEADER.to_string(), trace_id.to_string());
        }
        headers
    }

    /// Rebuild a context from envelope headers. Reserved headers are consumed.
    #[must_use]
    pub fn from_headers(mut headers: Metadata) -> Self {
        let deadline = headers
            .remove(TIMEOUT_HEADER)
            .and_then(|v| v.parse::<u64>().ok())
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let trace_id = headers
            .remove(TRACE_HEADER)
            .and_then(|v| TraceId::parse(&v));

        Self {
            call_id: next_call_id(),
            deadline,
            metadata: headers,
            trace_id,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let a = Context::new();
        let b = Context::new();
        assert_ne!(a.call_id, b.call_id);
        assert!(a.deadline.is_none());
    }

    #[test]
    fn test_context_with_timeout() {
        let ctx = Context::with_timeout(Duration::from_secs(10));
        assert!(!ctx.is_expired());
        assert!(ctx.remaining().is_some());
    }

    #[test]
    fn test_headers_carry_deadline_trace_and_metadata() {
        let ctx = Context::with_timeout(Duration::from_secs(5))
            .with_tracing()
            .with_metadata("user-id", "123");

        let headers = ctx.to_headers();
        assert!(headers.contains_key(TIMEOUT_HEADER));

        let rebuilt = Context::from_headers(headers);
        assert_eq!(rebuilt.get_metadata("user-id"), Some("123"));
        assert_eq!(rebuilt.trace_id, ctx.trace_id);
        assert!(rebuilt.remaining().unwrap() <= Duration::from_secs(5));
        assert!(rebuilt.get_metadata(TIMEOUT_HEADER).is_none());
    }

    #[test]
    fn test_trace_id_display_and_parse() {
        let trace_id = TraceId([
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef,
        ]);
        let text = trace_id.to_string();
        assert_eq!(text, "0123456789abcdef0123456789abcdef");
        assert_eq!(TraceId::parse(&text), Some(trace_id));
        assert_eq!(TraceId::parse("nope"), None);
    }
}
