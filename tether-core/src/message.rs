//! RPC message envelope.
//!
//! Every frame exchanged on a tether connection carries one [`Envelope`].
//! The envelope is encoded by the connection's content-type codec; the
//! `payload` inside it is an rkyv archive of the handler's request or
//! response type.

use std::collections::HashMap;

/// Status codes carried in error envelopes.
pub mod status {
    pub const OK: u32 = 0;
    pub const CANCELLED: u32 = 1;
    pub const UNKNOWN: u32 = 2;
    pub const INVALID_ARGUMENT: u32 = 3;
    pub const DEADLINE_EXCEEDED: u32 = 4;
    pub const NOT_FOUND: u32 = 5;
    pub const PERMISSION_DENIED: u32 = 7;
    pub const UNIMPLEMENTED: u32 = 12;
    pub const INTERNAL: u32 = 13;
    pub const UNAVAILABLE: u32 = 14;
}

/// Wire envelope for requests, responses and stream items.
#[derive(
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    PartialEq,
)]
pub struct Envelope {
    /// Call id; all frames of one call share it.
    pub id: u64,

    /// Frame kind.
    pub kind: MessageKind,

    /// Handler name, e.g. `Greeter`.
    pub service: String,

    /// Method name, e.g. `Hello`.
    pub method: String,

    /// Propagated call metadata.
    pub headers: HashMap<String, String>,

    /// Status code; non-zero only on `Error` frames.
    pub code: u32,

    /// Body bytes. For `Error` frames this is the UTF-8 message.
    pub payload: Vec<u8>,
}

/// Kind of envelope.
#[derive(
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageKind {
    /// Unary or stream-out request.
    Request = 1,
    /// Unary or stream-in response.
    Response = 2,
    /// Error terminating a call.
    Error = 3,
    /// Opens a client stream.
    StreamStart = 4,
    /// One stream item in either direction.
    StreamData = 5,
    /// Closes a stream.
    StreamEnd = 6,
    Ping = 7,
    Pong = 8,
}

impl MessageKind {
    /// Decode the numeric tag used by the protobuf codecs.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Request,
            2 => Self::Response,
            3 => Self::Error,
            4 => Self::StreamStart,
            5 => Self::StreamData,
            6 => Self::StreamEnd,
            7 => Self::Ping,
            8 => Self::Pong,
            _ => return None,
        })
    }
}

impl Envelope {
    fn new(id: u64, kind: MessageKind) -> Self {
        Self {
            id,
            kind,
            service: String::new(),
            method: String::new(),
            headers: HashMap::new(),
            code: status::OK,
            payload: Vec::new(),
        }
    }

    /// Create a request envelope.
    #[must_use]
    pub fn request(
        id: u64,
        service: impl Into<String>,
        method: impl Into<String>,
        headers: HashMap<String, String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            headers,
            payload,
            ..Self::new(id, MessageKind::Request)
        }
    }

    /// Open a client stream.
    #[must_use]
    pub fn stream_start(
        id: u64,
        service: impl Into<String>,
        method: impl Into<String>,
        headers: HashMap<String, String>,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            headers,
            ..Self::new(id, MessageKind::StreamStart)
        }
    }

    #[must_use]
    pub fn response(id: u64, payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Self::new(id, MessageKind::Response)
        }
    }

    /// Create an error envelope carrying `code` and a message.
    #[must_use]
    pub fn error(id: u64, code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            payload: message.into().into_bytes(),
            ..Self::new(id, MessageKind::Error)
        }
    }

    #[must_use]
    pub fn stream_data(id: u64, payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Self::new(id, MessageKind::StreamData)
        }
    }

    #[must_use]
    pub fn stream_end(id: u64) -> Self {
        Self::new(id, MessageKind::StreamEnd)
    }

    #[must_use]
    pub fn ping(id: u64) -> Self {
        Self::new(id, MessageKind::Ping)
    }

    #[must_use]
    pub fn pong(id: u64) -> Self {
        Self::new(id, MessageKind::Pong)
    }

    /// Convert an `Error` envelope into the error it carries.
    #[must_use]
    pub fn to_error(&self) -> crate::TetherError {
        crate::TetherError::Service {
            code: self.code,
            message: String::from_utf8_lossy(&self.payload).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        for kind in [
            MessageKind::Request,
            MessageKind::Response,
            MessageKind::Error,
            MessageKind::StreamStart,
            MessageKind::StreamData,
            MessageKind::StreamEnd,
            MessageKind::Ping,
            MessageKind::Pong,
        ] {
            assert_eq!(MessageKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(MessageKind::from_u8(0), None);
        assert_eq!(MessageKind::from_u8(42), None);
    }

    #[test]
    fn test_error_envelope() {
        let env = Envelope::error(9, status::NOT_FOUND, "no such user");
        assert_eq!(env.kind, MessageKind::Error);
        assert_eq!(
            env.to_error().to_string(),
            "service error [5]: no such user"
        );
    }

    #[test]
    fn test_json_shape() {
        let env = Envelope::request(1, "Greeter", "Hello", HashMap::new(), vec![1, 2]);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["kind"], "request");
        assert_eq!(json["service"], "Greeter");
    }
}
