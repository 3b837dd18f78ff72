//! Content-type codecs for envelopes.
//!
//! A connection speaks exactly one codec, chosen by the content type sent
//! in its preface. Each codec owns both the framing and the envelope
//! encoding.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use prost::Message;
use tokio_util::codec::{Decoder, Encoder};

use tether_core::{wire, CodecError, Envelope, MessageKind};

use crate::frame::{FrameCodec, DEFAULT_MAX_FRAME_SIZE};

pub const CONTENT_TYPE_GRPC: &str = "application/grpc";
pub const CONTENT_TYPE_PROTOBUF: &str = "application/protobuf";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Content type used when none is configured.
pub const DEFAULT_CONTENT_TYPE: &str = CONTENT_TYPE_PROTOBUF;

/// Envelope codec bound to one content type.
pub trait Codec: Send + Sync + 'static {
    /// Content type this codec serves.
    fn content_type(&self) -> &str;

    /// Append one framed envelope to `dst`.
    fn encode(&self, envelope: &Envelope, dst: &mut BytesMut) -> Result<(), CodecError>;

    /// Take one envelope off the front of `src`, `None` if incomplete.
    fn decode(&self, src: &mut BytesMut) -> Result<Option<Envelope>, CodecError>;
}

/// Protobuf mirror of [`Envelope`].
#[derive(Clone, PartialEq, Message)]
struct ProtoEnvelope {
    #[prost(uint64, tag = "1")]
    id: u64,
    #[prost(uint32, tag = "2")]
    kind: u32,
    #[prost(string, tag = "3")]
    service: String,
    #[prost(string, tag = "4")]
    method: String,
    #[prost(map = "string, string", tag = "5")]
    headers: HashMap<String, String>,
    #[prost(uint32, tag = "6")]
    code: u32,
    #[prost(bytes = "vec", tag = "7")]
    payload: Vec<u8>,
}

impl From<&Envelope> for ProtoEnvelope {
    fn from(env: &Envelope) -> Self {
        Self {
            id: env.id,
            kind: u32::from(env.kind as u8),
            service: env.service.clone(),
            method: env.method.clone(),
            headers: env.headers.clone(),
            code: env.code,
            payload: env.payload.clone(),
        }
    }
}

impl TryFrom<ProtoEnvelope> for Envelope {
    type Error = CodecError;

    fn try_from(proto: ProtoEnvelope) -> Result<Self, Self::Error> {
        let kind = u8::try_from(proto.kind)
            .ok()
            .and_then(MessageKind::from_u8)
            .ok_or_else(|| CodecError::InvalidFrame(format!("unknown message kind {}", proto.kind)))?;

        Ok(Self {
            id: proto.id,
            kind,
            service: proto.service,
            method: proto.method,
            headers: proto.headers,
            code: proto.code,
            payload: proto.payload,
        })
    }
}

fn decode_proto(bytes: &[u8]) -> Result<Envelope, CodecError> {
    ProtoEnvelope::decode(bytes)
        .map_err(|e| CodecError::Deserialization(e.to_string()))?
        .try_into()
}

/// `application/protobuf`: length frame around a protobuf envelope.
#[derive(Debug, Clone, Default)]
pub struct ProtobufCodec {
    frame: FrameCodec,
}

impl ProtobufCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for ProtobufCodec {
    fn content_type(&self) -> &str {
        CONTENT_TYPE_PROTOBUF
    }

    fn encode(&self, envelope: &Envelope, dst: &mut BytesMut) -> Result<(), CodecError> {
        let bytes = ProtoEnvelope::from(envelope).encode_to_vec();
        self.frame.encode_slice(&bytes, dst)
    }

    fn decode(&self, src: &mut BytesMut) -> Result<Option<Envelope>, CodecError> {
        match self.frame.decode_frame(src)? {
            Some(frame) => decode_proto(&frame).map(Some),
            None => Ok(None),
        }
    }
}

/// `application/grpc`: gRPC message framing (flag byte plus big-endian
/// length) around a protobuf envelope. Compression is not supported.
#[derive(Debug, Clone)]
pub struct GrpcCodec {
    max_message_size: usize,
}

const GRPC_HEADER: usize = 5;

impl GrpcCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl Default for GrpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for GrpcCodec {
    fn content_type(&self) -> &str {
        CONTENT_TYPE_GRPC
    }

    fn encode(&self, envelope: &Envelope, dst: &mut BytesMut) -> Result<(), CodecError> {
        let bytes = ProtoEnvelope::from(envelope).encode_to_vec();
        if bytes.len() > self.max_message_size {
            return Err(CodecError::FrameTooLarge {
                size: bytes.len(),
                max: self.max_message_size,
            });
        }
        dst.reserve(GRPC_HEADER + bytes.len());
        dst.put_u8(0);
        dst.put_u32(bytes.len() as u32);
        dst.put_slice(&bytes);
        Ok(())
    }

    fn decode(&self, src: &mut BytesMut) -> Result<Option<Envelope>, CodecError> {
        if src.len() < GRPC_HEADER {
            return Ok(None);
        }
        if src[0] != 0 {
            return Err(CodecError::InvalidFrame(
                "compressed grpc messages are not supported".into(),
            ));
        }
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > self.max_message_size {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: self.max_message_size,
            });
        }
        if src.len() < GRPC_HEADER + len {
            src.reserve(GRPC_HEADER + len - src.len());
            return Ok(None);
        }
        src.advance(GRPC_HEADER);
        let message = src.split_to(len);
        decode_proto(&message).map(Some)
    }
}

/// `application/json`: length frame around a JSON envelope.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    frame: FrameCodec,
}

impl JsonCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        CONTENT_TYPE_JSON
    }

    fn encode(&self, envelope: &Envelope, dst: &mut BytesMut) -> Result<(), CodecError> {
        let bytes =
            serde_json::to_vec(envelope).map_err(|e| CodecError::Serialization(e.to_string()))?;
        self.frame.encode_slice(&bytes, dst)
    }

    fn decode(&self, src: &mut BytesMut) -> Result<Option<Envelope>, CodecError> {
        match self.frame.decode_frame(src)? {
            Some(frame) => serde_json::from_slice(&frame)
                .map(Some)
                .map_err(|e| CodecError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }
}

/// `application/octet-stream`: length frame around an rkyv envelope.
#[derive(Debug, Clone, Default)]
pub struct BytesCodec {
    frame: FrameCodec,
}

impl BytesCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for BytesCodec {
    fn content_type(&self) -> &str {
        CONTENT_TYPE_OCTET_STREAM
    }

    fn encode(&self, envelope: &Envelope, dst: &mut BytesMut) -> Result<(), CodecError> {
        let bytes = wire::to_bytes(envelope)?;
        self.frame.encode_slice(&bytes, dst)
    }

    fn decode(&self, src: &mut BytesMut) -> Result<Option<Envelope>, CodecError> {
        match self.frame.decode_frame(src)? {
            Some(frame) => wire::from_bytes(&frame).map(Some),
            None => Ok(None),
        }
    }
}

/// Adapts a shared [`Codec`] to `tokio_util`'s framed IO.
#[derive(Clone)]
pub struct EnvelopeCodec {
    codec: Arc<dyn Codec>,
}

impl EnvelopeCodec {
    #[must_use]
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        self.codec.content_type()
    }
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("content_type", &self.codec.content_type())
            .finish()
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.codec.decode(src)
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.codec.encode(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        let headers = HashMap::from([("x-request-id".to_string(), "7".to_string())]);
        Envelope::request(42, "Greeter", "Hello", headers, vec![0, 1, 2, 255])
    }

    fn all_codecs() -> Vec<Arc<dyn Codec>> {
        vec![
            Arc::new(GrpcCodec::new()),
            Arc::new(ProtobufCodec::new()),
            Arc::new(JsonCodec::new()),
            Arc::new(BytesCodec::new()),
        ]
    }

    #[test]
    fn test_each_codec_decodes_what_it_encodes_across_split_reads() {
        for codec in all_codecs() {
            let mut full = BytesMut::new();
            codec.encode(&sample(), &mut full).unwrap();
            codec.encode(&Envelope::stream_end(42), &mut full).unwrap();

            // feed one byte at a time
            let mut src = BytesMut::new();
            let mut decoded = Vec::new();
            for byte in full.iter() {
                src.put_u8(*byte);
                if let Some(env) = codec.decode(&mut src).unwrap() {
                    decoded.push(env);
                }
            }

            assert_eq!(decoded.len(), 2, "{}", codec.content_type());
            assert_eq!(decoded[0], sample(), "{}", codec.content_type());
            assert_eq!(decoded[1].kind, MessageKind::StreamEnd);
            assert!(src.is_empty());
        }
    }

    #[test]
    fn test_grpc_framing_is_big_endian_with_flag() {
        let mut buf = BytesMut::new();
        GrpcCodec::new().encode(&sample(), &mut buf).unwrap();
        assert_eq!(buf[0], 0);
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        assert_eq!(len, buf.len() - GRPC_HEADER);
    }

    #[test]
    fn test_grpc_rejects_compressed_flag() {
        let mut buf = BytesMut::from(&[1u8, 0, 0, 0, 0][..]);
        assert!(matches!(
            GrpcCodec::new().decode(&mut buf),
            Err(CodecError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let proto = ProtoEnvelope {
            kind: 99,
            ..ProtoEnvelope::default()
        };
        let mut buf = BytesMut::new();
        FrameCodec::new()
            .encode_slice(&proto.encode_to_vec(), &mut buf)
            .unwrap();
        assert!(ProtobufCodec::new().decode(&mut buf).is_err());
    }
}
