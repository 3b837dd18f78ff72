//! # tether-codec
//!
//! Framing and content-type codecs for tether connections.
//!
//! This crate provides:
//! - `FrameCodec` - length-prefixed frame encoder/decoder
//! - `Codec` - envelope codec bound to one content type, with the four defaults
//!   (`application/grpc`, `application/protobuf`, `application/json`,
//!   `application/octet-stream`)
//! - `CodecTable` - content-type lookup with per-client/per-server overrides
//! - the connection preface that announces the content type
//!
//! ## Frame Format
//!
//! ```text
//! +----------------+------------------+
//! | Length (4 LE)  | Payload (N bytes)|
//! +----------------+------------------+
//! ```

mod codec;
mod frame;
mod preface;
mod table;

pub use codec::{
    BytesCodec, Codec, EnvelopeCodec, GrpcCodec, JsonCodec, ProtobufCodec, CONTENT_TYPE_GRPC,
    CONTENT_TYPE_JSON, CONTENT_TYPE_OCTET_STREAM, CONTENT_TYPE_PROTOBUF, DEFAULT_CONTENT_TYPE,
};
pub use frame::{FrameCodec, DEFAULT_MAX_FRAME_SIZE};
pub use preface::{read_preface, write_preface, PREFACE_MAGIC, PROTOCOL_VERSION};
pub use table::{default_codecs, resolve, CodecTable};
