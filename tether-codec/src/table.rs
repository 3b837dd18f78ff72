//! Content-type to codec lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tether_core::ConfigError;

use crate::codec::{BytesCodec, Codec, GrpcCodec, JsonCodec, ProtobufCodec};

/// Map from content type to codec.
#[derive(Clone, Default)]
pub struct CodecTable {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl CodecTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the codec for its own content type.
    #[must_use]
    pub fn with(mut self, codec: impl Codec) -> Self {
        self.insert(Arc::new(codec));
        self
    }

    pub fn insert(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.content_type().to_string(), codec);
    }

    /// Register `codec` under an explicit content type.
    pub fn insert_as(&mut self, content_type: impl Into<String>, codec: Arc<dyn Codec>) {
        self.codecs.insert(content_type.into(), codec);
    }

    #[must_use]
    pub fn get(&self, content_type: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.get(content_type).cloned()
    }

    #[must_use]
    pub fn contains(&self, content_type: &str) -> bool {
        self.codecs.contains_key(content_type)
    }

    #[must_use]
    pub fn content_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl std::fmt::Debug for CodecTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.content_types()).finish()
    }
}

/// The process-default codec table.
#[must_use]
pub fn default_codecs() -> CodecTable {
    CodecTable::new()
        .with(GrpcCodec::new())
        .with(ProtobufCodec::new())
        .with(JsonCodec::new())
        .with(BytesCodec::new())
}

/// Resolve a codec: `overrides` first, then the default table.
pub fn resolve(overrides: &CodecTable, content_type: &str) -> Result<Arc<dyn Codec>, ConfigError> {
    overrides
        .get(content_type)
        .or_else(|| default_codecs().get(content_type))
        .ok_or_else(|| ConfigError::UnsupportedContentType(content_type.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CONTENT_TYPE_GRPC, CONTENT_TYPE_JSON, CONTENT_TYPE_OCTET_STREAM, CONTENT_TYPE_PROTOBUF};

    #[test]
    fn test_default_table() {
        let table = default_codecs();
        assert_eq!(
            table.content_types(),
            [
                CONTENT_TYPE_GRPC,
                CONTENT_TYPE_JSON,
                CONTENT_TYPE_OCTET_STREAM,
                CONTENT_TYPE_PROTOBUF,
            ]
        );
    }

    #[test]
    fn test_override_wins() {
        let mut overrides = CodecTable::new();
        overrides.insert_as(CONTENT_TYPE_PROTOBUF, Arc::new(JsonCodec::new()));

        let codec = resolve(&overrides, CONTENT_TYPE_PROTOBUF).unwrap();
        assert_eq!(codec.content_type(), CONTENT_TYPE_JSON);

        let codec = resolve(&CodecTable::new(), CONTENT_TYPE_PROTOBUF).unwrap();
        assert_eq!(codec.content_type(), CONTENT_TYPE_PROTOBUF);
    }

    #[test]
    fn test_unknown_content_type() {
        let err = resolve(&CodecTable::new(), "text/plain").err().unwrap();
        assert_eq!(err, ConfigError::UnsupportedContentType("text/plain".into()));
    }
}
