//! Service records and the registry contract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Metadata key marking a streaming endpoint.
pub const STREAM_KEY: &str = "stream";
/// Metadata key marking a client-streaming endpoint.
pub const STREAM_IN_KEY: &str = "streamIn";
/// Metadata key marking a server-streaming endpoint.
pub const STREAM_OUT_KEY: &str = "streamOut";

/// One network-reachable instance of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Node {
    #[must_use]
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            metadata: HashMap::new(),
        }
    }
}

/// The record published to and read from a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// One advertised RPC method.
///
/// `name` has the form `"<Handler>.<Method>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub request: Option<Value>,
    pub response: Option<Value>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Recursive schema node for a request or response shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Value {
    /// A value without children whose name and type are both `type_name`.
    #[must_use]
    pub fn leaf(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: type_name.clone(),
            type_name,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Options accepted by [`Registry::deregister`].
#[derive(Debug, Clone, Default)]
pub struct DeregisterOptions {
    /// Upper bound on how long the backend may take.
    pub timeout: Option<Duration>,
}

impl DeregisterOptions {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Service directory backend.
///
/// The framework calls `register` when a server starts, `deregister` when it
/// stops, and `get_service` from the registry-backed selector.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Advertise a service record.
    async fn register(&self, service: &Service) -> Result<(), RegistryError>;

    /// Remove the nodes of a service record.
    async fn deregister(
        &self,
        service: &Service,
        options: DeregisterOptions,
    ) -> Result<(), RegistryError>;

    /// All known versions of a service.
    async fn get_service(&self, name: &str) -> Result<Vec<Service>, RegistryError>;

    /// Implementation name used for logging and node metadata.
    fn name(&self) -> &str;
}
