//! Registered handlers and their advertised endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use tether_core::{Endpoint, EndpointKind, Handler};

use crate::options::HandlerOptions;

/// A handler with its endpoints computed once at registration.
pub struct RegisteredHandler {
    name: String,
    handler: Arc<dyn Handler>,
    endpoints: Vec<Endpoint>,
    kinds: HashMap<String, EndpointKind>,
    options: HandlerOptions,
}

impl RegisteredHandler {
    /// Describe `handler`, merging per-endpoint metadata from `options`.
    #[must_use]
    pub fn new(handler: Arc<dyn Handler>, options: HandlerOptions) -> Self {
        let name = handler.name().to_string();
        let descriptors = handler.endpoints();

        let kinds = descriptors
            .iter()
            .map(|d| (d.method.clone(), d.kind))
            .collect();
        let endpoints = descriptors
            .iter()
            .map(|d| {
                let full = format!("{name}.{}", d.method);
                d.to_endpoint(&name, options.metadata.get(&full))
            })
            .collect();

        Self {
            name,
            handler,
            endpoints,
            kinds,
            options,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Endpoints in method declaration order.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Streaming mode of `method`, if the handler serves it.
    #[must_use]
    pub fn kind(&self, method: &str) -> Option<EndpointKind> {
        self.kinds.get(method).copied()
    }

    #[must_use]
    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.options.internal
    }
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("name", &self.name)
            .field("endpoints", &self.endpoints.len())
            .field("internal", &self.options.internal)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use tether_core::{
        Context, EndpointDescriptor, Payload, TetherError, Value, STREAM_IN_KEY, STREAM_KEY,
    };

    struct Files;

    impl Handler for Files {
        fn name(&self) -> &str {
            "Files"
        }

        fn endpoints(&self) -> Vec<EndpointDescriptor> {
            vec![
                EndpointDescriptor::new("Upload", EndpointKind::StreamIn, None, None),
                EndpointDescriptor::new(
                    "Stat",
                    EndpointKind::Unary,
                    Some(Value::leaf("StatRequest")),
                    Some(Value::leaf("StatReply")),
                ),
            ]
        }

        fn call<'a>(
            &'a self,
            method: &'a str,
            _ctx: Context,
            _payload: Payload,
        ) -> BoxFuture<'a, Result<Vec<u8>, TetherError>> {
            Box::pin(async move { Err(TetherError::MethodNotFound(method.to_string())) })
        }
    }

    #[test]
    fn test_endpoints_and_kinds() {
        let options = HandlerOptions::new().endpoint_metadata(
            "Files.Stat",
            HashMap::from([("cache".to_string(), "60s".to_string())]),
        );
        let registered = RegisteredHandler::new(Arc::new(Files), options);

        assert_eq!(registered.name(), "Files");
        let endpoints = registered.endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].name, "Files.Upload");
        assert_eq!(endpoints[0].metadata[STREAM_KEY], "true");
        assert_eq!(endpoints[0].metadata[STREAM_IN_KEY], "true");
        assert_eq!(endpoints[1].name, "Files.Stat");
        assert_eq!(endpoints[1].metadata.len(), 1);
        assert_eq!(endpoints[1].metadata["cache"], "60s");

        assert_eq!(registered.kind("Upload"), Some(EndpointKind::StreamIn));
        assert_eq!(registered.kind("Missing"), None);
        assert!(!registered.is_internal());
    }
}
