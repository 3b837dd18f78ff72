//! Selector that sends every service to one configured address.

use async_trait::async_trait;

use tether_core::{Node, SelectError};

use crate::selector::{next_node, Next, SelectOptions, Selector, SelectorOptions};
use crate::template::DEFAULT_PORT_NUMBER;

pub const FIXED_SELECTOR_DOMAIN_NAME: &str = "FIXED_SELECTOR_DOMAIN_NAME";
pub const FIXED_SELECTOR_PORT_NUMBER: &str = "FIXED_SELECTOR_PORT_NUMBER";

/// Ignores the service name and always returns `<domain>:<port>`.
#[derive(Debug, Clone)]
pub struct FixedSelector {
    address: String,
    options: SelectorOptions,
}

impl FixedSelector {
    /// Build from an optional domain and port; the port defaults to 8080.
    #[must_use]
    pub fn new(domain_name: Option<&str>, port: Option<&str>) -> Self {
        let port = port.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PORT_NUMBER);
        Self {
            address: format!("{}:{port}", domain_name.unwrap_or_default()),
            options: SelectorOptions::default(),
        }
    }

    /// Build from `FIXED_SELECTOR_DOMAIN_NAME` and `FIXED_SELECTOR_PORT_NUMBER`.
    #[must_use]
    pub fn from_env() -> Self {
        let domain = std::env::var(FIXED_SELECTOR_DOMAIN_NAME).ok();
        let port = std::env::var(FIXED_SELECTOR_PORT_NUMBER).ok();
        Self::new(domain.as_deref(), port.as_deref())
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Selector for FixedSelector {
    fn init(&mut self, options: SelectorOptions) {
        self.options = options;
    }

    fn options(&self) -> &SelectorOptions {
        &self.options
    }

    async fn select(&self, service: &str, _options: SelectOptions) -> Result<Next, SelectError> {
        Ok(next_node(Node::new(service, self.address.clone())))
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
