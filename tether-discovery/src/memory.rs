//! Identity selector for the in-process transport.

use async_trait::async_trait;

use tether_core::{Node, SelectError};

use crate::selector::{next_node, Next, SelectOptions, Selector, SelectorOptions};

/// Returns `<service>:0`, the address memory listeners register under.
#[derive(Debug, Clone, Default)]
pub struct MemorySelector {
    options: SelectorOptions,
}

impl MemorySelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Selector for MemorySelector {
    fn init(&mut self, options: SelectorOptions) {
        self.options = options;
    }

    fn options(&self) -> &SelectorOptions {
        &self.options
    }

    async fn select(&self, service: &str, _options: SelectOptions) -> Result<Next, SelectError> {
        Ok(next_node(Node::new(service, format!("{service}:0"))))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_address() {
        let next = MemorySelector::new()
            .select("greeter", SelectOptions::new())
            .await
            .unwrap();
        let node = next().unwrap();
        assert_eq!(node.id, "greeter");
        assert_eq!(node.address, "greeter:0");
    }
}
