//! Selector trait and common types.

use std::sync::Arc;

use async_trait::async_trait;

use tether_core::{Node, Registry, SelectError, Service, TetherError};

/// Single-use producer of one candidate node.
///
/// Call [`Selector::select`] again for further candidates.
pub type Next = Box<dyn FnOnce() -> Result<Node, SelectError> + Send>;

/// A [`Next`] that always yields `node`.
#[must_use]
pub fn next_node(node: Node) -> Next {
    Box::new(move || Ok(node))
}

/// How a selector picks among several candidate nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    RoundRobin,
    Random,
}

/// Narrows the services returned by a registry before a node is picked.
pub type Filter = Arc<dyn Fn(Vec<Service>) -> Vec<Service> + Send + Sync>;

/// Keep only nodes whose metadata has `key == value`.
#[must_use]
pub fn filter_label(key: impl Into<String>, value: impl Into<String>) -> Filter {
    let (key, value) = (key.into(), value.into());
    Arc::new(move |services: Vec<Service>| {
        services
            .into_iter()
            .map(|mut service| {
                service
                    .nodes
                    .retain(|node| node.metadata.get(&key) == Some(&value));
                service
            })
            .collect()
    })
}

/// Keep only services published with `version`.
#[must_use]
pub fn filter_version(version: impl Into<String>) -> Filter {
    let version = version.into();
    Arc::new(move |services: Vec<Service>| {
        services
            .into_iter()
            .filter(|service| service.version == version)
            .collect()
    })
}

/// Keep only services advertising the endpoint `name` (`Handler.Method`).
#[must_use]
pub fn filter_endpoint(name: impl Into<String>) -> Filter {
    let name = name.into();
    Arc::new(move |services: Vec<Service>| {
        services
            .into_iter()
            .filter(|service| service.endpoints.iter().any(|e| e.name == name))
            .collect()
    })
}

/// Per-call selection options.
#[derive(Clone, Default)]
pub struct SelectOptions {
    pub filters: Vec<Filter>,
    /// Overrides the selector's strategy for this call.
    pub strategy: Option<Strategy>,
}

impl SelectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Run every filter over `services` in order.
    #[must_use]
    pub fn apply(&self, services: Vec<Service>) -> Vec<Service> {
        self.filters
            .iter()
            .fold(services, |services, filter| filter(services))
    }
}

impl std::fmt::Debug for SelectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectOptions")
            .field("filters", &self.filters.len())
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Selector-wide options applied through [`Selector::init`].
#[derive(Clone, Default)]
pub struct SelectorOptions {
    pub registry: Option<Arc<dyn Registry>>,
    pub strategy: Strategy,
}

impl SelectorOptions {
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl std::fmt::Debug for SelectorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorOptions")
            .field("registry", &self.registry.as_ref().map(|r| r.name().to_string()))
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Resolves a service name to candidate nodes.
///
/// ## Example
///
/// ```rust,ignore
/// use tether_discovery::{MemorySelector, SelectOptions, Selector};
///
/// let selector = MemorySelector::new();
/// let next = selector.select("greeter", SelectOptions::new()).await?;
/// let node = next()?;
/// assert_eq!(node.address, "greeter:0");
/// ```
#[async_trait]
pub trait Selector: Send + Sync + 'static {
    /// Apply selector-wide options. Called before the selector is shared.
    fn init(&mut self, options: SelectorOptions);

    fn options(&self) -> &SelectorOptions;

    /// Candidates for `service`.
    async fn select(&self, service: &str, options: SelectOptions) -> Result<Next, SelectError>;

    /// Report the outcome of using `node`; `None` means success.
    fn mark(&self, service: &str, node: &Node, error: Option<&TetherError>) {
        let _ = (service, node, error);
    }

    /// Forget any outcome history for `service`.
    fn reset(&self, service: &str) {
        let _ = service;
    }

    /// Release resources. Later selections fail with [`SelectError::Closed`].
    fn close(&self) {}

    /// Implementation name.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn service(version: &str, nodes: &[(&str, &str)]) -> Service {
        Service {
            name: "greeter".into(),
            version: version.into(),
            nodes: nodes
                .iter()
                .map(|(id, zone)| Node {
                    id: (*id).into(),
                    address: format!("{id}:8080"),
                    metadata: HashMap::from([("zone".to_string(), (*zone).to_string())]),
                })
                .collect(),
            endpoints: Vec::new(),
        }
    }

    #[test]
    fn test_next_is_single_use() {
        let next = next_node(Node::new("a", "a:1"));
        assert_eq!(next().unwrap().address, "a:1");
    }

    #[test]
    fn test_filters_compose() {
        let services = vec![
            service("v1", &[("a", "east"), ("b", "west")]),
            service("v2", &[("c", "east")]),
        ];
        let options = SelectOptions::new()
            .filter(filter_version("v1"))
            .filter(filter_label("zone", "east"));

        let filtered = options.apply(services);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].nodes.len(), 1);
        assert_eq!(filtered[0].nodes[0].id, "a");
    }
}
