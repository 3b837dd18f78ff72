//! Selector backed by live registry queries.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;

use tether_core::{Node, Registry, RegistryError, SelectError, TetherError};

use crate::selector::{Next, SelectOptions, Selector, SelectorOptions, Strategy};

/// Consecutive failures that take a node out of rotation.
pub const TRIP_THRESHOLD: u32 = 3;

/// How long a tripped node stays out of rotation.
pub const TRIP_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct MarkState {
    failures: u32,
    tripped_until: Option<Instant>,
}

/// Resolves services through a [`Registry`] and balances across their nodes.
///
/// Nodes reported failing [`TRIP_THRESHOLD`] times in a row through
/// [`Selector::mark`] are skipped for [`TRIP_COOLDOWN`].
pub struct RegistrySelector {
    registry: Arc<dyn Registry>,
    options: SelectorOptions,
    marks: DashMap<(String, String), MarkState>,
    counters: DashMap<String, Arc<AtomicUsize>>,
    closed: AtomicBool,
}

impl RegistrySelector {
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            options: SelectorOptions::default().registry(registry.clone()),
            registry,
            marks: DashMap::new(),
            counters: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn is_tripped(&self, service: &str, node: &Node, now: Instant) -> bool {
        self.marks
            .get(&(service.to_string(), node.id.clone()))
            .and_then(|state| state.tripped_until)
            .is_some_and(|until| until > now)
    }
}

#[async_trait]
impl Selector for RegistrySelector {
    fn init(&mut self, options: SelectorOptions) {
        if let Some(registry) = &options.registry {
            self.registry = registry.clone();
        }
        self.options = SelectorOptions {
            registry: Some(self.registry.clone()),
            strategy: options.strategy,
        };
    }

    fn options(&self) -> &SelectorOptions {
        &self.options
    }

    async fn select(&self, service: &str, options: SelectOptions) -> Result<Next, SelectError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SelectError::Closed);
        }

        let services = self.registry.get_service(service).await.map_err(|e| match e {
            RegistryError::NotFound(_) => SelectError::NotFound(service.to_string()),
            other => SelectError::Registry(other.to_string()),
        })?;
        if services.is_empty() {
            return Err(SelectError::NotFound(service.to_string()));
        }

        let now = Instant::now();
        let nodes: Vec<Node> = options
            .apply(services)
            .into_iter()
            .flat_map(|s| s.nodes)
            .filter(|node| !self.is_tripped(service, node, now))
            .collect();
        if nodes.is_empty() {
            return Err(SelectError::NoneAvailable(service.to_string()));
        }

        let strategy = options.strategy.unwrap_or(self.options.strategy);
        let counter = self
            .counters
            .entry(service.to_string())
            .or_default()
            .clone();

        Ok(Box::new(move || {
            let index = match strategy {
                Strategy::RoundRobin => counter.fetch_add(1, Ordering::Relaxed) % nodes.len(),
                Strategy::Random => rand::rng().random_range(0..nodes.len()),
            };
            Ok(nodes[index].clone())
        }))
    }

    fn mark(&self, service: &str, node: &Node, error: Option<&TetherError>) {
        let key = (service.to_string(), node.id.clone());
        match error {
            None => {
                self.marks.remove(&key);
            }
            Some(error) => {
                let mut state = self.marks.entry(key).or_default();
                state.failures += 1;
                if state.failures >= TRIP_THRESHOLD {
                    tracing::warn!(
                        service,
                        node = %node.id,
                        failures = state.failures,
                        error = %error,
                        "node tripped"
                    );
                    state.tripped_until = Some(Instant::now() + TRIP_COOLDOWN);
                }
            }
        }
    }

    fn reset(&self, service: &str) {
        self.marks.retain(|(name, _), _| name != service);
        self.counters.remove(service);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.marks.clear();
        self.counters.clear();
    }

    fn name(&self) -> &str {
        "registry"
    }
}

impl std::fmt::Debug for RegistrySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySelector")
            .field("registry", &self.registry.name())
            .field("strategy", &self.options.strategy)
            .field("marks", &self.marks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_registry::MemoryRegistry;
    use crate::selector::filter_version;
    use tether_core::{Service, TransportError};

    async fn registry_with(nodes: &[&str]) -> Arc<dyn Registry> {
        let registry = MemoryRegistry::new();
        registry
            .register(&Service {
                name: "greeter".into(),
                version: "v1".into(),
                nodes: nodes
                    .iter()
                    .map(|id| Node::new(*id, format!("{id}:9000")))
                    .collect(),
                endpoints: Vec::new(),
            })
            .await
            .unwrap();
        Arc::new(registry)
    }

    async fn pick(selector: &RegistrySelector) -> Node {
        selector.select("greeter", SelectOptions::new()).await.unwrap()().unwrap()
    }

    #[tokio::test]
    async fn test_round_robin() {
        let selector = RegistrySelector::new(registry_with(&["a", "b"]).await);
        let picks = [
            pick(&selector).await.id,
            pick(&selector).await.id,
            pick(&selector).await.id,
        ];
        assert_eq!(picks, ["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let selector = RegistrySelector::new(registry_with(&["a"]).await);
        let result = selector.select("missing", SelectOptions::new()).await;
        assert!(matches!(result, Err(SelectError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_filter_leaves_nothing() {
        let selector = RegistrySelector::new(registry_with(&["a"]).await);
        let result = selector
            .select("greeter", SelectOptions::new().filter(filter_version("v2")))
            .await;
        assert!(matches!(result, Err(SelectError::NoneAvailable(_))));
    }

    #[tokio::test]
    async fn test_mark_trips_after_threshold() {
        let selector = RegistrySelector::new(registry_with(&["a", "b"]).await);
        let a = Node::new("a", "a:9000");
        let error = TetherError::from(TransportError::ConnectionClosed);

        for _ in 0..TRIP_THRESHOLD {
            selector.mark("greeter", &a, Some(&error));
        }
        for _ in 0..4 {
            assert_eq!(pick(&selector).await.id, "b");
        }

        selector.reset("greeter");
        let ids: Vec<String> = [pick(&selector).await.id, pick(&selector).await.id].into();
        assert!(ids.contains(&"a".to_string()));
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let selector = RegistrySelector::new(registry_with(&["a"]).await);
        let a = Node::new("a", "a:9000");
        let error = TetherError::Cancelled;

        selector.mark("greeter", &a, Some(&error));
        selector.mark("greeter", &a, Some(&error));
        selector.mark("greeter", &a, None);
        selector.mark("greeter", &a, Some(&error));

        assert_eq!(pick(&selector).await.id, "a");
    }

    #[tokio::test]
    async fn test_closed_selector() {
        let selector = RegistrySelector::new(registry_with(&["a"]).await);
        selector.close();
        assert!(matches!(
            selector.select("greeter", SelectOptions::new()).await,
            Err(SelectError::Closed)
        ));
    }
}
