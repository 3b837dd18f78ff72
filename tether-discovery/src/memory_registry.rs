//! In-process registry backend.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use tether_core::{DeregisterOptions, Node, Registry, RegistryError, Service};

/// Registry that keeps records in process memory.
///
/// Records are stored per name and version; registering merges nodes by id,
/// deregistering removes the listed nodes and drops versions left empty.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    services: DashMap<String, HashMap<String, Service>>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every registered service, sorted.
    #[must_use]
    pub fn list_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }
}

fn merge_nodes(existing: &mut Vec<Node>, incoming: &[Node]) {
    for node in incoming {
        match existing.iter_mut().find(|n| n.id == node.id) {
            Some(slot) => *slot = node.clone(),
            None => existing.push(node.clone()),
        }
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, service: &Service) -> Result<(), RegistryError> {
        if service.name.is_empty() {
            return Err(RegistryError::Register("service name is empty".into()));
        }

        let mut versions = self.services.entry(service.name.clone()).or_default();
        match versions.get_mut(&service.version) {
            Some(record) => {
                merge_nodes(&mut record.nodes, &service.nodes);
                record.endpoints.clone_from(&service.endpoints);
            }
            None => {
                versions.insert(service.version.clone(), service.clone());
            }
        }

        tracing::debug!(
            service = %service.name,
            version = %service.version,
            nodes = service.nodes.len(),
            "registered in memory registry"
        );
        Ok(())
    }

    async fn deregister(
        &self,
        service: &Service,
        _options: DeregisterOptions,
    ) -> Result<(), RegistryError> {
        let Some(mut versions) = self.services.get_mut(&service.name) else {
            return Err(RegistryError::NotFound(service.name.clone()));
        };

        if let Some(record) = versions.get_mut(&service.version) {
            record
                .nodes
                .retain(|node| !service.nodes.iter().any(|n| n.id == node.id));
            if record.nodes.is_empty() {
                versions.remove(&service.version);
            }
        }

        drop(versions);
        // A register that raced in keeps the entry.
        self.services
            .remove_if(&service.name, |_, versions| versions.is_empty());
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<Vec<Service>, RegistryError> {
        let versions = self
            .services
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let mut services: Vec<Service> = versions.values().cloned().collect();
        services.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(services)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
