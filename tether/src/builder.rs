//! Assembling transports, registries and selectors from configuration names.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use tether_client::ClientOptions;
use tether_core::{ConfigError, Registry, TetherError};
use tether_discovery::{
    FixedSelector, MemoryRegistry, MemorySelector, RegistrySelector, Selector, StaticSelector,
};
use tether_transport::{ListenerRegistry, MemoryTransport, NetworkTransport, Transport};

pub const TRANSPORT_GRPC: &str = "grpc";
pub const TRANSPORT_MEMORY: &str = "memory";
pub const REGISTRY_MDNS: &str = "mdns";
pub const REGISTRY_MEMORY: &str = "memory";
pub const SELECTOR_REGISTRY: &str = "registry";
pub const SELECTOR_STATIC: &str = "static";
pub const SELECTOR_MEMORY: &str = "memory";
pub const SELECTOR_FIXED: &str = "fixed";

/// Transport used for unrecognized transport names.
pub const DEFAULT_TRANSPORT: &str = TRANSPORT_GRPC;
/// Registry preferred for unrecognized registry names.
pub const DEFAULT_REGISTRY: &str = REGISTRY_MDNS;
/// Fallbacks for unrecognized registry names, first registered wins.
const REGISTRY_FALLBACKS: [&str; 2] = [DEFAULT_REGISTRY, REGISTRY_MEMORY];

/// Failure to assemble a component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// No constructor is registered under this registry name.
    #[error("no registry constructor for {0:?}")]
    UnknownRegistry(String),

    /// The selector resolves through a registry but none was given.
    #[error("selector {0:?} needs a registry")]
    MissingRegistry(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<BuildError> for TetherError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Config(e) => TetherError::Config(e),
            BuildError::MissingRegistry(selector) => {
                TetherError::Config(ConfigError::MissingRegistry(selector))
            }
            other @ BuildError::UnknownRegistry(_) => {
                TetherError::Config(ConfigError::Invalid(other.to_string()))
            }
        }
    }
}

pub type TransportConstructor = Arc<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;
pub type RegistryConstructor = Arc<dyn Fn() -> Arc<dyn Registry> + Send + Sync>;
pub type SelectorConstructor = Arc<
    dyn Fn(Option<Arc<dyn Registry>>) -> Result<Arc<dyn Selector>, BuildError> + Send + Sync,
>;

/// One assembled (transport, registry, selector) combination.
#[derive(Clone)]
pub struct Components {
    pub transport: Arc<dyn Transport>,
    pub registry: Arc<dyn Registry>,
    /// `None` when the selector name is not recognized; connecting then
    /// falls back to dialing the service name.
    pub selector: Option<Arc<dyn Selector>>,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
            .field("transport", &self.transport.name())
            .field("registry", &self.registry.name())
            .field("selector", &self.selector.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

type CacheKey = (String, String, String);

struct Inner {
    listeners: Arc<ListenerRegistry>,
    transports: HashMap<String, TransportConstructor>,
    registries: HashMap<String, RegistryConstructor>,
    selectors: HashMap<String, SelectorConstructor>,
    cache: Mutex<HashMap<CacheKey, Components>>,
}

// Clones made before a registration keep the previous constructor set.
impl Clone for Inner {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            transports: self.transports.clone(),
            registries: self.registries.clone(),
            selectors: self.selectors.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }
}

/// Factory mapping configuration names to implementations.
///
/// Every builder owns its memory [`ListenerRegistry`] and its memory
/// registry, so servers and clients built from the same builder (or its
/// clones) see each other in-process, and separate builders stay isolated.
///
/// | kind | names | unrecognized |
/// |---|---|---|
/// | transport | `grpc`, `memory` | `grpc`, with a warning |
/// | registry | `memory` (`mdns` when registered) | `mdns` if registered, else `memory`, with a warning |
/// | selector | `registry`, `static`, `memory`, `fixed` | none, with a warning |
///
/// ```rust
/// use tether::Builder;
///
/// let builder = Builder::new();
/// let components = builder.components("memory", "memory", "memory").unwrap();
/// assert_eq!(components.transport.name(), "memory");
/// ```
#[derive(Clone)]
pub struct Builder {
    inner: Arc<Inner>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Builder with the built-in constructors.
    #[must_use]
    pub fn new() -> Self {
        let listeners = Arc::new(ListenerRegistry::new());
        let memory_listeners = listeners.clone();
        let memory_registry: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());

        Self::empty(listeners)
            .with_transport(TRANSPORT_GRPC, || {
                Arc::new(NetworkTransport::default()) as Arc<dyn Transport>
            })
            .with_transport(TRANSPORT_MEMORY, move || {
                Arc::new(MemoryTransport::new(memory_listeners.clone())) as Arc<dyn Transport>
            })
            .with_registry(REGISTRY_MEMORY, move || memory_registry.clone())
            .with_selector(SELECTOR_REGISTRY, |registry| match registry {
                Some(registry) => Ok(Arc::new(RegistrySelector::new(registry)) as Arc<dyn Selector>),
                None => Err(BuildError::MissingRegistry(SELECTOR_REGISTRY.to_string())),
            })
            .with_selector(SELECTOR_STATIC, |_| {
                Ok(Arc::new(StaticSelector::from_env()?) as Arc<dyn Selector>)
            })
            .with_selector(SELECTOR_MEMORY, |_| {
                Ok(Arc::new(MemorySelector::new()) as Arc<dyn Selector>)
            })
            .with_selector(SELECTOR_FIXED, |_| {
                Ok(Arc::new(FixedSelector::from_env()) as Arc<dyn Selector>)
            })
    }

    /// Builder with no constructors at all.
    fn empty(listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners,
                transports: HashMap::new(),
                registries: HashMap::new(),
                selectors: HashMap::new(),
                cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut Inner {
        let inner = Arc::make_mut(&mut self.inner);
        inner.cache.get_mut().clear();
        inner
    }

    /// Register or replace a transport constructor.
    #[must_use]
    pub fn with_transport(
        mut self,
        name: impl Into<String>,
        constructor: impl Fn() -> Arc<dyn Transport> + Send + Sync + 'static,
    ) -> Self {
        self.inner_mut()
            .transports
            .insert(name.into(), Arc::new(constructor));
        self
    }

    /// Register or replace a registry constructor, e.g. an `mdns` backend.
    #[must_use]
    pub fn with_registry(
        mut self,
        name: impl Into<String>,
        constructor: impl Fn() -> Arc<dyn Registry> + Send + Sync + 'static,
    ) -> Self {
        self.inner_mut()
            .registries
            .insert(name.into(), Arc::new(constructor));
        self
    }

    /// Register or replace a selector constructor.
    #[must_use]
    pub fn with_selector(
        mut self,
        name: impl Into<String>,
        constructor: impl Fn(Option<Arc<dyn Registry>>) -> Result<Arc<dyn Selector>, BuildError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.inner_mut()
            .selectors
            .insert(name.into(), Arc::new(constructor));
        self
    }

    /// Listener table shared by this builder's memory transports.
    #[must_use]
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.inner.listeners
    }

    /// Transport for `name`; unrecognized names get the network transport.
    #[must_use]
    pub fn transport(&self, name: &str) -> Arc<dyn Transport> {
        if let Some(constructor) = self.inner.transports.get(name) {
            return constructor();
        }
        tracing::warn!(
            transport = name,
            fallback = DEFAULT_TRANSPORT,
            "unknown transport, using default"
        );
        match self.inner.transports.get(DEFAULT_TRANSPORT) {
            Some(constructor) => constructor(),
            None => Arc::new(NetworkTransport::default()),
        }
    }

    /// Registry for `name`. Unrecognized names fall back to `mdns` when a
    /// backend is registered for it, and to `memory` otherwise.
    ///
    /// # Errors
    ///
    /// [`BuildError::UnknownRegistry`] when neither `name` nor any fallback
    /// has a constructor.
    pub fn registry(&self, name: &str) -> Result<Arc<dyn Registry>, BuildError> {
        if let Some(constructor) = self.inner.registries.get(name) {
            return Ok(constructor());
        }
        let fallback = REGISTRY_FALLBACKS
            .iter()
            .find_map(|fallback| self.inner.registries.get(*fallback).map(|c| (*fallback, c)));
        match fallback {
            Some((fallback, constructor)) => {
                tracing::warn!(registry = name, fallback, "unknown registry, using default");
                Ok(constructor())
            }
            None => Err(BuildError::UnknownRegistry(name.to_string())),
        }
    }

    /// Selector for `name`; `Ok(None)` for unrecognized names.
    ///
    /// # Errors
    ///
    /// [`BuildError::MissingRegistry`] for `registry` without a registry, or
    /// a configuration error from the selector's environment.
    pub fn selector(
        &self,
        name: &str,
        registry: Option<Arc<dyn Registry>>,
    ) -> Result<Option<Arc<dyn Selector>>, BuildError> {
        match self.inner.selectors.get(name) {
            Some(constructor) => constructor(registry).map(Some),
            None => {
                tracing::warn!(selector = name, "unknown selector, connections will not resolve");
                Ok(None)
            }
        }
    }

    /// Build (or reuse) the combination named by `transport`, `registry` and
    /// `selector`. Results are cached per exact name triple.
    ///
    /// # Errors
    ///
    /// See [`Builder::registry`] and [`Builder::selector`].
    pub fn components(
        &self,
        transport: &str,
        registry: &str,
        selector: &str,
    ) -> Result<Components, BuildError> {
        let key = (transport.to_string(), registry.to_string(), selector.to_string());
        if let Some(components) = self.inner.cache.lock().get(&key) {
            return Ok(components.clone());
        }

        let registry = self.registry(registry)?;
        let components = Components {
            transport: self.transport(transport),
            selector: self.selector(selector, Some(registry.clone()))?,
            registry,
        };

        // A concurrent build of the same key may have won; keep the first.
        let mut cache = self.inner.cache.lock();
        Ok(cache.entry(key).or_insert(components).clone())
    }

    /// Client options wired to the named components.
    ///
    /// # Errors
    ///
    /// See [`Builder::components`].
    pub fn client_options(
        &self,
        transport: &str,
        registry: &str,
        selector: &str,
    ) -> Result<ClientOptions, BuildError> {
        let components = self.components(transport, registry, selector)?;
        let options = ClientOptions::new().transport(components.transport);
        Ok(match components.selector {
            Some(selector) => options.selector(selector),
            None => options,
        })
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sorted = |names: Vec<&String>| {
            let mut names: Vec<String> = names.into_iter().cloned().collect();
            names.sort_unstable();
            names
        };
        f.debug_struct("Builder")
            .field("transports", &sorted(self.inner.transports.keys().collect()))
            .field("registries", &sorted(self.inner.registries.keys().collect()))
            .field("selectors", &sorted(self.inner.selectors.keys().collect()))
            .field("cached", &self.inner.cache.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_transport_names() {
        let builder = Builder::new();
        assert_eq!(builder.transport("grpc").name(), "grpc");
        assert_eq!(builder.transport("memory").name(), "memory");
        assert_eq!(builder.transport("quic").name(), "grpc");
    }

    #[test]
    fn test_registry_fallback_without_mdns() {
        let builder = Builder::new();
        let memory = builder.registry("memory").unwrap();
        let consul = builder.registry("consul").unwrap();
        let mdns = builder.registry("mdns").unwrap();
        assert!(Arc::ptr_eq(&memory, &consul));
        assert!(Arc::ptr_eq(&memory, &mdns));
    }

    #[test]
    fn test_registered_mdns_becomes_fallback() {
        let mdns: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());
        let registered = mdns.clone();
        let builder = Builder::new().with_registry("mdns", move || registered.clone());
        assert!(Arc::ptr_eq(&builder.registry("consul").unwrap(), &mdns));
        assert!(!Arc::ptr_eq(
            &builder.registry("consul").unwrap(),
            &builder.registry("memory").unwrap()
        ));
    }

    #[test]
    fn test_no_registry_constructors() {
        let builder = Builder::empty(Arc::new(ListenerRegistry::new()));
        assert_eq!(
            builder.registry("consul").err(),
            Some(BuildError::UnknownRegistry("consul".into()))
        );
    }

    #[test]
    fn test_memory_registry_is_shared_per_builder() {
        let builder = Builder::new();
        let a = builder.registry("memory").unwrap();
        let b = builder.clone().registry("memory").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = Builder::new().registry("memory").unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_selector_names() {
        let builder = Builder::new();
        let registry = builder.registry("memory").unwrap();

        let selector = builder.selector("registry", Some(registry)).unwrap().unwrap();
        assert_eq!(selector.name(), "registry");
        assert_eq!(
            builder.selector("registry", None).err(),
            Some(BuildError::MissingRegistry("registry".into()))
        );
        assert_eq!(builder.selector("memory", None).unwrap().unwrap().name(), "memory");
        assert!(builder.selector("consul", None).unwrap().is_none());
    }

    #[test]
    #[serial]
    fn test_static_selector_reads_environment() {
        std::env::set_var(tether_discovery::STATIC_SELECTOR_SUFFIX, "[bogus]");
        let result = Builder::new().selector("static", None);
        std::env::remove_var(tether_discovery::STATIC_SELECTOR_SUFFIX);

        assert!(matches!(
            result,
            Err(BuildError::Config(ConfigError::InvalidSuffixMode { .. }))
        ));
        assert_eq!(
            Builder::new().selector("static", None).unwrap().unwrap().name(),
            "static"
        );
    }

    #[test]
    fn test_components_are_cached_per_key() {
        let builder = Builder::new();
        let first = builder.components("memory", "memory", "memory").unwrap();
        let again = builder.components("memory", "memory", "memory").unwrap();
        assert!(Arc::ptr_eq(&first.transport, &again.transport));

        let other = builder.components("grpc", "memory", "registry").unwrap();
        assert_eq!(other.transport.name(), "grpc");
        assert_eq!(other.selector.unwrap().name(), "registry");
    }

    #[test]
    fn test_custom_constructors_reset_cache() {
        let builder = Builder::new();
        let before = builder.components("memory", "memory", "memory").unwrap();

        let builder = builder.with_selector("memory", |_| {
            Ok(Arc::new(FixedSelector::new(None, Some("9000"))) as Arc<dyn Selector>)
        });
        let after = builder.components("memory", "memory", "memory").unwrap();
        assert!(!Arc::ptr_eq(&before.transport, &after.transport));
        assert_eq!(after.selector.unwrap().name(), "fixed");
    }

    #[test]
    fn test_build_error_conversion() {
        let err = TetherError::from(BuildError::MissingRegistry("registry".into()));
        assert!(matches!(
            err,
            TetherError::Config(ConfigError::MissingRegistry(_))
        ));
    }
}
