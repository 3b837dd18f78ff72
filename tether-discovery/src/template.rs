//! DNS-template selector.
//!
//! Builds an address from the service name and environment-provided settings
//! without any registry lookup:
//!
//! | mode           | `core-role`, domain `svc.cluster.local` |
//! |----------------|------------------------------------------|
//! | `splitservice` | `role.core.svc.cluster.local:8080`       |
//! | `name`         | `role.svc.cluster.local:8080`            |
//! | `env`          | `core-role.<ENV>.svc.cluster.local:8080` |
//! | `direct`       | `core-role.svc.cluster.local:8080`       |
//! | (empty)        | `core-role:8080`                         |
//!
//! Names containing `127` or `localhost`, and every name when no suffix mode
//! is configured, skip the template and only get the port appended.

use async_trait::async_trait;

use tether_core::{ConfigError, Env, Node, SelectError, ENV_VAR};

use crate::selector::{next_node, Next, SelectOptions, Selector, SelectorOptions};

pub const STATIC_SELECTOR_DOMAIN_NAME: &str = "STATIC_SELECTOR_DOMAIN_NAME";
pub const STATIC_SELECTOR_SUFFIX: &str = "STATIC_SELECTOR_SUFFIX";
pub const STATIC_SELECTOR_ENVMOD: &str = "STATIC_SELECTOR_ENVMOD";
pub const STATIC_SELECTOR_PORT_NUMBER: &str = "STATIC_SELECTOR_PORT_NUMBER";
pub const DEFAULT_PORT_NUMBER: &str = "8080";

/// How the service name is rewritten before the domain is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixMode {
    /// `prefix-rest` becomes `rest.prefix`, optionally `rest.prefix-<env>`.
    SplitService,
    /// `prefix-rest` becomes `rest`.
    Name,
    /// `service` becomes `service.<ENV>`.
    Env,
    /// Name used verbatim.
    Direct,
    /// No suffix configured.
    None,
}

impl SuffixMode {
    /// Parse a configured suffix. Matching is by substring, so bracketed forms
    /// like `[splitservice]` are accepted.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        if value.contains("splitservice") {
            Ok(Self::SplitService)
        } else if value.contains("name") {
            Ok(Self::Name)
        } else if value.contains("env") {
            Ok(Self::Env)
        } else if value.contains("direct") {
            Ok(Self::Direct)
        } else if value.is_empty() {
            Ok(Self::None)
        } else {
            Err(ConfigError::InvalidSuffixMode {
                mode: value.to_string(),
            })
        }
    }
}

/// Raw settings for [`StaticSelector`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticConfig {
    pub domain_name: String,
    pub suffix: String,
    /// Append the environment tag to the split-service layer.
    pub env_mod: bool,
    /// Port number; empty means 8080.
    pub port: String,
    /// Raw value of `ENV`.
    pub env: String,
}

impl StaticConfig {
    /// Read the `STATIC_SELECTOR_*` variables and `ENV`.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            domain_name: var(STATIC_SELECTOR_DOMAIN_NAME),
            suffix: var(STATIC_SELECTOR_SUFFIX),
            env_mod: var(STATIC_SELECTOR_ENVMOD) == "true",
            port: var(STATIC_SELECTOR_PORT_NUMBER),
            env: var(ENV_VAR),
        }
    }
}

/// Synthesizes a DNS address per service. Selection is pure: the same name
/// always maps to the same address.
#[derive(Debug, Clone)]
pub struct StaticSelector {
    mode: SuffixMode,
    env_mod: bool,
    domain: String,
    port: String,
    env: String,
    options: SelectorOptions,
}

impl StaticSelector {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSuffixMode`] for an unrecognized suffix.
    pub fn new(config: StaticConfig) -> Result<Self, ConfigError> {
        let mode = SuffixMode::parse(&config.suffix)?;
        let domain = if config.domain_name.is_empty() {
            String::new()
        } else {
            format!(".{}", config.domain_name)
        };
        let port = if config.port.is_empty() {
            DEFAULT_PORT_NUMBER
        } else {
            config.port.as_str()
        };

        Ok(Self {
            mode,
            env_mod: config.env_mod,
            domain,
            port: format!(":{port}"),
            env: config.env,
            options: SelectorOptions::default(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSuffixMode`] for an unrecognized suffix.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(StaticConfig::from_env())
    }

    #[must_use]
    pub fn mode(&self) -> SuffixMode {
        self.mode
    }

    /// Rewritten service name and the layer segment placed before the domain.
    fn process(&self, service: &str) -> (String, String) {
        match self.mode {
            SuffixMode::SplitService => match service.split_once('-') {
                Some((prefix, rest)) => {
                    let mut layer = format!(".{prefix}");
                    if self.env_mod {
                        layer = format!("{layer}-{}", Env::parse(&self.env));
                    }
                    (rest.to_string(), layer)
                }
                None => (service.to_string(), String::new()),
            },
            SuffixMode::Name => match service.split_once('-') {
                Some((_, rest)) => (rest.to_string(), String::new()),
                None => (service.to_string(), String::new()),
            },
            SuffixMode::Env => (format!("{service}.{}", self.env), String::new()),
            SuffixMode::Direct | SuffixMode::None => (service.to_string(), String::new()),
        }
    }

    /// Node for `service`.
    #[must_use]
    pub fn resolve(&self, service: &str) -> Node {
        let (name, layer) = self.process(service);

        let address = if self.mode == SuffixMode::None || is_localhost(&name) {
            format!("{name}{}", self.port)
        } else {
            format!("{name}{layer}{}{}", self.domain, self.port)
        };
        Node::new(name, address)
    }
}

fn is_localhost(service: &str) -> bool {
    service.contains("127") || service.contains("localhost")
}

#[async_trait]
impl Selector for StaticSelector {
    fn init(&mut self, options: SelectorOptions) {
        self.options = options;
    }

    fn options(&self) -> &SelectorOptions {
        &self.options
    }

    async fn select(&self, service: &str, _options: SelectOptions) -> Result<Next, SelectError> {
        Ok(next_node(self.resolve(service)))
    }

    fn name(&self) -> &str {
        "static"
    }
}
