//! # tether-discovery
//!
//! Node selection for the tether RPC framework.
//!
//! A [`Selector`] turns a service name into a [`Next`], a one-shot producer
//! of the node to dial. Four selectors ship with the crate:
//!
//! - [`MemorySelector`]: `<service>:0`, for the in-process transport
//! - [`FixedSelector`]: one configured address for every service
//! - [`StaticSelector`]: a DNS name derived from the service name
//! - [`RegistrySelector`]: live [`Registry`](tether_core::Registry) lookups
//!   with filtering, round-robin or random picks, and failure tripping
//!
//! [`MemoryRegistry`] is the in-process registry backend.

mod fixed;
mod memory;
mod memory_registry;
mod registry;
mod selector;
mod template;

pub use fixed::{FixedSelector, FIXED_SELECTOR_DOMAIN_NAME, FIXED_SELECTOR_PORT_NUMBER};
pub use memory::MemorySelector;
pub use memory_registry::MemoryRegistry;
pub use registry::{RegistrySelector, TRIP_COOLDOWN, TRIP_THRESHOLD};
pub use selector::{
    filter_endpoint, filter_label, filter_version, next_node, Filter, Next, SelectOptions,
    Selector, SelectorOptions, Strategy,
};
pub use template::{
    StaticConfig, StaticSelector, SuffixMode, DEFAULT_PORT_NUMBER, STATIC_SELECTOR_DOMAIN_NAME,
    STATIC_SELECTOR_ENVMOD, STATIC_SELECTOR_PORT_NUMBER, STATIC_SELECTOR_SUFFIX,
};
