//! kubeharvest library
//!
//! Concurrent multi-tenant cluster discovery and kubeconfig merging.
//! The discovery engine is generic over a [`providers::DiscoveryProvider`];
//! the kubeconfig module owns the merge rules and the atomic persist
//! protocol.

pub mod discovery;
pub mod kubeconfig;
pub mod providers;

pub use discovery::{DiscoveryEngine, EngineOptions, RunStats};
pub use kubeconfig::{Kubeconfig, KubeconfigStore};
pub use providers::DiscoveryProvider;
