//! Multi-tenant cluster discovery
//!
//! The provider-agnostic half of the tool: expanding tenants and regions
//! into concurrent discovery sessions, deduplicating along the way, and
//! feeding every discovered cluster through the entry builder into the
//! kubeconfig.
//!
//! ## Pipeline
//!
//! - **Scope source**: tenant list or line-delimited tenant file
//! - **Session fan-out**: one home-region session per unique tenant, then
//!   one session per remaining region
//! - **Listing**: paged cluster listing per session, identity-key dedup
//! - **Merge**: single consumer folds derived entries into the kubeconfig

mod engine;
mod scopes;
mod stats;
mod types;

pub use engine::DiscoveryEngine;
pub use scopes::tenant_stream;
pub use stats::RunStats;
pub use types::{ClusterPage, ClusterRecord, ConfigEntry, DedupScope, EngineOptions, Session};
