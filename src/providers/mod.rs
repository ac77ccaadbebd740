//! Discovery providers
//!
//! One trait, one implementation per cloud. The engine only ever sees the
//! trait: session creation, paged listing, and entry building.

mod identity;

pub mod azure;
pub mod gcp;

pub use azure::AksProvider;
pub use gcp::GkeProvider;

use anyhow::Result;
use async_trait::async_trait;

use crate::discovery::{ClusterPage, ClusterRecord, ConfigEntry, Session};

/// Capability set the engine requires from a cloud integration.
///
/// Every method is fallible and every failure is local: a failed session
/// skips one (tenant, region) pair, a failed page ends one session's
/// listing, a failed entry drops one cluster. None of them abort the run.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync + 'static {
    /// Authenticated per-scope listing handle.
    type Handle: Send + Sync + 'static;

    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Establish a session able to list clusters in (tenant, region).
    async fn create_session(&self, tenant: &str, region: &str) -> Result<Self::Handle>;

    /// Fetch one page of the cluster listing for a session. `page_token`
    /// is the `next_token` of the previous page, `None` for the first.
    async fn list_page(
        &self,
        session: &Session<Self::Handle>,
        page_token: Option<&str>,
    ) -> Result<ClusterPage>;

    /// Derive the kubeconfig entry for one discovered cluster.
    fn build_entry(&self, record: &ClusterRecord) -> Result<ConfigEntry>;
}
