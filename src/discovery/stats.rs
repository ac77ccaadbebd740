//! Run statistics
//!
//! Counters for a single discovery run. The collector is created in `main`
//! and handed down explicitly; pipeline stages increment from whatever task
//! they run on and the totals are read once after everything has drained.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

/// Monotonic counters for one run.
///
/// Increments use relaxed atomics; the totals are only read after every
/// discovery task has finished. A non-zero error count at the end of a run
/// makes the run fail overall even when the kubeconfig was written.
#[derive(Debug, Default)]
pub struct RunStats {
    tenants_seen: AtomicU64,
    unique_tenants: AtomicU64,
    duplicate_tenants: AtomicU64,
    sessions: AtomicU64,
    regions_probed: AtomicU64,
    clusters: AtomicU64,
    errors: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tenant identifier was read from the scope source.
    pub fn tenant_seen(&self) {
        self.tenants_seen.fetch_add(1, Ordering::Relaxed);
    }

    /// A tenant passed first-wins dedup and its home session succeeded.
    pub fn tenant_accepted(&self) {
        self.unique_tenants.fetch_add(1, Ordering::Relaxed);
    }

    /// A tenant was dropped because an earlier occurrence was already taken.
    pub fn tenant_duplicate(&self) {
        self.duplicate_tenants.fetch_add(1, Ordering::Relaxed);
    }

    /// A usable session was established.
    pub fn session_created(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// A (tenant, region) pair was probed for a session.
    pub fn region_probed(&self) {
        self.regions_probed.fetch_add(1, Ordering::Relaxed);
    }

    /// A unique cluster was discovered.
    pub fn cluster_found(&self) {
        self.clusters.fetch_add(1, Ordering::Relaxed);
    }

    /// A non-fatal error was swallowed into the run outcome.
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tenants_seen_count(&self) -> u64 {
        self.tenants_seen.load(Ordering::Relaxed)
    }

    pub fn unique_tenant_count(&self) -> u64 {
        self.unique_tenants.load(Ordering::Relaxed)
    }

    pub fn duplicate_tenant_count(&self) -> u64 {
        self.duplicate_tenants.load(Ordering::Relaxed)
    }

    pub fn session_count(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn regions_probed_count(&self) -> u64 {
        self.regions_probed.load(Ordering::Relaxed)
    }

    pub fn cluster_count(&self) -> u64 {
        self.clusters.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Emit the end-of-run summary as one structured line.
    pub fn log_summary(&self) {
        info!(
            tenants = self.tenants_seen_count(),
            unique_tenants = self.unique_tenant_count(),
            duplicate_tenants = self.duplicate_tenant_count(),
            sessions = self.session_count(),
            regions_probed = self.regions_probed_count(),
            clusters = self.cluster_count(),
            errors = self.error_count(),
            "Run statistics"
        );
    }
}
