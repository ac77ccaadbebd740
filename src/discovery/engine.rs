//! Discovery engine
//!
//! The provider-agnostic pipeline: expand tenants and regions into
//! sessions, dedup tenants first-wins, list every session concurrently,
//! dedup discovered clusters by identity key, and fold the derived entries
//! into the kubeconfig.
//!
//! ## Concurrency model
//!
//! One task per tenant, per regional session, and per session listing, all
//! funneled through mpsc channels. A shared semaphore bounds how many
//! remote calls run at once and every provider call carries a deadline. A
//! tenant's home-region session is always attempted, and resolved, before
//! any regional session for that tenant. Channels close when the last task
//! holding a sender finishes, which is how each stage knows the previous
//! one has drained. The kubeconfig itself is only ever touched by the
//! single merge consumer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error};

use super::scopes;
use super::stats::RunStats;
use super::types::{ClusterRecord, DedupScope, EngineOptions, Session};
use crate::kubeconfig::Kubeconfig;
use crate::providers::DiscoveryProvider;

const SESSION_CHANNEL_DEPTH: usize = 32;
const CLUSTER_CHANNEL_DEPTH: usize = 64;

pub struct DiscoveryEngine<P: DiscoveryProvider> {
    provider: Arc<P>,
    options: EngineOptions,
    stats: Arc<RunStats>,
    limiter: Arc<Semaphore>,
}

impl<P: DiscoveryProvider> DiscoveryEngine<P> {
    pub fn new(provider: P, options: EngineOptions, stats: Arc<RunStats>) -> Self {
        let limiter = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        Self {
            provider: Arc::new(provider),
            options,
            stats,
            limiter,
        }
    }

    /// Run the full pipeline, folding every discovered cluster's entry into
    /// `config`.
    ///
    /// Session, listing, and entry-build failures are counted and logged,
    /// never propagated; only an empty region list is an error here.
    pub async fn run(&self, config: &mut Kubeconfig) -> Result<()> {
        let Some(home) = self.options.home_region().map(str::to_string) else {
            bail!("at least one region is required");
        };

        let mut sessions = self.sessions(home);
        let (cluster_tx, mut cluster_rx) = mpsc::channel(CLUSTER_CHANNEL_DEPTH);
        let global_seen = match self.options.dedup {
            DedupScope::Global => Some(Arc::new(Mutex::new(HashSet::new()))),
            DedupScope::PerSession => None,
        };

        let mut listers = Vec::new();
        while let Some(session) = sessions.recv().await {
            listers.push(tokio::spawn(list_session(
                Arc::clone(&self.provider),
                session,
                cluster_tx.clone(),
                Arc::clone(&self.limiter),
                self.options.request_timeout,
                Arc::clone(&self.stats),
                global_seen.clone(),
            )));
        }
        drop(cluster_tx);

        while let Some(record) = cluster_rx.recv().await {
            match self.provider.build_entry(&record) {
                Ok(entry) => {
                    debug!(cluster = %entry.name, "Merging kubeconfig entry");
                    config.merge_entry(&entry);
                }
                Err(error) => {
                    self.stats.error();
                    error!(
                        cluster = %record.name,
                        error = %error,
                        "Error capturing cluster configuration"
                    );
                }
            }
        }

        // The cluster channel only closes once every lister dropped its
        // sender; join to surface panics before the stats are read.
        let _ = join_all(listers).await;
        Ok(())
    }

    /// Emit every unique accepted session: each tenant's home session
    /// first, then its regional sessions as they are created. The receiver
    /// ends only after every tenant's full region fan-out has completed.
    fn sessions(&self, home: String) -> mpsc::Receiver<Session<P::Handle>> {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_DEPTH);
        let provider = Arc::clone(&self.provider);
        let stats = Arc::clone(&self.stats);
        let limiter = Arc::clone(&self.limiter);
        let deadline = self.options.request_timeout;
        let regions = self.options.regions.clone();
        let mut tenants = scopes::tenant_stream(
            self.options.tenants.clone(),
            self.options.tenant_file.clone(),
        );

        tokio::spawn(async move {
            let mut attempted: HashSet<String> = HashSet::new();
            while let Some(tenant) = tenants.recv().await {
                stats.tenant_seen();
                if !attempted.insert(tenant.clone()) {
                    stats.tenant_duplicate();
                    debug!(tenant = %tenant, "Tenant is duplicate");
                    continue;
                }

                let provider = Arc::clone(&provider);
                let stats = Arc::clone(&stats);
                let limiter = Arc::clone(&limiter);
                let regions = regions.clone();
                let home = home.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Some(handle) =
                        try_create_session(provider.as_ref(), &limiter, deadline, &stats, &tenant, &home)
                            .await
                    else {
                        return;
                    };

                    stats.tenant_accepted();
                    debug!(tenant = %tenant, "Tenant is good for use");
                    let base = Session {
                        tenant: tenant.clone(),
                        region: home.clone(),
                        handle,
                    };
                    if tx.send(base).await.is_err() {
                        return;
                    }

                    for region in regions.into_iter().filter(|r| *r != home) {
                        let provider = Arc::clone(&provider);
                        let stats = Arc::clone(&stats);
                        let limiter = Arc::clone(&limiter);
                        let tenant = tenant.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            debug!(tenant = %tenant, region = %region, "Creating regional session");
                            if let Some(handle) = try_create_session(
                                provider.as_ref(),
                                &limiter,
                                deadline,
                                &stats,
                                &tenant,
                                &region,
                            )
                            .await
                            {
                                let _ = tx.send(Session { tenant, region, handle }).await;
                            }
                        });
                    }
                });
            }
        });

        rx
    }
}

/// One bounded, deadline-wrapped session-creation attempt. Failures are
/// logged and counted; the pair simply contributes nothing further.
async fn try_create_session<P: DiscoveryProvider>(
    provider: &P,
    limiter: &Semaphore,
    deadline: Duration,
    stats: &RunStats,
    tenant: &str,
    region: &str,
) -> Option<P::Handle> {
    stats.region_probed();
    let _permit = limiter.acquire().await.ok()?;
    match timeout(deadline, provider.create_session(tenant, region)).await {
        Ok(Ok(handle)) => {
            stats.session_created();
            debug!(tenant = %tenant, region = %region, "Session created");
            Some(handle)
        }
        Ok(Err(error)) => {
            stats.error();
            error!(tenant = %tenant, region = %region, error = %error, "Failed to create session");
            None
        }
        Err(_) => {
            stats.error();
            error!(tenant = %tenant, region = %region, "Session creation timed out");
            None
        }
    }
}

/// Page one session's listing to completion, dropping identity-key repeats,
/// and emit every accepted cluster on the shared channel. A listing error
/// ends this session only.
async fn list_session<P: DiscoveryProvider>(
    provider: Arc<P>,
    session: Session<P::Handle>,
    tx: mpsc::Sender<ClusterRecord>,
    limiter: Arc<Semaphore>,
    deadline: Duration,
    stats: Arc<RunStats>,
    global_seen: Option<Arc<Mutex<HashSet<String>>>>,
) {
    let mut seen = HashSet::new();
    let mut page_token: Option<String> = None;

    loop {
        let outcome = {
            let _permit = match limiter.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            timeout(deadline, provider.list_page(&session, page_token.as_deref())).await
        };

        let page = match outcome {
            Ok(Ok(page)) => page,
            Ok(Err(error)) => {
                stats.error();
                error!(
                    tenant = %session.tenant,
                    region = %session.region,
                    error = %error,
                    "Error listing clusters"
                );
                return;
            }
            Err(_) => {
                stats.error();
                error!(
                    tenant = %session.tenant,
                    region = %session.region,
                    "Cluster listing timed out"
                );
                return;
            }
        };

        for record in page.records {
            let key = record.identity_key();
            if !seen.insert(key.clone()) {
                debug!(cluster = %record.name, "Cluster repeated within session, skipping");
                continue;
            }
            if let Some(global) = &global_seen {
                if !global.lock().await.insert(key) {
                    debug!(cluster = %record.name, "Cluster already found by another session, skipping");
                    continue;
                }
            }

            stats.cluster_found();
            debug!(
                tenant = %session.tenant,
                region = %session.region,
                cluster = %record.name,
                "Found cluster"
            );
            if tx.send(record).await.is_err() {
                return;
            }
        }

        match page.next_token {
            Some(next) => page_token = Some(next),
            None => return,
        }
    }
}
