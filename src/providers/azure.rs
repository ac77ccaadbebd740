//! AKS discovery provider
//!
//! Lists AKS managed clusters through the Azure Resource Manager REST API
//! and derives exec-based kubeconfig entries backed by the az CLI.
//!
//! The ARM listing is subscription-wide and paginated via `nextLink`, so
//! regional sessions of one subscription see overlapping results; the
//! engine's identity-key dedup handles the overlap.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::identity::AzureTokenSource;
use super::DiscoveryProvider;
use crate::discovery::{ClusterPage, ClusterRecord, ConfigEntry, Session};

const ARM_API_VERSION: &str = "2024-05-01";

/// Metadata key carrying the resource group parsed from the ARM id.
const RESOURCE_GROUP_KEY: &str = "resource_group";

pub struct AksProvider {
    http: reqwest::Client,
    tokens: AzureTokenSource,
}

/// Per-session state: the bearer token acquired when the session was
/// validated.
pub struct AksHandle {
    token: String,
}

impl AksProvider {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            tokens: AzureTokenSource::new(),
        })
    }
}

#[async_trait]
impl DiscoveryProvider for AksProvider {
    type Handle = AksHandle;

    fn name(&self) -> &'static str {
        "azure"
    }

    async fn create_session(&self, tenant: &str, region: &str) -> Result<AksHandle> {
        let token = self
            .tokens
            .token()
            .await
            .context("Failed to acquire Azure access token")?;
        debug!(subscription = tenant, location = region, "Azure session created");
        Ok(AksHandle { token })
    }

    async fn list_page(
        &self,
        session: &Session<AksHandle>,
        page_token: Option<&str>,
    ) -> Result<ClusterPage> {
        let url = match page_token {
            Some(next_link) => next_link.to_string(),
            None => format!(
                "https://management.azure.com/subscriptions/{}/providers/\
                 Microsoft.ContainerService/managedClusters?api-version={}",
                session.tenant, ARM_API_VERSION
            ),
        };

        debug!(subscription = %session.tenant, location = %session.region, "Listing AKS clusters");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&session.handle.token)
            .send()
            .await
            .context("Failed to call the ARM API")?;
        if !response.status().is_success() {
            bail!("ARM API returned {}", response.status());
        }

        let data: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse AKS listing")?;

        Ok(ClusterPage {
            records: records_from_page(&session.tenant, &data),
            next_token: data["nextLink"].as_str().map(str::to_string),
        })
    }

    fn build_entry(&self, record: &ClusterRecord) -> Result<ConfigEntry> {
        let Some(resource_group) = record.metadata.get(RESOURCE_GROUP_KEY) else {
            bail!("cluster {} has no resource group in its ARM id", record.name);
        };

        Ok(ConfigEntry {
            name: record.name.clone(),
            server: format!("https://{}", record.endpoint),
            certificate_authority: record.ca_data.clone().into_bytes(),
            exec_command: "az".to_string(),
            exec_args: vec![
                "aks".to_string(),
                "get-credentials".to_string(),
                "--resource-group".to_string(),
                resource_group.clone(),
                "--name".to_string(),
                record.name.clone(),
            ],
        })
    }
}

fn records_from_page(tenant: &str, data: &serde_json::Value) -> Vec<ClusterRecord> {
    let Some(clusters) = data["value"].as_array() else {
        return Vec::new();
    };

    clusters
        .iter()
        .filter_map(|cluster| {
            let name = cluster["name"].as_str()?;
            let location = cluster["location"].as_str()?;

            let mut metadata = HashMap::new();
            if let Some(group) = cluster["id"].as_str().and_then(resource_group_from_id) {
                metadata.insert(RESOURCE_GROUP_KEY.to_string(), group);
            }

            let properties = &cluster["properties"];
            Some(ClusterRecord {
                name: name.to_string(),
                region: location.to_string(),
                endpoint: properties["fqdn"].as_str().unwrap_or_default().to_string(),
                ca_data: properties["networkProfile"]["serviceCidr"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                tenant: tenant.to_string(),
                metadata,
            })
        })
        .collect()
}

/// Pull the resource group out of an ARM resource id such as
/// `/subscriptions/<sub>/resourcegroups/<group>/providers/...`.
fn resource_group_from_id(id: &str) -> Option<String> {
    let mut parts = id.split('/');
    while let Some(part) = parts.next() {
        if part.eq_ignore_ascii_case("resourcegroups") {
            return parts.next().filter(|p| !p.is_empty()).map(str::to_string);
        }
    }
    None
}
