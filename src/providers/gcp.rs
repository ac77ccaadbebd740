//! GKE discovery provider
//!
//! Lists GKE clusters through the `container.googleapis.com` REST API and
//! derives exec-based kubeconfig entries backed by the
//! `gke-gcloud-auth-plugin` credential plugin.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

use super::identity::GcpTokenSource;
use super::DiscoveryProvider;
use crate::discovery::{ClusterPage, ClusterRecord, ConfigEntry, Session};

pub struct GkeProvider {
    http: reqwest::Client,
    tokens: GcpTokenSource,
}

/// Per-session state: the bearer token acquired when the session was
/// validated.
pub struct GkeHandle {
    token: String,
}

impl GkeProvider {
    pub fn new(credentials_file: Option<PathBuf>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            tokens: GcpTokenSource::new(credentials_file)?,
        })
    }
}

#[async_trait]
impl DiscoveryProvider for GkeProvider {
    type Handle = GkeHandle;

    fn name(&self) -> &'static str {
        "gcp"
    }

    async fn create_session(&self, tenant: &str, region: &str) -> Result<GkeHandle> {
        let token = self
            .tokens
            .token()
            .await
            .context("Failed to acquire GCP access token")?;
        debug!(project = tenant, location = region, "GCP session created");
        Ok(GkeHandle { token })
    }

    async fn list_page(
        &self,
        session: &Session<GkeHandle>,
        _page_token: Option<&str>,
    ) -> Result<ClusterPage> {
        let url = format!(
            "https://container.googleapis.com/v1/projects/{}/locations/{}/clusters",
            session.tenant, session.region
        );

        debug!(project = %session.tenant, location = %session.region, "Listing GKE clusters");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&session.handle.token)
            .send()
            .await
            .context("Failed to call the GKE API")?;
        if !response.status().is_success() {
            bail!("GKE API returned {}", response.status());
        }

        let data: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse GKE listing")?;

        // The GKE listing is not paginated.
        Ok(ClusterPage {
            records: records_from_response(&session.tenant, &session.region, &data),
            next_token: None,
        })
    }

    fn build_entry(&self, record: &ClusterRecord) -> Result<ConfigEntry> {
        let certificate_authority = BASE64
            .decode(record.ca_data.as_bytes())
            .context("Failed to decode certificate authority data")?;

        Ok(ConfigEntry {
            name: record.name.clone(),
            server: format!("https://{}", record.endpoint),
            certificate_authority,
            exec_command: "gke-gcloud-auth-plugin".to_string(),
            exec_args: vec![
                "--project".to_string(),
                record.tenant.clone(),
                "--location".to_string(),
                record.region.clone(),
                "--cluster".to_string(),
                record.name.clone(),
            ],
        })
    }
}

fn records_from_response(
    tenant: &str,
    region: &str,
    data: &serde_json::Value,
) -> Vec<ClusterRecord> {
    let Some(clusters) = data["clusters"].as_array() else {
        return Vec::new();
    };

    clusters
        .iter()
        .filter_map(|cluster| {
            let name = cluster["name"].as_str()?;
            Some(ClusterRecord {
                name: name.to_string(),
                region: cluster["location"].as_str().unwrap_or(region).to_string(),
                endpoint: cluster["endpoint"].as_str().unwrap_or_default().to_string(),
                ca_data: cluster["masterAuth"]["clusterCaCertificate"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                tenant: tenant.to_string(),
                metadata: HashMap::new(),
            })
        })
        .collect()
}
