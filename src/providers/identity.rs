//! Access-token acquisition
//!
//! Thin token sources for the provider REST calls. Tokens come from the
//! environment when present, then from the platform's ambient identity
//! (metadata server or CLI). Fetched tokens are cached and refreshed
//! shortly before they expire.

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Fallback lifetime for tokens whose source does not report one.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Refresh this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() + REFRESH_MARGIN >= self.expires_at
    }
}

/// GCP bearer tokens: env var, then GCE metadata server, then gcloud CLI.
pub(crate) struct GcpTokenSource {
    http: reqwest::Client,
    credentials_file: Option<PathBuf>,
    cached: Mutex<Option<CachedToken>>,
}

impl GcpTokenSource {
    pub(crate) fn new(credentials_file: Option<PathBuf>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client for token source")?;
        Ok(Self {
            http,
            credentials_file,
            cached: Mutex::new(None),
        })
    }

    pub(crate) async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch(&self) -> Result<CachedToken> {
        if let Ok(value) = env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            if !value.is_empty() {
                debug!("Using GCP access token from environment");
                return Ok(CachedToken::new(value, DEFAULT_TOKEN_TTL));
            }
        }

        // Metadata server (GCE / GKE with Workload Identity).
        if let Ok(response) = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
        {
            if response.status().is_success() {
                let data: serde_json::Value = response
                    .json()
                    .await
                    .context("Failed to parse metadata server token response")?;
                if let Some(value) = data["access_token"].as_str() {
                    let ttl = data["expires_in"].as_u64().unwrap_or(300);
                    debug!("Using GCP access token from metadata server");
                    return Ok(CachedToken::new(
                        value.to_string(),
                        Duration::from_secs(ttl),
                    ));
                }
            }
        }

        // gcloud CLI with application default credentials.
        let mut command = Command::new("gcloud");
        command.args(["auth", "application-default", "print-access-token"]);
        if let Some(file) = &self.credentials_file {
            command.env("GOOGLE_APPLICATION_CREDENTIALS", file);
        }
        let output = command.output().await.context("Failed to run gcloud CLI")?;
        if !output.status.success() {
            bail!(
                "gcloud auth failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        debug!("Using GCP access token from gcloud CLI");
        let value = String::from_utf8(output.stdout)
            .context("gcloud returned a non-UTF-8 token")?
            .trim()
            .to_string();
        Ok(CachedToken::new(value, DEFAULT_TOKEN_TTL))
    }
}

/// Azure Resource Manager bearer tokens: env var, then az CLI.
pub(crate) struct AzureTokenSource {
    cached: Mutex<Option<CachedToken>>,
}

impl AzureTokenSource {
    pub(crate) fn new() -> Self {
        Self {
            cached: Mutex::new(None),
        }
    }

    pub(crate) async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch(&self) -> Result<CachedToken> {
        if let Ok(value) = env::var("AZURE_ACCESS_TOKEN") {
            if !value.is_empty() {
                debug!("Using Azure access token from environment");
                return Ok(CachedToken::new(value, DEFAULT_TOKEN_TTL));
            }
        }

        let output = Command::new("az")
            .args(["account", "get-access-token", "--output", "json"])
            .output()
            .await
            .context("Failed to run az CLI")?;
        if !output.status.success() {
            bail!(
                "az account get-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let data: serde_json::Value =
            serde_json::from_slice(&output.stdout).context("Failed to parse az CLI output")?;
        let Some(value) = data["accessToken"].as_str() else {
            bail!("az CLI output did not contain an accessToken");
        };

        debug!("Using Azure access token from az CLI");
        Ok(CachedToken::new(value.to_string(), DEFAULT_TOKEN_TTL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_expiry() {
        let fresh = CachedToken::new("tok".to_string(), Duration::from_secs(3600));
        assert!(!fresh.is_expired());

        // Inside the refresh margin counts as expired.
        let stale = CachedToken::new("tok".to_string(), Duration::from_secs(30));
        assert!(stale.is_expired());
    }
}
