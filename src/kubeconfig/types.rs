//! Kubeconfig document model
//!
//! Just enough of the clientcmd v1 schema to merge cluster, user, and
//! context records by name. Unknown fields at every level are captured in
//! flattened maps so pre-existing content survives a load/persist cycle.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::discovery::ConfigEntry;

/// API version written into exec credential plugin stanzas.
const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";

/// Catch-all for fields this tool does not model.
pub type Extra = BTreeMap<String, serde_yaml::Value>;

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "Config".to_string()
}

/// The whole persisted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_yaml::Mapping::is_empty")]
    pub preferences: serde_yaml::Mapping,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub users: Vec<NamedAuthInfo>,
    #[serde(
        rename = "current-context",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub current_context: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for Kubeconfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            preferences: serde_yaml::Mapping::new(),
            clusters: Vec::new(),
            contexts: Vec::new(),
            users: Vec::new(),
            current_context: String::new(),
            extra: Extra::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,
    #[serde(
        rename = "certificate-authority-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedAuthInfo {
    pub name: String,
    pub user: AuthInfo,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecConfig>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    pub cluster: String,
    pub user: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Kubeconfig {
    /// Insert or overwrite the cluster, user, and context records for one
    /// derived entry, keyed by cluster name. Records under other names are
    /// left untouched.
    pub fn merge_entry(&mut self, entry: &ConfigEntry) {
        let cluster = NamedCluster {
            name: entry.name.clone(),
            cluster: Cluster {
                server: entry.server.clone(),
                certificate_authority_data: Some(BASE64.encode(&entry.certificate_authority)),
                extra: Extra::new(),
            },
            extra: Extra::new(),
        };
        upsert(&mut self.clusters, cluster);

        let user = NamedAuthInfo {
            name: entry.name.clone(),
            user: AuthInfo {
                exec: Some(ExecConfig {
                    api_version: EXEC_API_VERSION.to_string(),
                    command: entry.exec_command.clone(),
                    args: entry.exec_args.clone(),
                    extra: Extra::new(),
                }),
                extra: Extra::new(),
            },
            extra: Extra::new(),
        };
        upsert(&mut self.users, user);

        let context = NamedContext {
            name: entry.name.clone(),
            context: Context {
                cluster: entry.name.clone(),
                user: entry.name.clone(),
                extra: Extra::new(),
            },
            extra: Extra::new(),
        };
        upsert(&mut self.contexts, context);
    }

    /// Look up a cluster record by name.
    pub fn cluster(&self, name: &str) -> Option<&NamedCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for NamedCluster {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for NamedAuthInfo {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for NamedContext {
    fn name(&self) -> &str {
        &self.name
    }
}

fn upsert<T: Named>(items: &mut Vec<T>, item: T) {
    if let Some(existing) = items.iter_mut().find(|i| i.name() == item.name()) {
        *existing = item;
    } else {
        items.push(item);
    }
}
