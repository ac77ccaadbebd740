//! Kubeconfig document handling
//!
//! A minimal model of the clientcmd v1 document plus the merge rules and
//! the three-file atomic persist protocol. Entries this tool never touches
//! round-trip through a load/persist cycle unchanged.

mod store;
mod types;

pub use store::{KubeconfigStore, StoreError};
pub use types::{
    AuthInfo, Cluster, Context, ExecConfig, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
