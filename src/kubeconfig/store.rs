//! Kubeconfig persistence
//!
//! Load-or-default on the way in; a three-file rename protocol
//! (`<path>.tmp`, `<path>`, `<path>.bak`) on the way out. An external
//! reader sees either the old document or the new one, never a partial
//! write. A failed swap restores the previous file from the backup; a
//! failed restore is the one unrecoverable condition and names the backup
//! location so the file can be recovered by hand.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, warn};

use super::types::Kubeconfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read kubeconfig {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse kubeconfig {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize kubeconfig: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove stale backup {path}: {source}")]
    RemoveBackup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to replace kubeconfig {path}: {source}")]
    Replace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The new file could not be moved into place and the previous file
    /// could not be restored either. Manual recovery required: the old
    /// kubeconfig is at the backup path.
    #[error(
        "failed to replace kubeconfig {path} ({source}); \
         the previous version could not be restored and remains at {backup}"
    )]
    BackupStranded {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Owns the kubeconfig path and the load / persist protocol around it.
pub struct KubeconfigStore {
    path: PathBuf,
}

impl KubeconfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the existing document, or start from an empty one when no file
    /// exists yet. A file that exists but does not parse is fatal: nothing
    /// will be written over it.
    pub fn load(&self) -> Result<Kubeconfig, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_yaml::from_str(&raw).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            }),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(file = %self.path.display(), "No existing kubeconfig, starting empty");
                Ok(Kubeconfig::default())
            }
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Write the full document atomically with respect to the previous
    /// on-disk state.
    ///
    /// After a successful persist over an existing file the previous
    /// version remains at `<path>.bak`; it is removed as stale at the start
    /// of the next persist.
    pub fn persist(&self, config: &Kubeconfig) -> Result<(), StoreError> {
        let tmp = path_with_suffix(&self.path, "tmp");
        let bak = path_with_suffix(&self.path, "bak");

        let raw = serde_yaml::to_string(config).map_err(StoreError::Serialize)?;
        fs::write(&tmp, raw).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;

        if bak.exists() {
            debug!(file = %bak.display(), "Removing stale kubeconfig backup");
            fs::remove_file(&bak).map_err(|source| StoreError::RemoveBackup {
                path: bak.clone(),
                source,
            })?;
        }

        replace_with_backup(&self.path, &tmp, &bak)
    }
}

/// Swap `tmp` into `target`, parking the previous `target` at `bak`.
///
/// When the swap fails the previous file is moved back into place and only
/// the original error is reported; when even the restore fails the caller
/// is told where the backup lives.
fn replace_with_backup(target: &Path, tmp: &Path, bak: &Path) -> Result<(), StoreError> {
    if !target.exists() {
        debug!(file = %target.display(), "No existing kubeconfig, moving new file into place");
        return fs::rename(tmp, target).map_err(|source| StoreError::Replace {
            path: target.to_path_buf(),
            source,
        });
    }

    fs::rename(target, bak).map_err(|source| StoreError::Replace {
        path: target.to_path_buf(),
        source,
    })?;

    match fs::rename(tmp, target) {
        Ok(()) => Ok(()),
        Err(source) => {
            warn!(
                file = %target.display(),
                error = %source,
                "Failed to move new kubeconfig into place, restoring previous version"
            );
            match fs::rename(bak, target) {
                Ok(()) => Err(StoreError::Replace {
                    path: target.to_path_buf(),
                    source,
                }),
                Err(restore_error) => {
                    error!(
                        file = %target.display(),
                        backup = %bak.display(),
                        error = %restore_error,
                        "Could not restore previous kubeconfig from backup"
                    );
                    Err(StoreError::BackupStranded {
                        path: target.to_path_buf(),
                        backup: bak.to_path_buf(),
                        source,
                    })
                }
            }
        }
    }
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ConfigEntry;

    fn entry(name: &str, server: &str) -> ConfigEntry {
        ConfigEntry {
            name: name.to_string(),
            server: server.to_string(),
            certificate_authority: b"ca".to_vec(),
            exec_command: "gke-gcloud-auth-plugin".to_string(),
            exec_args: Vec::new(),
        }
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = KubeconfigStore::new(dir.path().join("config"));

        let config = store.load().unwrap();
        assert!(config.clusters.is_empty());
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.kind, "Config");
    }

    #[test]
    fn test_load_unparsable_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "clusters: [not, {valid").unwrap();

        let store = KubeconfigStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Parse { .. })));
        // Nothing was written over the broken file.
        assert_eq!(fs::read_to_string(&path).unwrap(), "clusters: [not, {valid");
    }

    #[test]
    fn test_persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = KubeconfigStore::new(dir.path().join("config"));

        let mut config = store.load().unwrap();
        config.merge_entry(&entry("edge", "https://10.0.0.1"));
        store.persist(&config).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.clusters.len(), 1);
        assert_eq!(reloaded.cluster("edge").unwrap().cluster.server, "https://10.0.0.1");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = KubeconfigStore::new(dir.path().join("config"));

        let mut once = store.load().unwrap();
        once.merge_entry(&entry("a", "https://a.example"));
        once.merge_entry(&entry("b", "https://b.example"));

        let mut twice = once.clone();
        twice.merge_entry(&entry("a", "https://a.example"));
        twice.merge_entry(&entry("b", "https://b.example"));

        assert_eq!(
            serde_yaml::to_string(&once).unwrap(),
            serde_yaml::to_string(&twice).unwrap()
        );
    }

    #[test]
    fn test_persist_preserves_untouched_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(
            &path,
            r#"
apiVersion: v1
kind: Config
current-context: a
clusters:
- name: a
  cluster:
    server: https://a.example
- name: b
  cluster:
    server: https://b.example
contexts:
- name: a
  context:
    cluster: a
    user: a
users:
- name: a
  user:
    token: keep
"#,
        )
        .unwrap();

        let store = KubeconfigStore::new(&path);
        let mut config = store.load().unwrap();
        config.merge_entry(&entry("c", "https://c.example"));
        store.persist(&config).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.clusters.len(), 3);
        assert_eq!(reloaded.cluster("a").unwrap().cluster.server, "https://a.example");
        assert_eq!(reloaded.cluster("b").unwrap().cluster.server, "https://b.example");
        assert_eq!(reloaded.cluster("c").unwrap().cluster.server, "https://c.example");
        assert_eq!(reloaded.current_context, "a");
        let user_a = reloaded.users.iter().find(|u| u.name == "a").unwrap();
        assert_eq!(
            user_a.user.extra.get("token"),
            Some(&serde_yaml::Value::String("keep".to_string()))
        );
    }

    #[test]
    fn test_rediscovered_cluster_overwrites_without_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = KubeconfigStore::new(dir.path().join("config"));

        let mut config = store.load().unwrap();
        config.merge_entry(&entry("foo", "https://old.example"));
        store.persist(&config).unwrap();

        let mut config = store.load().unwrap();
        config.merge_entry(&entry("foo", "https://new.example"));
        store.persist(&config).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.clusters.len(), 1);
        assert_eq!(reloaded.cluster("foo").unwrap().cluster.server, "https://new.example");
    }

    #[test]
    fn test_persist_parks_previous_version_in_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let store = KubeconfigStore::new(&path);

        let mut config = store.load().unwrap();
        config.merge_entry(&entry("first", "https://first.example"));
        store.persist(&config).unwrap();
        let first = fs::read_to_string(&path).unwrap();

        config.merge_entry(&entry("second", "https://second.example"));
        store.persist(&config).unwrap();

        let bak = path_with_suffix(&path, "bak");
        assert_eq!(fs::read_to_string(bak).unwrap(), first);
    }

    #[test]
    fn test_failed_swap_restores_original_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("config");
        let tmp = path_with_suffix(&target, "tmp");
        let bak = path_with_suffix(&target, "bak");

        fs::write(&target, "original document\n").unwrap();
        // No tmp file on disk: the second rename fails after the original
        // has already been parked at the backup path.
        let result = replace_with_backup(&target, &tmp, &bak);

        assert!(matches!(result, Err(StoreError::Replace { .. })));
        assert_eq!(fs::read_to_string(&target).unwrap(), "original document\n");
        assert!(!bak.exists());
    }

    #[test]
    fn test_backup_stranded_error_names_the_backup() {
        let error = StoreError::BackupStranded {
            path: PathBuf::from("/home/u/.kube/config"),
            backup: PathBuf::from("/home/u/.kube/config.bak"),
            source: io::Error::new(io::ErrorKind::Other, "disk gone"),
        };
        let message = error.to_string();
        assert!(message.contains("/home/u/.kube/config.bak"));
        assert!(message.contains("could not be restored"));
    }
}
