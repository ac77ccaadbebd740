//! Tenant scope source
//!
//! Expands the user-supplied tenant list, or a line-delimited tenant file,
//! into a lazy stream of identifiers. No deduplication happens here;
//! first-wins dedup belongs to the engine.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

const SCOPE_CHANNEL_DEPTH: usize = 32;

/// Stream tenant identifiers, one at a time.
///
/// An explicit list is used verbatim when non-empty. Otherwise the file is
/// read line by line; lines are trimmed, and blank lines and `#` comments
/// are skipped. A missing or unreadable file is a warning, not a failure:
/// the stream simply ends and the run discovers nothing.
pub fn tenant_stream(tenants: Vec<String>, tenant_file: Option<PathBuf>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(SCOPE_CHANNEL_DEPTH);

    tokio::spawn(async move {
        if !tenants.is_empty() {
            for tenant in tenants {
                if tx.send(tenant).await.is_err() {
                    return;
                }
            }
            return;
        }

        let Some(path) = tenant_file else {
            return;
        };

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(error) => {
                warn!(file = %path.display(), error = %error, "Failed to open tenant file");
                return;
            }
        };

        let mut lines = BufReader::new(file).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        continue;
                    }
                    if tx.send(trimmed.to_string()).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(error) => {
                    warn!(file = %path.display(), error = %error, "Failed reading tenant file");
                    return;
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn collect(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(tenant) = rx.recv().await {
            out.push(tenant);
        }
        out
    }

    #[tokio::test]
    async fn test_explicit_list_used_verbatim() {
        let rx = tenant_stream(vec!["a".into(), "b".into(), "a".into()], None);
        assert_eq!(collect(rx).await, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_explicit_list_wins_over_file() {
        let rx = tenant_stream(vec!["a".into()], Some(PathBuf::from("/does/not/matter")));
        assert_eq!(collect(rx).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_file_skips_blanks_and_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  proj-one  ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file, "proj-two").unwrap();

        let rx = tenant_stream(Vec::new(), Some(file.path().to_path_buf()));
        assert_eq!(collect(rx).await, vec!["proj-one", "proj-two"]);
    }

    #[tokio::test]
    async fn test_file_with_single_real_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file).unwrap();
        writeln!(file, "only-project").unwrap();

        let rx = tenant_stream(Vec::new(), Some(file.path().to_path_buf()));
        assert_eq!(collect(rx).await, vec!["only-project"]);
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty_stream() {
        let rx = tenant_stream(Vec::new(), Some(PathBuf::from("/no/such/tenant/file")));
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_inputs_yields_empty_stream() {
        let rx = tenant_stream(Vec::new(), None);
        assert!(collect(rx).await.is_empty());
    }
}
