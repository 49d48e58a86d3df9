//! Idempotent file publishing

use kiln_core::{KilnError, Result};
use tracing::{debug, info, instrument};

use crate::host::{RepositoryHandle, SourceHost};

/// What a publish call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    Updated,
    /// Remote content already matched; nothing written
    Unchanged,
}

impl PublishOutcome {
    pub fn wrote(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

fn publish_error(path: &str, e: KilnError) -> KilnError {
    match e {
        KilnError::Publish(_) => e,
        other => KilnError::Publish(format!("{}: {}", path, other)),
    }
}

/// Create or update one file on the default branch
///
/// Updates are addressed by the current content hash so a concurrent change
/// is detected rather than overwritten. Byte-identical content is skipped.
#[instrument(skip(host, repo, content), fields(repo = %repo.full_name(), bytes = content.len()))]
pub async fn publish_file(
    host: &dyn SourceHost,
    repo: &RepositoryHandle,
    path: &str,
    message: &str,
    content: &[u8],
) -> Result<PublishOutcome> {
    let existing = host
        .get_file(repo, path)
        .await
        .map_err(|e| publish_error(path, e))?;

    let outcome = match existing {
        Some(file) if file.content == content => {
            debug!("{} unchanged, skipping write", path);
            PublishOutcome::Unchanged
        }
        Some(file) => {
            host.update_file(repo, path, message, content, &file.sha)
                .await
                .map_err(|e| publish_error(path, e))?;
            PublishOutcome::Updated
        }
        None => {
            host.create_file(repo, path, message, content)
                .await
                .map_err(|e| publish_error(path, e))?;
            PublishOutcome::Created
        }
    };

    if outcome.wrote() {
        info!("{:?} {}: {}", outcome, path, message);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryHost, WriteKind};

    async fn setup() -> (InMemoryHost, RepositoryHandle) {
        let host = InMemoryHost::default().with_repository("site", &[("index.html", "v1")]);
        let repo = host.get_repository("site").await.unwrap();
        (host, repo)
    }

    #[tokio::test]
    async fn test_create_missing_file() {
        let (host, repo) = setup().await;
        let outcome = publish_file(&host, &repo, "LICENSE", "Create LICENSE", b"MIT")
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Created);
        assert_eq!(host.writes()[0].kind, WriteKind::Create);
    }

    #[tokio::test]
    async fn test_update_existing_file() {
        let (host, repo) = setup().await;
        let outcome = publish_file(&host, &repo, "index.html", "Update", b"v2")
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Updated);
        assert_eq!(host.file_text("site", "index.html").unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_identical_content_not_rewritten() {
        let (host, repo) = setup().await;
        let head = host.head("site");
        let outcome = publish_file(&host, &repo, "index.html", "Update", b"v1")
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Unchanged);
        assert_eq!(host.write_count(), 0);
        assert_eq!(host.head("site"), head);
    }

    #[tokio::test]
    async fn test_write_failure_is_publish_error() {
        let host = InMemoryHost::default()
            .with_repository("site", &[])
            .with_failing_path("index.html");
        let repo = host.get_repository("site").await.unwrap();
        let err = publish_file(&host, &repo, "index.html", "Create", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::Publish(_)));
    }
}
