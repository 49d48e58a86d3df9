//! Repository provisioning and lookup

use kiln_core::{KilnError, Result};
use tracing::info;

use crate::host::{RepositoryHandle, SourceHost};

/// Create the project repository, or reuse it when the name is taken
///
/// A first-round request for an existing project proceeds against the
/// existing repository.
pub async fn ensure_repository(host: &dyn SourceHost, name: &str) -> Result<RepositoryHandle> {
    match host.create_repository(name).await {
        Ok(repo) => {
            info!("Created repository {}", repo.full_name());
            Ok(repo)
        }
        Err(KilnError::RepositoryConflict(_)) => {
            info!("Repository {}/{} exists, reusing it", host.owner(), name);
            host.get_repository(name).await
        }
        Err(e) => Err(e),
    }
}

/// Look up an existing project repository for a revision round
///
/// A missing repository is `RevisionTargetMissing`.
pub async fn fetch_repository(host: &dyn SourceHost, name: &str) -> Result<RepositoryHandle> {
    host.get_repository(name).await.map_err(|e| match e {
        KilnError::RepositoryNotFound(full_name) => KilnError::RevisionTargetMissing(format!(
            "repository {} does not exist",
            full_name
        )),
        other => other,
    })
}

/// Read a UTF-8 file from the default branch
pub async fn get_text_file(
    host: &dyn SourceHost,
    repo: &RepositoryHandle,
    path: &str,
) -> Result<Option<String>> {
    match host.get_file(repo, path).await? {
        None => Ok(None),
        Some(file) => String::from_utf8(file.content)
            .map(Some)
            .map_err(|_| KilnError::Hosting(format!("{} is not valid UTF-8", path))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryHost;

    #[tokio::test]
    async fn test_ensure_creates_new() {
        let host = InMemoryHost::default();
        let repo = ensure_repository(&host, "timer").await.unwrap();
        assert_eq!(repo.name, "timer");
        assert!(host.has_repository("timer"));
    }

    #[tokio::test]
    async fn test_ensure_reuses_existing() {
        let host = InMemoryHost::default().with_repository("timer", &[("index.html", "v1")]);
        let repo = ensure_repository(&host, "timer").await.unwrap();
        assert_eq!(repo.name, "timer");
        assert_eq!(host.create_repository_calls(), 1);
        assert_eq!(host.file_text("timer", "index.html").unwrap(), "v1");
    }

    #[tokio::test]
    async fn test_fetch_missing_is_revision_target_missing() {
        let host = InMemoryHost::default();
        let err = fetch_repository(&host, "ghost").await.unwrap_err();
        assert!(matches!(err, KilnError::RevisionTargetMissing(_)));
    }

    #[tokio::test]
    async fn test_get_text_file() {
        let host = InMemoryHost::default().with_repository("timer", &[("index.html", "<p>hi</p>")]);
        let repo = fetch_repository(&host, "timer").await.unwrap();
        assert_eq!(
            get_text_file(&host, &repo, "index.html").await.unwrap(),
            Some("<p>hi</p>".to_string())
        );
        assert_eq!(get_text_file(&host, &repo, "missing.html").await.unwrap(), None);
    }
}
