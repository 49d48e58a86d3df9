//! Source-hosting abstraction

use async_trait::async_trait;
use kiln_core::Result;
use serde::{Deserialize, Serialize};

/// Transient reference to a project repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    /// Browser URL of the repository
    pub html_url: String,
}

impl RepositoryHandle {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A file as currently stored on the default branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    /// Content hash used to address updates
    pub sha: String,
    pub content: Vec<u8>,
}

/// Result of a publication request the host accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagesStatus {
    Enabled,
    AlreadyConfigured,
}

/// Trait for source-hosting operations (allows faking in tests)
///
/// Implementations distinguish "name already exists" (`RepositoryConflict`)
/// and "no such repository" (`RepositoryNotFound`) from other failures.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Account that owns project repositories
    fn owner(&self) -> &str;

    /// Public static-site URL for a repository
    fn pages_url(&self, repo: &RepositoryHandle) -> String;

    /// Create a repository with an initialized default branch
    async fn create_repository(&self, name: &str) -> Result<RepositoryHandle>;

    async fn get_repository(&self, name: &str) -> Result<RepositoryHandle>;

    /// Read a file from the default branch, `None` if absent
    async fn get_file(&self, repo: &RepositoryHandle, path: &str) -> Result<Option<RemoteFile>>;

    async fn create_file(
        &self,
        repo: &RepositoryHandle,
        path: &str,
        message: &str,
        content: &[u8],
    ) -> Result<()>;

    /// Replace a file, addressed by the content hash it is expected to have
    async fn update_file(
        &self,
        repo: &RepositoryHandle,
        path: &str,
        message: &str,
        content: &[u8],
        sha: &str,
    ) -> Result<()>;

    /// Head commit of the default branch
    async fn latest_commit(&self, repo: &RepositoryHandle) -> Result<String>;

    /// High-level publication: create the static site for `branch`/`path`
    async fn create_pages_site(
        &self,
        repo: &RepositoryHandle,
        branch: &str,
        path: &str,
    ) -> Result<PagesStatus>;

    /// Low-level publication: a bare source configuration for `branch`/`path`
    ///
    /// Must be able to create the site on its own; it runs when the
    /// high-level request failed.
    async fn configure_pages_source(
        &self,
        repo: &RepositoryHandle,
        branch: &str,
        path: &str,
    ) -> Result<PagesStatus>;
}
