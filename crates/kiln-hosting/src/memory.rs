//! In-memory [`SourceHost`] for tests and dry runs

use async_trait::async_trait;
use kiln_core::{KilnError, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::host::{PagesStatus, RemoteFile, RepositoryHandle, SourceHost};

/// Kind of file write recorded by the fake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
}

/// One accepted file write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub repo: String,
    pub path: String,
    pub message: String,
    pub kind: WriteKind,
}

/// How the fake answers publication requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagesBehavior {
    /// High-level request succeeds
    Accept,
    /// High-level request fails, low-level succeeds
    FallbackOnly,
    /// Both report the site is already set up
    AlreadyConfigured,
    /// Both fail
    Reject,
}

#[derive(Debug, Default)]
struct StoredRepo {
    files: BTreeMap<String, Vec<u8>>,
    commits: Vec<String>,
    pages: bool,
}

#[derive(Debug)]
struct HostState {
    repos: HashMap<String, StoredRepo>,
    writes: Vec<WriteRecord>,
    failing_paths: HashSet<String>,
    pages_behavior: PagesBehavior,
    pages_requests: Vec<&'static str>,
    create_repository_calls: usize,
    /// Repository creation and head lookups fail at the transport level
    offline: bool,
}

/// Source host kept entirely in memory
///
/// Content hashes are SHA-256 of the file bytes, commit ids are derived from
/// the write sequence. Every accepted write produces a new commit.
#[derive(Debug)]
pub struct InMemoryHost {
    owner: String,
    state: Mutex<HostState>,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new("octo")
    }
}

fn content_sha(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

impl InMemoryHost {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            state: Mutex::new(HostState {
                repos: HashMap::new(),
                writes: Vec::new(),
                failing_paths: HashSet::new(),
                pages_behavior: PagesBehavior::Accept,
                pages_requests: Vec::new(),
                create_repository_calls: 0,
                offline: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, name: &str) -> RepositoryHandle {
        RepositoryHandle {
            owner: self.owner.clone(),
            name: name.to_string(),
            default_branch: "main".to_string(),
            html_url: format!("https://github.com/{}/{}", self.owner, name),
        }
    }

    /// Seed a repository with files already committed
    pub fn with_repository(self, name: &str, files: &[(&str, &str)]) -> Self {
        {
            let mut state = self.state();
            let repo = state.repos.entry(name.to_string()).or_default();
            for (path, content) in files {
                repo.files
                    .insert(path.to_string(), content.as_bytes().to_vec());
            }
            let seed = format!("seed:{}:{}", name, repo.files.len());
            repo.commits.push(content_sha(seed.as_bytes()));
        }
        self
    }

    /// Make every write to `path` fail
    pub fn with_failing_path(self, path: &str) -> Self {
        self.state().failing_paths.insert(path.to_string());
        self
    }

    /// Make repository creation and head lookups fail as if the network dropped
    pub fn with_transport_failures(self) -> Self {
        self.state().offline = true;
        self
    }

    pub fn with_pages_behavior(self, behavior: PagesBehavior) -> Self {
        self.state().pages_behavior = behavior;
        self
    }

    pub fn file(&self, repo: &str, path: &str) -> Option<Vec<u8>> {
        self.state()
            .repos
            .get(repo)
            .and_then(|r| r.files.get(path).cloned())
    }

    pub fn file_text(&self, repo: &str, path: &str) -> Option<String> {
        self.file(repo, path)
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    pub fn has_repository(&self, repo: &str) -> bool {
        self.state().repos.contains_key(repo)
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state().writes.len()
    }

    pub fn head(&self, repo: &str) -> Option<String> {
        self.state()
            .repos
            .get(repo)
            .and_then(|r| r.commits.last().cloned())
    }

    pub fn pages_enabled(&self, repo: &str) -> bool {
        self.state().repos.get(repo).is_some_and(|r| r.pages)
    }

    /// Publication requests received, in order ("create" / "configure")
    pub fn pages_requests(&self) -> Vec<&'static str> {
        self.state().pages_requests.clone()
    }

    pub fn create_repository_calls(&self) -> usize {
        self.state().create_repository_calls
    }

    fn write(
        &self,
        repo: &RepositoryHandle,
        path: &str,
        message: &str,
        content: &[u8],
        expected_sha: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state();
        if state.failing_paths.contains(path) {
            return Err(KilnError::Hosting(format!("write to {} rejected", path)));
        }

        let sequence = state.writes.len();
        let stored = state
            .repos
            .get_mut(&repo.name)
            .ok_or_else(|| KilnError::RepositoryNotFound(repo.full_name()))?;

        let current = stored.files.get(path).map(|c| content_sha(c));
        let kind = match (expected_sha, current) {
            (None, None) => WriteKind::Create,
            (None, Some(_)) => {
                return Err(KilnError::Hosting(format!("{} already exists", path)));
            }
            (Some(expected), Some(actual)) if expected == actual => WriteKind::Update,
            (Some(expected), _) => {
                return Err(KilnError::Publish(format!(
                    "{} changed concurrently (expected sha {})",
                    path, expected
                )));
            }
        };

        stored.files.insert(path.to_string(), content.to_vec());
        let commit = content_sha(format!("{}:{}:{}", repo.name, path, sequence).as_bytes());
        stored.commits.push(commit);

        state.writes.push(WriteRecord {
            repo: repo.name.clone(),
            path: path.to_string(),
            message: message.to_string(),
            kind,
        });
        Ok(())
    }

    fn pages(&self, repo: &RepositoryHandle, request: &'static str) -> Result<PagesStatus> {
        let mut state = self.state();
        state.pages_requests.push(request);
        let behavior = state.pages_behavior;

        let stored = state
            .repos
            .get_mut(&repo.name)
            .ok_or_else(|| KilnError::RepositoryNotFound(repo.full_name()))?;

        let outcome = match (behavior, request) {
            (PagesBehavior::Accept, _) | (PagesBehavior::FallbackOnly, "configure") => {
                Ok(PagesStatus::Enabled)
            }
            (PagesBehavior::AlreadyConfigured, _) => Ok(PagesStatus::AlreadyConfigured),
            _ => Err(KilnError::PublicationEnable(format!(
                "{} pages request rejected",
                request
            ))),
        };
        if outcome.is_ok() {
            stored.pages = true;
        }
        outcome
    }
}

#[async_trait]
impl SourceHost for InMemoryHost {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn pages_url(&self, repo: &RepositoryHandle) -> String {
        format!("https://{}.github.io/{}/", repo.owner, repo.name)
    }

    async fn create_repository(&self, name: &str) -> Result<RepositoryHandle> {
        let mut state = self.state();
        state.create_repository_calls += 1;
        if state.offline {
            return Err(KilnError::Http("connection reset by peer".to_string()));
        }
        if state.repos.contains_key(name) {
            return Err(KilnError::RepositoryConflict(name.to_string()));
        }
        let mut repo = StoredRepo::default();
        // auto_init: the default branch exists with an initial commit
        repo.commits
            .push(content_sha(format!("init:{}", name).as_bytes()));
        state.repos.insert(name.to_string(), repo);
        drop(state);
        Ok(self.handle(name))
    }

    async fn get_repository(&self, name: &str) -> Result<RepositoryHandle> {
        if self.has_repository(name) {
            Ok(self.handle(name))
        } else {
            Err(KilnError::RepositoryNotFound(format!(
                "{}/{}",
                self.owner, name
            )))
        }
    }

    async fn get_file(&self, repo: &RepositoryHandle, path: &str) -> Result<Option<RemoteFile>> {
        let state = self.state();
        let stored = state
            .repos
            .get(&repo.name)
            .ok_or_else(|| KilnError::RepositoryNotFound(repo.full_name()))?;
        Ok(stored.files.get(path).map(|content| RemoteFile {
            path: path.to_string(),
            sha: content_sha(content),
            content: content.clone(),
        }))
    }

    async fn create_file(
        &self,
        repo: &RepositoryHandle,
        path: &str,
        message: &str,
        content: &[u8],
    ) -> Result<()> {
        self.write(repo, path, message, content, None)
    }

    async fn update_file(
        &self,
        repo: &RepositoryHandle,
        path: &str,
        message: &str,
        content: &[u8],
        sha: &str,
    ) -> Result<()> {
        self.write(repo, path, message, content, Some(sha))
    }

    async fn latest_commit(&self, repo: &RepositoryHandle) -> Result<String> {
        if self.state().offline {
            return Err(KilnError::Http("connection reset by peer".to_string()));
        }
        self.head(&repo.name)
            .ok_or_else(|| KilnError::RepositoryNotFound(repo.full_name()))
    }

    async fn create_pages_site(
        &self,
        repo: &RepositoryHandle,
        _branch: &str,
        _path: &str,
    ) -> Result<PagesStatus> {
        self.pages(repo, "create")
    }

    async fn configure_pages_source(
        &self,
        repo: &RepositoryHandle,
        _branch: &str,
        _path: &str,
    ) -> Result<PagesStatus> {
        self.pages(repo, "configure")
    }
}
