//! GitHub REST implementation of [`SourceHost`]

use async_trait::async_trait;
use base64::Engine as _;
use kiln_core::{HostingConfig, KilnError, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::host::{PagesStatus, RemoteFile, RepositoryHandle, SourceHost};

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("kiln/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RepoInfo {
    name: String,
    owner: OwnerInfo,
    default_branch: String,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct OwnerInfo {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ContentInfo {
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BranchInfo {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

impl From<RepoInfo> for RepositoryHandle {
    fn from(info: RepoInfo) -> Self {
        Self {
            owner: info.owner.login,
            name: info.name,
            default_branch: info.default_branch,
            html_url: info.html_url,
        }
    }
}

/// GitHub API client scoped to one owner account
#[derive(Debug, Clone)]
pub struct GithubHost {
    http: reqwest::Client,
    api_base: String,
    token: String,
    owner: String,
}

impl GithubHost {
    /// Create a host from configuration
    ///
    /// Fails with `Configuration` when the token or owner is missing.
    pub fn new(config: &HostingConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| KilnError::Configuration("hosting.token is not set".to_string()))?;
        let owner = config
            .owner
            .clone()
            .ok_or_else(|| KilnError::Configuration("hosting.owner is not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| KilnError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
            owner,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| KilnError::Http(format!("GitHub request failed: {}", e)))
    }

    fn repo_path(repo: &RepositoryHandle) -> String {
        format!("/repos/{}/{}", repo.owner, repo.name)
    }

    async fn put_contents(
        &self,
        repo: &RepositoryHandle,
        path: &str,
        message: &str,
        content: &[u8],
        sha: Option<&str>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "branch": repo.default_branch,
        });
        if let Some(sha) = sha {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }

        let response = self
            .send(
                self.request(
                    Method::PUT,
                    &format!("{}/contents/{}", Self::repo_path(repo), path),
                )
                .json(&body),
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = body_text(response).await;
        if status == StatusCode::CONFLICT {
            return Err(KilnError::Publish(format!(
                "{} changed concurrently (expected sha {}): {}",
                path,
                sha.unwrap_or("none"),
                text
            )));
        }
        Err(KilnError::Hosting(format!(
            "writing {} returned {}: {}",
            path, status, text
        )))
    }

    async fn pages_request(
        &self,
        kind: PagesRequest,
        repo: &RepositoryHandle,
        branch: &str,
        path: &str,
    ) -> Result<PagesStatus> {
        let response = self
            .send(
                self.request(kind.method(), &format!("{}/pages", Self::repo_path(repo)))
                    .json(&kind.body(branch, path)),
            )
            .await?;

        let status = response.status();
        let text = body_text(response).await;
        pages_status_from(status.as_u16(), &text).ok_or_else(|| {
            KilnError::PublicationEnable(format!("pages request returned {}: {}", status, text))
        })
    }
}

/// The two forms of the site-creation call
///
/// Both create the site, so the fallback still works when the first call
/// failed before any site existed. An existing site answers 409, which
/// counts as already configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PagesRequest {
    /// Branch build with an explicit build type
    Create,
    /// Bare source configuration
    ConfigureSource,
}

impl PagesRequest {
    pub(crate) fn method(self) -> Method {
        Method::POST
    }

    pub(crate) fn body(self, branch: &str, path: &str) -> serde_json::Value {
        let source = serde_json::json!({ "branch": branch, "path": path });
        match self {
            Self::Create => serde_json::json!({ "build_type": "legacy", "source": source }),
            Self::ConfigureSource => serde_json::json!({ "source": source }),
        }
    }
}

async fn body_text(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown".to_string())
}

/// Whether a repository-creation failure means the name is taken
pub(crate) fn is_name_conflict(status: u16, body: &str) -> bool {
    status == 422 && body.to_lowercase().contains("already exists")
}

/// Interpret a pages response; `None` means the request failed
pub(crate) fn pages_status_from(status: u16, body: &str) -> Option<PagesStatus> {
    match status {
        200..=299 => Some(PagesStatus::Enabled),
        409 => Some(PagesStatus::AlreadyConfigured),
        422 if body.to_lowercase().contains("already") => Some(PagesStatus::AlreadyConfigured),
        _ => None,
    }
}

/// Decode the base64 `content` field of a contents response
pub(crate) fn decode_content(encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| KilnError::Hosting(format!("invalid file content encoding: {}", e)))
}

#[async_trait]
impl SourceHost for GithubHost {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn pages_url(&self, repo: &RepositoryHandle) -> String {
        format!("https://{}.github.io/{}/", repo.owner, repo.name)
    }

    #[instrument(skip(self), fields(owner = %self.owner))]
    async fn create_repository(&self, name: &str) -> Result<RepositoryHandle> {
        let body = serde_json::json!({ "name": name, "auto_init": true });
        let response = self
            .send(self.request(Method::POST, "/user/repos").json(&body))
            .await?;

        let status = response.status();
        if status.is_success() {
            let info: RepoInfo = response
                .json()
                .await
                .map_err(|e| KilnError::Hosting(format!("Failed to parse repository: {}", e)))?;
            return Ok(info.into());
        }

        let text = body_text(response).await;
        if is_name_conflict(status.as_u16(), &text) {
            return Err(KilnError::RepositoryConflict(name.to_string()));
        }
        Err(KilnError::Hosting(format!(
            "creating repository {} returned {}: {}",
            name, status, text
        )))
    }

    #[instrument(skip(self), fields(owner = %self.owner))]
    async fn get_repository(&self, name: &str) -> Result<RepositoryHandle> {
        let response = self
            .send(self.request(Method::GET, &format!("/repos/{}/{}", self.owner, name)))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(KilnError::RepositoryNotFound(format!(
                "{}/{}",
                self.owner, name
            ))),
            status if status.is_success() => {
                let info: RepoInfo = response.json().await.map_err(|e| {
                    KilnError::Hosting(format!("Failed to parse repository: {}", e))
                })?;
                Ok(info.into())
            }
            status => Err(KilnError::Hosting(format!(
                "fetching repository {} returned {}: {}",
                name,
                status,
                body_text(response).await
            ))),
        }
    }

    #[instrument(skip(self, repo), fields(repo = %repo.full_name()))]
    async fn get_file(&self, repo: &RepositoryHandle, path: &str) -> Result<Option<RemoteFile>> {
        let response = self
            .send(
                self.request(
                    Method::GET,
                    &format!("{}/contents/{}", Self::repo_path(repo), path),
                )
                .query(&[("ref", repo.default_branch.as_str())]),
            )
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("{} not present", path);
                Ok(None)
            }
            status if status.is_success() => {
                let info: ContentInfo = response.json().await.map_err(|e| {
                    KilnError::Hosting(format!("Failed to parse file {}: {}", path, e))
                })?;
                let content = decode_content(info.content.as_deref().unwrap_or_default())?;
                Ok(Some(RemoteFile {
                    path: info.path,
                    sha: info.sha,
                    content,
                }))
            }
            status => Err(KilnError::Hosting(format!(
                "reading {} returned {}: {}",
                path,
                status,
                body_text(response).await
            ))),
        }
    }

    #[instrument(skip(self, repo, content), fields(repo = %repo.full_name()))]
    async fn create_file(
        &self,
        repo: &RepositoryHandle,
        path: &str,
        message: &str,
        content: &[u8],
    ) -> Result<()> {
        self.put_contents(repo, path, message, content, None).await
    }

    #[instrument(skip(self, repo, content), fields(repo = %repo.full_name()))]
    async fn update_file(
        &self,
        repo: &RepositoryHandle,
        path: &str,
        message: &str,
        content: &[u8],
        sha: &str,
    ) -> Result<()> {
        self.put_contents(repo, path, message, content, Some(sha))
            .await
    }

    #[instrument(skip(self, repo), fields(repo = %repo.full_name()))]
    async fn latest_commit(&self, repo: &RepositoryHandle) -> Result<String> {
        let response = self
            .send(self.request(
                Method::GET,
                &format!("{}/branches/{}", Self::repo_path(repo), repo.default_branch),
            ))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(KilnError::Hosting(format!(
                "reading branch {} returned {}: {}",
                repo.default_branch,
                status,
                body_text(response).await
            )));
        }
        let branch: BranchInfo = response
            .json()
            .await
            .map_err(|e| KilnError::Hosting(format!("Failed to parse branch: {}", e)))?;
        Ok(branch.commit.sha)
    }

    #[instrument(skip(self, repo), fields(repo = %repo.full_name()))]
    async fn create_pages_site(
        &self,
        repo: &RepositoryHandle,
        branch: &str,
        path: &str,
    ) -> Result<PagesStatus> {
        self.pages_request(PagesRequest::Create, repo, branch, path).await
    }

    #[instrument(skip(self, repo), fields(repo = %repo.full_name()))]
    async fn configure_pages_source(
        &self,
        repo: &RepositoryHandle,
        branch: &str,
        path: &str,
    ) -> Result<PagesStatus> {
        self.pages_request(PagesRequest::ConfigureSource, repo, branch, path).await
    }
}
