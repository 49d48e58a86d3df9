//! Core type definitions for Kiln build jobs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sanitize::sanitize_name;
use crate::{KilnError, Result};

/// Identifier assigned to every accepted job, used for log correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inline attachment supplied with a brief
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    /// `data:<mime>;base64,<payload>` URI
    #[serde(rename = "url")]
    pub data_uri: String,
}

/// The unit of work: one round of one project
///
/// Deserialized straight from the inbound request body. Never persisted.
#[derive(Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub email: String,
    #[serde(skip_serializing)]
    pub secret: String,
    /// Project identifier, also the repository name
    #[serde(rename = "task")]
    pub project: String,
    /// 1 creates the project, anything higher revises it
    pub round: u32,
    pub nonce: String,
    pub brief: String,
    #[serde(rename = "evaluation_url")]
    pub callback_url: String,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
    /// JavaScript expressions the generated page must satisfy
    #[serde(default)]
    pub checks: Option<Vec<String>>,
}

impl std::fmt::Debug for BuildJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildJob")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .field("project", &self.project)
            .field("round", &self.round)
            .field("nonce", &self.nonce)
            .field("brief", &self.brief)
            .field("callback_url", &self.callback_url)
            .field("attachments", &self.attachments().len())
            .field("checks", &self.checks())
            .finish()
    }
}

impl BuildJob {
    pub fn attachments(&self) -> &[Attachment] {
        self.attachments.as_deref().unwrap_or_default()
    }

    pub fn checks(&self) -> &[String] {
        self.checks.as_deref().unwrap_or_default()
    }

    /// Round 1 creates; every later round revises the existing project
    pub fn is_revision(&self) -> bool {
        self.round > 1
    }

    /// Reject jobs that cannot be run at all
    pub fn validate(&self) -> Result<()> {
        if self.round == 0 {
            return Err(KilnError::InvalidJob("round must be at least 1".to_string()));
        }
        if self.project.trim().is_empty() {
            return Err(KilnError::InvalidJob("task must not be empty".to_string()));
        }
        if sanitize_name(&self.project).is_empty() {
            return Err(KilnError::InvalidJob(format!(
                "task '{}' has no usable characters",
                self.project
            )));
        }
        if !(self.callback_url.starts_with("http://") || self.callback_url.starts_with("https://"))
        {
            return Err(KilnError::InvalidJob(format!(
                "evaluation_url must be an http(s) URL, got '{}'",
                self.callback_url
            )));
        }
        Ok(())
    }

    /// Sanitize the project identifier before any external call
    pub fn sanitized(mut self) -> Self {
        self.project = sanitize_name(&self.project);
        self
    }
}

/// Outcome of a successful publish, reported to the callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
    /// Whether the public URL answered before the verification timeout
    pub verified: bool,
}

/// JSON body POSTed to the job's callback URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

impl NotificationPayload {
    pub fn new(job: &BuildJob, result: &DeploymentResult) -> Self {
        Self {
            email: job.email.clone(),
            task: job.project.clone(),
            round: job.round,
            nonce: job.nonce.clone(),
            repo_url: result.repo_url.clone(),
            commit_sha: result.commit_sha.clone(),
            pages_url: result.pages_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_json() -> serde_json::Value {
        serde_json::json!({
            "email": "student@example.com",
            "secret": "s3cret",
            "task": "countdown timer",
            "round": 1,
            "nonce": "abc-123",
            "brief": "a countdown timer",
            "evaluation_url": "https://eval.example.com/notify",
            "attachments": null
        })
    }

    #[test]
    fn test_deserialize_wire_names() {
        let job: BuildJob = serde_json::from_value(job_json()).unwrap();
        assert_eq!(job.project, "countdown timer");
        assert_eq!(job.callback_url, "https://eval.example.com/notify");
        assert!(job.attachments().is_empty());
        assert!(job.checks().is_empty());
        assert!(!job.is_revision());
    }

    #[test]
    fn test_deserialize_attachments_and_checks() {
        let mut value = job_json();
        value["attachments"] = serde_json::json!([
            {"name": "data.csv", "url": "data:text/csv;base64,YSxiCjEsMg=="}
        ]);
        value["checks"] = serde_json::json!(["document.title.length > 0"]);
        let job: BuildJob = serde_json::from_value(value).unwrap();
        assert_eq!(job.attachments()[0].name, "data.csv");
        assert_eq!(job.checks().len(), 1);
    }

    #[test]
    fn test_validate_rejects_round_zero() {
        let mut value = job_json();
        value["round"] = serde_json::json!(0);
        let job: BuildJob = serde_json::from_value(value).unwrap();
        assert!(matches!(job.validate(), Err(KilnError::InvalidJob(_))));
    }

    #[test]
    fn test_validate_rejects_non_http_callback() {
        let mut value = job_json();
        value["evaluation_url"] = serde_json::json!("ftp://eval.example.com");
        let job: BuildJob = serde_json::from_value(value).unwrap();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_sanitized_project() {
        let job: BuildJob = serde_json::from_value(job_json()).unwrap();
        assert!(job.validate().is_ok());
        assert_eq!(job.sanitized().project, "countdown_timer");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let job: BuildJob = serde_json::from_value(job_json()).unwrap();
        let rendered = format!("{:?}", job);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_notification_payload_fields() {
        let job: BuildJob = serde_json::from_value(job_json()).unwrap();
        let result = DeploymentResult {
            repo_url: "https://github.com/octo/countdown".to_string(),
            commit_sha: "deadbeef".to_string(),
            pages_url: "https://octo.github.io/countdown/".to_string(),
            verified: true,
        };
        let payload = serde_json::to_value(NotificationPayload::new(&job, &result)).unwrap();
        assert_eq!(payload["task"], "countdown timer");
        assert_eq!(payload["round"], 1);
        assert_eq!(payload["commit_sha"], "deadbeef");
        assert!(payload.get("secret").is_none());
    }
}
