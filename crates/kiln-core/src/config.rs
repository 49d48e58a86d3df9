//! Service configuration for Kiln
//!
//! Built once at startup and handed to every component. Sources, later
//! overriding earlier: defaults, an optional TOML file, environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{KilnError, Result};

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Secret every submission must present
    #[serde(default)]
    pub shared_secret: Option<String>,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub hosting: HostingConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub attachments: AttachmentConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Text-generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

/// Source-hosting service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingConfig {
    #[serde(default = "default_hosting_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub token: Option<String>,

    /// Account that owns every project repository
    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Publication verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-GET timeout while polling
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Decoded-size cap; larger attachments are dropped with a warning
    #[serde(default = "default_max_attachment_bytes")]
    pub max_bytes: usize,
}

/// Callback notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Delay after each failed attempt; its length is the attempt count
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: Vec<u64>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

// Default value providers
fn default_llm_base_url() -> String {
    "https://aipipe.org/openrouter/v1".to_string()
}

fn default_llm_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_hosting_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_verify_timeout_secs() -> u64 {
    180
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_max_attachment_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_backoff_secs() -> Vec<u64> {
    vec![1, 2, 4, 8]
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_token: None,
            model: default_llm_model(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            api_base: default_hosting_api_base(),
            token: None,
            owner: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            verify_timeout_secs: default_verify_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_attachment_bytes(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            backoff_secs: default_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl DeploymentConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl ServiceConfig {
    /// Load from a TOML file if one is given and exists, otherwise defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content).map_err(|e| {
                    KilnError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })
            }
            _ => Ok(Self::default()),
        }
    }

    /// Load the file layer, then overlay the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay environment values using the given lookup
    ///
    /// Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("KILN_SHARED_SECRET") {
            self.shared_secret = Some(v);
        }
        if let Some(v) = get("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("LLM_API_TOKEN") {
            self.llm.api_token = Some(v);
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.hosting.token = Some(v);
        }
        if let Some(v) = get("GITHUB_USERNAME") {
            self.hosting.owner = Some(v);
        }
        if let Some(v) = get("DEPLOYMENT_TIMEOUT") {
            match v.trim().parse::<u64>() {
                Ok(secs) => self.deployment.verify_timeout_secs = secs,
                Err(_) => tracing::warn!("Ignoring non-numeric DEPLOYMENT_TIMEOUT: {}", v),
            }
        }
        if let Some(v) = get("KILN_BIND") {
            self.server.bind = v;
        }
    }

    /// Names of required values that are not set
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.shared_secret.is_none() {
            missing.push("shared_secret");
        }
        if self.llm.api_token.is_none() {
            missing.push("llm.api_token");
        }
        if self.hosting.token.is_none() {
            missing.push("hosting.token");
        }
        if self.hosting.owner.is_none() {
            missing.push("hosting.owner");
        }
        missing
    }

    /// Fail with `Configuration` when any required value is missing
    pub fn ensure_ready(&self) -> Result<()> {
        let missing = self.missing_credentials();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(KilnError::Configuration(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Constant-shape comparison of a presented secret against the configured one
    pub fn secret_matches(&self, presented: &str) -> bool {
        match &self.shared_secret {
            Some(expected) => {
                let a = expected.as_bytes();
                let b = presented.as_bytes();
                a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
            }
            None => false,
        }
    }
}
