//! Unified error types for Kiln

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Kiln operations
#[derive(Error, Debug)]
pub enum KilnError {
    // Accept-path errors
    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    // Generation errors
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Attachment error: {0}")]
    Attachment(String),

    // Source-hosting errors
    #[error("Repository already exists: {0}")]
    RepositoryConflict(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Revision target missing: {0}")]
    RevisionTargetMissing(String),

    #[error("Hosting API error: {0}")]
    Hosting(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Publication enable failed: {0}")]
    PublicationEnable(String),

    // Post-publish errors
    #[error("Deployment verification timed out: {0}")]
    VerificationTimeout(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    // Transport
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using KilnError
pub type Result<T> = std::result::Result<T, KilnError>;

/// Failure taxonomy reported in job outcomes and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Authorization,
    Configuration,
    Generation,
    RevisionTargetMissing,
    Publish,
    PublicationEnable,
    VerificationTimeout,
    Notification,
    /// Invalid state transition or a panic inside the job
    Internal,
}

impl FailureKind {
    /// Fatal kinds end the job in `Failed`; the rest are logged and the job continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::PublicationEnable | Self::VerificationTimeout | Self::Notification
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Authorization => "AuthorizationFailure",
            Self::Configuration => "ConfigurationFailure",
            Self::Generation => "GenerationFailure",
            Self::RevisionTargetMissing => "RevisionTargetMissing",
            Self::Publish => "PublishFailure",
            Self::PublicationEnable => "PublicationEnableFailure",
            Self::VerificationTimeout => "VerificationTimeout",
            Self::Notification => "NotificationFailure",
            Self::Internal => "InternalFailure",
        };
        f.write_str(name)
    }
}

impl KilnError {
    /// Map an error onto the failure taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Authorization(_) => FailureKind::Authorization,
            Self::Configuration(_) => FailureKind::Configuration,
            Self::Generation(_) | Self::Attachment(_) => FailureKind::Generation,
            Self::RepositoryNotFound(_) | Self::RevisionTargetMissing(_) => {
                FailureKind::RevisionTargetMissing
            }
            Self::RepositoryConflict(_) | Self::Hosting(_) | Self::Publish(_) => {
                FailureKind::Publish
            }
            Self::PublicationEnable(_) => FailureKind::PublicationEnable,
            Self::VerificationTimeout(_) => FailureKind::VerificationTimeout,
            Self::Notification(_) => FailureKind::Notification,
            Self::InvalidJob(_)
            | Self::Http(_)
            | Self::Io(_)
            | Self::Serialization(_) => FailureKind::Internal,
        }
    }
}
