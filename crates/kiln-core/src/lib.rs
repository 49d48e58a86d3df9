//! # kiln-core
//!
//! Core types for the Kiln brief-to-site build service.
//!
//! A build job turns a natural-language brief into a single HTML page,
//! commits it to a project repository, publishes the repository as a static
//! site and reports the result to a callback URL.
//!
//! ## Contents
//!
//! - [`BuildJob`] and the result types exchanged with callers
//! - [`KilnError`] / [`FailureKind`], the unified error taxonomy
//! - [`ServiceConfig`], the immutable configuration value
//! - [`Clock`] plus retry and first-success combinators in [`fail_open`]

pub mod clock;
mod config;
mod error;
pub mod fail_open;
mod sanitize;
mod types;

pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{
    AttachmentConfig, DeploymentConfig, HostingConfig, LlmConfig, NotifyConfig, ServerConfig,
    ServiceConfig,
};
pub use error::{FailureKind, KilnError, Result};
pub use fail_open::RetryPolicy;
pub use sanitize::sanitize_name;
pub use types::*;
