//! # kiln-hosting
//!
//! Source-hosting layer for Kiln: project repositories, file publishing and
//! static-site publication.
//!
//! All remote operations go through the [`SourceHost`] trait. [`GithubHost`]
//! talks to the GitHub REST API; [`InMemoryHost`] keeps everything in memory
//! for tests and dry runs.

mod github;
mod host;
mod memory;
mod pages;
mod provisioner;
mod publisher;

pub use github::GithubHost;
pub use host::{PagesStatus, RemoteFile, RepositoryHandle, SourceHost};
pub use memory::{InMemoryHost, PagesBehavior, WriteKind, WriteRecord};
pub use pages::{ensure_published, SITE_PATH};
pub use provisioner::{ensure_repository, fetch_repository, get_text_file};
pub use publisher::{publish_file, PublishOutcome};
