//! Static-site publication

use kiln_core::fail_open::{fail_open, first_success, Strategy};
use kiln_core::{FailureKind, KilnError};
use tracing::info;

use crate::host::{PagesStatus, RepositoryHandle, SourceHost};

/// Site root within the default branch
pub const SITE_PATH: &str = "/";

/// Turn on static-site publication for the repository's default branch
///
/// Tries the high-level request, then the low-level source configuration.
/// "Already configured" counts as success. Never fails the job: returns
/// `false` when both requests are rejected.
pub async fn ensure_published(host: &dyn SourceHost, repo: &RepositoryHandle) -> bool {
    let branch = repo.default_branch.as_str();
    let strategies: Vec<Strategy<'_, PagesStatus>> = vec![
        ("create", host.create_pages_site(repo, branch, SITE_PATH)),
        ("configure-source", host.configure_pages_source(repo, branch, SITE_PATH)),
    ];

    let enabled = fail_open(FailureKind::PublicationEnable, "enable pages", async {
        first_success("enable pages", strategies).await.ok_or_else(|| {
            KilnError::PublicationEnable(format!(
                "no request enabled pages for {}",
                repo.full_name()
            ))
        })
    })
    .await;

    match enabled {
        Some((via, PagesStatus::AlreadyConfigured)) => {
            info!("Pages already configured for {} ({})", repo.full_name(), via);
            true
        }
        Some((via, PagesStatus::Enabled)) => {
            info!("Pages enabled for {} via {}", repo.full_name(), via);
            true
        }
        None => false,
    }
}
