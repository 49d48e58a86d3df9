//! Pure state machine for the build-and-deploy pipeline
//!
//! No I/O happens here. The job runner executes the returned actions and
//! feeds the results back as events.
//!
//! - Pure function: transition(state, event) -> (state, actions)
//! - Payloads travel in actions, so a publish can only be requested with
//!   an artifact that a completed generation produced
//! - Invalid transitions go to Failed (never panic)
//! - Best-effort stages always advance; their failures become `Warn` actions

use kiln_agent::GeneratedArtifact;
use kiln_core::{DeploymentResult, FailureKind};
use serde::Serialize;

/// Pipeline stage, used for logging and for where a job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Generating,
    Publishing,
    Enabling,
    Verifying,
    Notifying,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Generating => "generating",
            Self::Publishing => "publishing",
            Self::Enabling => "enabling",
            Self::Verifying => "verifying",
            Self::Notifying => "notifying",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Files committed; what the later stages report on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedSite {
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

/// Job state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Accepted, nothing done yet
    Received,
    /// Producing the artifact; revisions first wait for the prior one
    Generating { awaiting_prior: bool },
    /// Writing files to the repository
    Publishing,
    /// Turning on static-site publication (best-effort)
    Enabling { site: PublishedSite },
    /// Polling the public URL (best-effort)
    Verifying { site: PublishedSite },
    /// Posting the result to the callback (best-effort)
    Notifying { result: DeploymentResult },
    /// Files published; `notified` records whether the callback accepted
    Done {
        result: DeploymentResult,
        notified: bool,
    },
    /// Fatal failure at `stage`
    Failed {
        stage: Stage,
        kind: FailureKind,
        error: String,
    },
}

impl State {
    /// Stage this state belongs to (Failed reports where it stopped)
    pub fn stage(&self) -> Stage {
        match self {
            Self::Received => Stage::Received,
            Self::Generating { .. } => Stage::Generating,
            Self::Publishing => Stage::Publishing,
            Self::Enabling { .. } => Stage::Enabling,
            Self::Verifying { .. } => Stage::Verifying,
            Self::Notifying { .. } => Stage::Notifying,
            Self::Done { .. } => Stage::Done,
            Self::Failed { stage, .. } => *stage,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

/// Events produced by executing actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Begin the pipeline for a job of this round
    Start { round: u32 },
    /// Prior `index.html` read from the existing repository
    PriorArtifactLoaded { html: String },
    /// Repository or prior artifact absent
    PriorArtifactMissing { reason: String },
    /// Generation produced an artifact
    Generated { artifact: GeneratedArtifact },
    /// Every required file was written (or already up to date)
    Published { site: PublishedSite },
    /// Publication enabler finished
    PagesChecked { enabled: bool },
    /// Deployment verifier finished
    Verified { verified: bool },
    /// Result notifier finished
    Notified { delivered: bool },
    /// A stage failed fatally
    Error { kind: FailureKind, message: String },
}

/// Side effects for the runner to execute, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Look up the repository and read its current page
    FetchPriorArtifact,
    /// Call the content generator
    Generate { prior: Option<String> },
    /// Provision (round 1) and write the round's files
    Publish { artifact: GeneratedArtifact },
    EnablePages,
    Verify { pages_url: String },
    Notify { result: DeploymentResult },
    /// Record a non-fatal failure
    Warn { kind: FailureKind, message: String },
}

fn failed(stage: Stage, kind: FailureKind, error: String) -> (State, Vec<Action>) {
    (State::Failed { stage, kind, error }, vec![])
}

/// Pure state transition function
///
/// # Invalid Transitions
/// Any invalid transition results in `Failed` with `FailureKind::Internal`.
/// This function never panics.
pub fn transition(state: State, event: Event) -> (State, Vec<Action>) {
    match (state, event) {
        // From Received
        (State::Received, Event::Start { round: 0 }) => failed(
            Stage::Received,
            FailureKind::Internal,
            "round must be at least 1".to_string(),
        ),
        (State::Received, Event::Start { round: 1 }) => (
            State::Generating {
                awaiting_prior: false,
            },
            vec![Action::Generate { prior: None }],
        ),
        (State::Received, Event::Start { .. }) => (
            State::Generating {
                awaiting_prior: true,
            },
            vec![Action::FetchPriorArtifact],
        ),

        // Revision: prior artifact lookup
        (
            State::Generating {
                awaiting_prior: true,
            },
            Event::PriorArtifactLoaded { html },
        ) => (
            State::Generating {
                awaiting_prior: false,
            },
            vec![Action::Generate { prior: Some(html) }],
        ),
        (
            State::Generating {
                awaiting_prior: true,
            },
            Event::PriorArtifactMissing { reason },
        ) => failed(
            Stage::Generating,
            FailureKind::RevisionTargetMissing,
            reason,
        ),

        // From Generating
        (
            State::Generating {
                awaiting_prior: false,
            },
            Event::Generated { artifact },
        ) => (State::Publishing, vec![Action::Publish { artifact }]),

        // From Publishing
        (State::Publishing, Event::Published { site }) => (
            State::Enabling { site },
            vec![Action::EnablePages],
        ),

        // From Enabling: proceeds regardless of outcome
        (State::Enabling { site }, Event::PagesChecked { enabled }) => {
            let mut actions = Vec::new();
            if !enabled {
                actions.push(Action::Warn {
                    kind: FailureKind::PublicationEnable,
                    message: format!("publication could not be enabled for {}", site.repo_url),
                });
            }
            actions.push(Action::Verify {
                pages_url: site.pages_url.clone(),
            });
            (State::Verifying { site }, actions)
        }

        // From Verifying: proceeds regardless of outcome
        (State::Verifying { site }, Event::Verified { verified }) => {
            let mut actions = Vec::new();
            if !verified {
                actions.push(Action::Warn {
                    kind: FailureKind::VerificationTimeout,
                    message: format!("{} did not respond before the timeout", site.pages_url),
                });
            }
            let result = DeploymentResult {
                repo_url: site.repo_url,
                commit_sha: site.commit_sha,
                pages_url: site.pages_url,
                verified,
            };
            actions.push(Action::Notify {
                result: result.clone(),
            });
            (State::Notifying { result }, actions)
        }

        // From Notifying: a lost callback never fails a published job
        (State::Notifying { result }, Event::Notified { delivered }) => {
            let actions = if delivered {
                vec![]
            } else {
                vec![Action::Warn {
                    kind: FailureKind::Notification,
                    message: "callback was not delivered after all retries".to_string(),
                }]
            };
            (
                State::Done {
                    result,
                    notified: delivered,
                },
                actions,
            )
        }

        // Fatal errors from any non-terminal state
        (state, Event::Error { kind, message }) if !state.is_terminal() => {
            failed(state.stage(), kind, message)
        }

        // Terminal states - no valid transitions
        (State::Done { .. }, event) => failed(
            Stage::Done,
            FailureKind::Internal,
            format!("Invalid transition from Done on event: {:?}", event),
        ),
        (State::Failed { stage, error, .. }, event) => failed(
            stage,
            FailureKind::Internal,
            format!(
                "Invalid transition from Failed state (error: {}) on event: {:?}",
                error, event
            ),
        ),

        // All other invalid transitions
        (state, event) => failed(
            state.stage(),
            FailureKind::Internal,
            format!(
                "Invalid state transition: {:?} cannot handle event {:?}",
                state.stage(),
                event
            ),
        ),
    }
}
