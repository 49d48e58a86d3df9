//! Job runner: drives the state machine against real or fake collaborators

use futures::FutureExt;
use kiln_agent::{ChatClient, ContentGenerator, GeneratedArtifact, TextGenerator};
use kiln_core::{
    BuildJob, Clock, DeploymentResult, FailureKind, JobId, KilnError, NotificationPayload, Result,
    RetryPolicy, ServiceConfig, TokioClock,
};
use kiln_hosting::{
    ensure_published, ensure_repository, fetch_repository, get_text_file, publish_file,
    GithubHost, RepositoryHandle, SourceHost,
};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::notifier::{CallbackTransport, HttpCallback, ResultNotifier};
use crate::site::{plan_files, SiteContext, PAGE_PATH, README_PATH};
use crate::state_machine::{transition, Action, Event, PublishedSite, Stage, State};
use crate::verifier::{DeploymentVerifier, HttpProbe, Probe};

/// External systems a job talks to
#[derive(Clone)]
pub struct Collaborators {
    pub host: Arc<dyn SourceHost>,
    pub generator: Arc<dyn TextGenerator>,
    pub probe: Arc<dyn Probe>,
    pub callback: Arc<dyn CallbackTransport>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Real clients for GitHub, the chat completion API and plain HTTP
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            host: Arc::new(GithubHost::new(&config.hosting)?),
            generator: Arc::new(ChatClient::new(&config.llm)?),
            probe: Arc::new(HttpProbe::new(&config.deployment)?),
            callback: Arc::new(HttpCallback::new(&config.notify)?),
            clock: Arc::new(TokioClock),
        })
    }
}

/// Terminal status of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Done {
        result: DeploymentResult,
        notified: bool,
    },
    Failed {
        stage: Stage,
        kind: FailureKind,
        error: String,
    },
}

/// What happened to a job, for logs and one-shot runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub task: String,
    pub round: u32,
    #[serde(flatten)]
    pub status: JobStatus,
    /// Non-fatal failures recorded along the way
    pub warnings: Vec<FailureKind>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Done { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            JobStatus::Failed { kind, .. } => Some(*kind),
            JobStatus::Done { .. } => None,
        }
    }
}

fn error_event(e: KilnError) -> Event {
    Event::Error {
        kind: e.kind(),
        message: e.to_string(),
    }
}

/// Anything that stops the commit is a publish failure unless it already
/// names a more specific fatal kind
fn publish_failure(e: KilnError) -> KilnError {
    match e.kind() {
        FailureKind::Publish | FailureKind::RevisionTargetMissing => e,
        _ => KilnError::Publish(e.to_string()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs build jobs end to end
///
/// Within one job every step runs strictly in sequence. Separate jobs share
/// nothing but the collaborators; two jobs for the same project are not
/// serialized against each other.
pub struct Orchestrator {
    config: Arc<ServiceConfig>,
    host: Arc<dyn SourceHost>,
    generator: ContentGenerator<Arc<dyn TextGenerator>>,
    verifier: DeploymentVerifier,
    notifier: ResultNotifier,
}

impl Orchestrator {
    pub fn new(config: Arc<ServiceConfig>, parts: Collaborators) -> Self {
        let generator = ContentGenerator::new(parts.generator, config.attachments.max_bytes);
        let verifier = DeploymentVerifier::new(
            parts.probe,
            Arc::clone(&parts.clock),
            config.deployment.poll_interval(),
        );
        let notifier = ResultNotifier::new(
            parts.callback,
            RetryPolicy::from_secs(&config.notify.backoff_secs),
            parts.clock,
        );
        Self {
            config,
            host: parts.host,
            generator,
            verifier,
            notifier,
        }
    }

    /// Build an orchestrator with real collaborators
    ///
    /// Fails with `Configuration` when a credential is missing.
    pub fn from_config(config: Arc<ServiceConfig>) -> Result<Self> {
        config.ensure_ready()?;
        let parts = Collaborators::from_config(&config)?;
        Ok(Self::new(config, parts))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run one job to a terminal state
    ///
    /// Never panics: a panic inside the pipeline is caught and reported as
    /// an internal failure at the stage it reached.
    pub async fn run(&self, job_id: JobId, job: BuildJob) -> JobOutcome {
        let span = info_span!("job", job_id = %job_id, task = %job.project, round = job.round);

        async {
            info!("Starting build for '{}' round {}", job.project, job.round);
            let reached = Mutex::new(Stage::Received);

            let (state, warnings) = match AssertUnwindSafe(self.drive(&job, &reached))
                .catch_unwind()
                .await
            {
                Ok(done) => done,
                Err(payload) => {
                    let stage = *reached.lock().unwrap_or_else(|e| e.into_inner());
                    (
                        State::Failed {
                            stage,
                            kind: FailureKind::Internal,
                            error: format!("job panicked: {}", panic_message(payload.as_ref())),
                        },
                        Vec::new(),
                    )
                }
            };

            let status = match state {
                State::Done { result, notified } => {
                    info!(
                        "Build for '{}' complete: {} (verified: {}, notified: {})",
                        job.project, result.pages_url, result.verified, notified
                    );
                    JobStatus::Done { result, notified }
                }
                State::Failed { stage, kind, error } => {
                    error!(
                        stage = %stage,
                        kind = %kind,
                        "Build for '{}' round {} failed: {}",
                        job.project,
                        job.round,
                        error
                    );
                    JobStatus::Failed { stage, kind, error }
                }
                stalled => {
                    let stage = stalled.stage();
                    error!("Pipeline stalled in stage {}", stage);
                    JobStatus::Failed {
                        stage,
                        kind: FailureKind::Internal,
                        error: format!("pipeline stalled in stage {}", stage),
                    }
                }
            };

            JobOutcome {
                job_id,
                task: job.project.clone(),
                round: job.round,
                status,
                warnings,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, job: &BuildJob, reached: &Mutex<Stage>) -> (State, Vec<FailureKind>) {
        let mut warnings = Vec::new();
        let mut repo: Option<RepositoryHandle> = None;
        let (mut state, mut actions) = transition(State::Received, Event::Start { round: job.round });

        loop {
            *reached.lock().unwrap_or_else(|e| e.into_inner()) = state.stage();

            let mut next = None;
            for action in actions {
                match action {
                    Action::Warn { kind, message } => {
                        warn!(kind = %kind, "{}", message);
                        warnings.push(kind);
                    }
                    action => next = Some(self.execute(job, action, &mut repo).await),
                }
            }

            let Some(event) = next else {
                break;
            };
            (state, actions) = transition(state, event);
        }

        (state, warnings)
    }

    async fn execute(
        &self,
        job: &BuildJob,
        action: Action,
        repo: &mut Option<RepositoryHandle>,
    ) -> Event {
        match action {
            Action::FetchPriorArtifact => self.fetch_prior(job, repo).await,
            Action::Generate { prior } => match self
                .generator
                .generate(&job.brief, prior.as_deref(), job.attachments(), job.checks())
                .await
            {
                Ok(artifact) => Event::Generated { artifact },
                Err(e) => error_event(e),
            },
            Action::Publish { artifact } => match self.publish(job, &artifact, repo).await {
                Ok(site) => Event::Published { site },
                Err(e) => error_event(publish_failure(e)),
            },
            Action::EnablePages => match repo.as_ref() {
                Some(handle) => Event::PagesChecked {
                    enabled: ensure_published(self.host.as_ref(), handle).await,
                },
                None => Event::Error {
                    kind: FailureKind::Internal,
                    message: "no repository to enable pages for".to_string(),
                },
            },
            Action::Verify { pages_url } => Event::Verified {
                verified: self
                    .verifier
                    .verify(&pages_url, self.config.deployment.verify_timeout())
                    .await,
            },
            Action::Notify { result } => {
                let payload = NotificationPayload::new(job, &result);
                Event::Notified {
                    delivered: self.notifier.notify(&job.callback_url, &payload).await,
                }
            }
            Action::Warn { .. } => Event::Error {
                kind: FailureKind::Internal,
                message: "warn is not an executable action".to_string(),
            },
        }
    }

    /// Any failure to read the current page means there is nothing to revise
    async fn fetch_prior(&self, job: &BuildJob, repo: &mut Option<RepositoryHandle>) -> Event {
        let host = self.host.as_ref();
        let handle = match fetch_repository(host, &job.project).await {
            Ok(handle) => handle,
            Err(e) => {
                return Event::PriorArtifactMissing {
                    reason: e.to_string(),
                }
            }
        };

        match get_text_file(host, &handle, PAGE_PATH).await {
            Ok(Some(html)) => {
                info!("Loaded prior {} from {}", PAGE_PATH, handle.full_name());
                *repo = Some(handle);
                Event::PriorArtifactLoaded { html }
            }
            Ok(None) => Event::PriorArtifactMissing {
                reason: format!("{} has no {}", handle.full_name(), PAGE_PATH),
            },
            Err(e) => Event::PriorArtifactMissing {
                reason: format!("could not read {}: {}", PAGE_PATH, e),
            },
        }
    }

    async fn publish(
        &self,
        job: &BuildJob,
        artifact: &GeneratedArtifact,
        repo: &mut Option<RepositoryHandle>,
    ) -> Result<PublishedSite> {
        let host = self.host.as_ref();
        let handle = match repo.take() {
            Some(handle) => handle,
            None if job.is_revision() => fetch_repository(host, &job.project).await?,
            None => ensure_repository(host, &job.project).await?,
        };
        let pages_url = host.pages_url(&handle);

        let existing_readme = if job.is_revision() {
            get_text_file(host, &handle, README_PATH)
                .await
                .map_err(|e| KilnError::Publish(format!("reading {}: {}", README_PATH, e)))?
        } else {
            None
        };

        let files = plan_files(
            &SiteContext {
                round: job.round,
                repo_name: &handle.name,
                owner: &handle.owner,
                brief: &job.brief,
                pages_url: &pages_url,
                today: chrono::Utc::now().date_naive(),
                existing_readme: existing_readme.as_deref(),
            },
            artifact,
        );

        let mut written = 0;
        for file in &files {
            if publish_file(host, &handle, &file.path, &file.message, &file.content)
                .await?
                .wrote()
            {
                written += 1;
            }
        }

        let commit_sha = host.latest_commit(&handle).await?;
        info!(
            "Published {} of {} files to {} at {}",
            written,
            files.len(),
            handle.full_name(),
            commit_sha
        );

        let site = PublishedSite {
            repo_url: handle.html_url.clone(),
            commit_sha,
            pages_url,
        };
        *repo = Some(handle);
        Ok(site)
    }
}

/// Run a job as an independent background task
pub fn spawn_job(
    orchestrator: Arc<Orchestrator>,
    job_id: JobId,
    job: BuildJob,
) -> JoinHandle<JobOutcome> {
    tokio::spawn(async move { orchestrator.run(job_id, job).await })
}
