//! End-to-end pipeline scenarios against in-memory collaborators

use async_trait::async_trait;
use base64::Engine as _;
use kiln_agent::TextGenerator;
use kiln_core::{
    Attachment, BuildJob, FailureKind, JobId, KilnError, ManualClock, NotificationPayload, Result,
    ServiceConfig,
};
use kiln_hosting::{InMemoryHost, PagesBehavior};
use kiln_orchestrator::{
    spawn_job, CallbackTransport, Collaborators, JobOutcome, JobStatus, Orchestrator, Probe,
    Stage,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PAGE: &str = "<!DOCTYPE html><html><body>timer</body></html>";

enum Reply {
    Html(String),
    Fail,
    Panic,
}

struct FakeModel {
    reply: Reply,
    prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn html(html: &str) -> Self {
        Self::new(Reply::Html(format!("```html\n{}\n```", html)))
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Reply::Html(html) => Ok(html.clone()),
            Reply::Fail => Err(KilnError::Generation("timed out after 120s".to_string())),
            Reply::Panic => panic!("model client exploded"),
        }
    }
}

struct FixedProbe(u16);

#[async_trait]
impl Probe for FixedProbe {
    async fn status(&self, _url: &str) -> Result<u16> {
        Ok(self.0)
    }
}

#[derive(Default)]
struct RecordingCallback {
    down: bool,
    attempts: Mutex<usize>,
    delivered: Mutex<Vec<(String, NotificationPayload)>>,
}

#[async_trait]
impl CallbackTransport for RecordingCallback {
    async fn post(&self, url: &str, payload: &NotificationPayload) -> Result<()> {
        *self.attempts.lock().unwrap() += 1;
        if self.down {
            return Err(KilnError::Notification("503 Service Unavailable".to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(())
    }
}

struct Harness {
    host: Arc<InMemoryHost>,
    model: Arc<FakeModel>,
    callback: Arc<RecordingCallback>,
    clock: Arc<ManualClock>,
    orchestrator: Arc<Orchestrator>,
}

impl Harness {
    fn new(host: InMemoryHost, model: FakeModel) -> Self {
        Self::build(host, model, 200, RecordingCallback::default(), 1024)
    }

    fn build(
        host: InMemoryHost,
        model: FakeModel,
        probe_status: u16,
        callback: RecordingCallback,
        max_attachment_bytes: usize,
    ) -> Self {
        let mut config = ServiceConfig::default();
        config.deployment.verify_timeout_secs = 15;
        config.attachments.max_bytes = max_attachment_bytes;

        let host = Arc::new(host);
        let model = Arc::new(model);
        let callback = Arc::new(callback);
        let clock = Arc::new(ManualClock::new());

        let orchestrator = Orchestrator::new(
            Arc::new(config),
            Collaborators {
                host: host.clone(),
                generator: model.clone(),
                probe: Arc::new(FixedProbe(probe_status)),
                callback: callback.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            host,
            model,
            callback,
            clock,
            orchestrator: Arc::new(orchestrator),
        }
    }

    async fn run(&self, job: BuildJob) -> JobOutcome {
        self.orchestrator.run(JobId::new(), job).await
    }

    fn delivered(&self) -> Vec<(String, NotificationPayload)> {
        self.callback.delivered.lock().unwrap().clone()
    }
}

fn job(round: u32, brief: &str) -> BuildJob {
    BuildJob {
        email: "student@example.com".to_string(),
        secret: "s3cret".to_string(),
        project: "countdown-timer".to_string(),
        round,
        nonce: "nonce-42".to_string(),
        brief: brief.to_string(),
        callback_url: "https://eval.example.com/notify".to_string(),
        attachments: None,
        checks: None,
    }
}

fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[tokio::test]
async fn test_round_one_creates_publishes_and_notifies() {
    let h = Harness::new(InMemoryHost::new("octo"), FakeModel::html(PAGE));

    let outcome = h.run(job(1, "a countdown timer")).await;

    assert!(outcome.is_success(), "{:?}", outcome);
    assert!(outcome.warnings.is_empty());
    assert!(h.host.has_repository("countdown-timer"));
    assert_eq!(h.host.file_text("countdown-timer", "index.html").unwrap(), PAGE);
    assert!(h
        .host
        .file_text("countdown-timer", "README.md")
        .unwrap()
        .contains("a countdown timer"));
    assert!(h
        .host
        .file_text("countdown-timer", "LICENSE")
        .unwrap()
        .starts_with("MIT License"));
    assert!(h.host.pages_enabled("countdown-timer"));

    let delivered = h.delivered();
    assert_eq!(delivered.len(), 1);
    let (url, payload) = &delivered[0];
    assert_eq!(url, "https://eval.example.com/notify");
    assert_eq!(payload.pages_url, "https://octo.github.io/countdown-timer/");
    assert_eq!(payload.commit_sha, h.host.head("countdown-timer").unwrap());
    assert_eq!(payload.task, "countdown-timer");
    assert_eq!(payload.nonce, "nonce-42");
    assert_eq!(payload.round, 1);

    let prompts = h.model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("create a new, self-contained"));
}

#[tokio::test]
async fn test_round_two_revises_existing_project() {
    let old_readme = "# Countdown Timer\n\nround one";
    let host = InMemoryHost::new("octo").with_repository(
        "countdown-timer",
        &[("index.html", "<p>v1</p>"), ("README.md", old_readme)],
    );
    let old_head = host.head("countdown-timer").unwrap();
    let h = Harness::new(host, FakeModel::html("<p>v2</p>"));

    let outcome = h.run(job(2, "add a reset button")).await;

    assert!(outcome.is_success(), "{:?}", outcome);
    let prompts = h.model.prompts();
    assert!(prompts[0].contains("<p>v1</p>"));
    assert!(prompts[0].contains("modify an existing HTML file"));

    assert_eq!(h.host.file_text("countdown-timer", "index.html").unwrap(), "<p>v2</p>");
    let readme = h.host.file_text("countdown-timer", "README.md").unwrap();
    assert!(readme.starts_with(old_readme));
    assert!(readme.contains("### Round 2 Update ("));
    assert!(readme.ends_with("> add a reset button"));

    let messages: Vec<_> = h.host.writes().into_iter().map(|w| w.message).collect();
    assert_eq!(
        messages,
        vec!["Update webpage for Round 2", "Update README for Round 2"]
    );
    assert!(h.host.file("countdown-timer", "LICENSE").is_none());

    let new_head = h.host.head("countdown-timer").unwrap();
    assert_ne!(new_head, old_head);
    assert_eq!(h.delivered()[0].1.commit_sha, new_head);
}

#[tokio::test]
async fn test_revision_of_missing_project_fails_before_generation() {
    let h = Harness::new(InMemoryHost::new("octo"), FakeModel::html(PAGE));

    let outcome = h.run(job(2, "add dark mode")).await;

    assert_eq!(
        outcome.failure_kind(),
        Some(FailureKind::RevisionTargetMissing)
    );
    assert!(h.model.prompts().is_empty());
    assert_eq!(h.host.write_count(), 0);
    assert_eq!(h.host.create_repository_calls(), 0);
    assert!(h.delivered().is_empty());
}

#[tokio::test]
async fn test_revision_without_page_is_missing_target() {
    let host = InMemoryHost::new("octo").with_repository("countdown-timer", &[("README.md", "x")]);
    let h = Harness::new(host, FakeModel::html(PAGE));

    let outcome = h.run(job(3, "tweak")).await;

    assert_eq!(
        outcome.failure_kind(),
        Some(FailureKind::RevisionTargetMissing)
    );
    assert!(h.model.prompts().is_empty());
}

#[tokio::test]
async fn test_oversized_attachment_is_skipped_not_committed() {
    let h = Harness::build(
        InMemoryHost::new("octo"),
        FakeModel::html(PAGE),
        200,
        RecordingCallback::default(),
        1024,
    );
    let mut job = job(1, "a photo gallery");
    job.attachments = Some(vec![
        Attachment {
            name: "photo.jpg".to_string(),
            data_uri: data_uri("image/jpeg", &vec![0xAB; 4096]),
        },
        Attachment {
            name: "logo.png".to_string(),
            data_uri: data_uri("image/png", &[0x89, b'P', b'N', b'G']),
        },
    ]);

    let outcome = h.run(job).await;

    assert!(outcome.is_success(), "{:?}", outcome);
    assert!(h.host.file("countdown-timer", "photo.jpg.b64").is_none());
    assert_eq!(
        h.host.file_text("countdown-timer", "logo.png.b64").unwrap(),
        "iVBORw=="
    );

    let prompt = &h.model.prompts()[0];
    assert!(prompt.contains("`photo.jpg` (skipped"));
    assert!(prompt.contains("not embedded"));
    assert!(!prompt.contains("photo.jpg.b64"));
    assert!(prompt.contains("logo.png.b64"));
}

#[tokio::test]
async fn test_generation_failure_is_fatal_and_touches_nothing() {
    let h = Harness::new(InMemoryHost::new("octo"), FakeModel::new(Reply::Fail));

    let outcome = h.run(job(1, "a countdown timer")).await;

    match &outcome.status {
        JobStatus::Failed { stage, kind, .. } => {
            assert_eq!(*stage, Stage::Generating);
            assert_eq!(*kind, FailureKind::Generation);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!h.host.has_repository("countdown-timer"));
    assert!(h.delivered().is_empty());
}

#[tokio::test]
async fn test_write_failure_is_publish_failure() {
    let host = InMemoryHost::new("octo").with_failing_path("README.md");
    let h = Harness::new(host, FakeModel::html(PAGE));

    let outcome = h.run(job(1, "a countdown timer")).await;

    match &outcome.status {
        JobStatus::Failed { stage, kind, .. } => {
            assert_eq!(*stage, Stage::Publishing);
            assert_eq!(*kind, FailureKind::Publish);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    // No rollback of files already written
    assert_eq!(h.host.file_text("countdown-timer", "index.html").unwrap(), PAGE);
    assert!(h.host.pages_requests().is_empty());
    assert!(h.delivered().is_empty());
}

#[tokio::test]
async fn test_network_failure_while_publishing_is_publish_failure() {
    let host = InMemoryHost::new("octo").with_transport_failures();
    let h = Harness::new(host, FakeModel::html(PAGE));

    let outcome = h.run(job(1, "a countdown timer")).await;

    match &outcome.status {
        JobStatus::Failed { stage, kind, error } => {
            assert_eq!(*stage, Stage::Publishing);
            assert_eq!(*kind, FailureKind::Publish);
            assert!(error.contains("connection reset"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(h.host.write_count(), 0);
    assert!(h.delivered().is_empty());
}

#[tokio::test]
async fn test_best_effort_failures_do_not_fail_the_job() {
    let h = Harness::build(
        InMemoryHost::new("octo").with_pages_behavior(PagesBehavior::Reject),
        FakeModel::html(PAGE),
        404,
        RecordingCallback {
            down: true,
            ..Default::default()
        },
        1024,
    );

    let outcome = h.run(job(1, "a countdown timer")).await;

    match &outcome.status {
        JobStatus::Done { result, notified } => {
            assert!(!result.verified);
            assert!(!notified);
            assert_eq!(result.pages_url, "https://octo.github.io/countdown-timer/");
        }
        other => panic!("expected done, got {:?}", other),
    }
    assert_eq!(
        outcome.warnings,
        vec![
            FailureKind::PublicationEnable,
            FailureKind::VerificationTimeout,
            FailureKind::Notification
        ]
    );
    assert_eq!(*h.callback.attempts.lock().unwrap(), 4);
    assert_eq!(h.host.pages_requests(), vec!["create", "configure"]);

    // 15s verification window at 5s polls, then 1+2+4s of notification backoff
    assert_eq!(h.clock.elapsed(), Duration::from_secs(15 + 7));
}

#[tokio::test]
async fn test_pages_fallback_and_already_configured_count_as_enabled() {
    for behavior in [PagesBehavior::FallbackOnly, PagesBehavior::AlreadyConfigured] {
        let h = Harness::new(
            InMemoryHost::new("octo").with_pages_behavior(behavior),
            FakeModel::html(PAGE),
        );
        let outcome = h.run(job(1, "a countdown timer")).await;
        assert!(outcome.is_success());
        assert!(outcome.warnings.is_empty(), "{:?}", behavior);
    }
}

#[tokio::test]
async fn test_resubmitted_round_one_reuses_repository_without_new_commits() {
    let h = Harness::new(InMemoryHost::new("octo"), FakeModel::html(PAGE));

    assert!(h.run(job(1, "a countdown timer")).await.is_success());
    let writes = h.host.write_count();
    let head = h.host.head("countdown-timer");

    let outcome = h.run(job(1, "a countdown timer")).await;

    assert!(outcome.is_success(), "{:?}", outcome);
    assert_eq!(h.host.create_repository_calls(), 2);
    assert_eq!(h.host.write_count(), writes);
    assert_eq!(h.host.head("countdown-timer"), head);
}

#[tokio::test]
async fn test_panic_inside_job_is_contained() {
    let h = Harness::new(InMemoryHost::new("octo"), FakeModel::new(Reply::Panic));

    let outcome = spawn_job(h.orchestrator.clone(), JobId::new(), job(1, "boom"))
        .await
        .expect("job task completes");

    match &outcome.status {
        JobStatus::Failed { stage, kind, error } => {
            assert_eq!(*stage, Stage::Generating);
            assert_eq!(*kind, FailureKind::Internal);
            assert!(error.contains("model client exploded"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_jobs_run_independently() {
    let h = Harness::new(InMemoryHost::new("octo"), FakeModel::html(PAGE));

    let mut first = job(1, "first");
    first.project = "alpha".to_string();
    let mut second = job(1, "second");
    second.project = "beta".to_string();

    let a = spawn_job(h.orchestrator.clone(), JobId::new(), first);
    let b = spawn_job(h.orchestrator.clone(), JobId::new(), second);
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert!(a.is_success() && b.is_success());
    assert!(h.host.has_repository("alpha"));
    assert!(h.host.has_repository("beta"));
    assert_eq!(h.delivered().len(), 2);
}
