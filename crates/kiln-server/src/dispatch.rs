//! Hand-off from the accept path to background execution

use kiln_core::{BuildJob, JobId};
use kiln_orchestrator::{spawn_job, Orchestrator};
use std::sync::Arc;
use tracing::debug;

/// Accepts validated jobs for asynchronous execution
pub trait JobSink: Send + Sync {
    /// Must return immediately; the job runs elsewhere
    fn submit(&self, job_id: JobId, job: BuildJob);
}

/// Runs each job as its own tokio task, unbounded
pub struct SpawningSink {
    orchestrator: Arc<Orchestrator>,
}

impl SpawningSink {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl JobSink for SpawningSink {
    fn submit(&self, job_id: JobId, job: BuildJob) {
        debug!("Spawning job {}", job_id);
        // Detached: the outcome is logged by the job itself
        drop(spawn_job(Arc::clone(&self.orchestrator), job_id, job));
    }
}
