//! # kiln-orchestrator
//!
//! Build-and-deploy pipeline for Kiln.
//!
//! [`state_machine`] is the pure control flow. [`Orchestrator`] executes its
//! actions against the content generator, the source host, the deployment
//! verifier and the result notifier, one job per background task.

mod notifier;
mod orchestrator;
pub mod site;
pub mod state_machine;
mod verifier;

pub use notifier::{CallbackTransport, HttpCallback, ResultNotifier};
pub use orchestrator::{spawn_job, Collaborators, JobOutcome, JobStatus, Orchestrator};
pub use state_machine::{transition, Action, Event, PublishedSite, Stage, State};
pub use verifier::{DeploymentVerifier, HttpProbe, Probe};
