//! # kiln-server
//!
//! HTTP surface for Kiln. Submissions are validated and authorized
//! synchronously, then handed to a [`JobSink`] and answered with 202; the
//! pipeline outcome is only reported through the job's callback.
//!
//! - `POST /api/build` - submit a build job
//! - `GET /api/health` - liveness

mod dispatch;
mod server;

pub use dispatch::{JobSink, SpawningSink};
pub use server::{router, serve, AppState, SharedState};
