//! Deployment verification: poll the public URL until it answers

use async_trait::async_trait;
use futures::future::{select, Either};
use kiln_core::fail_open::fail_open;
use kiln_core::{Clock, DeploymentConfig, FailureKind, KilnError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One liveness request against a URL
#[async_trait]
pub trait Probe: Send + Sync {
    /// Issue a GET and return the response status
    async fn status(&self, url: &str) -> Result<u16>;
}

/// Plain HTTP GET probe
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: reqwest::Client,
}

impl HttpProbe {
    pub fn new(config: &DeploymentConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .map_err(|e| KilnError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn status(&self, url: &str) -> Result<u16> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| KilnError::Http(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Polls a public URL at a fixed interval until success or timeout
pub struct DeploymentVerifier {
    probe: Arc<dyn Probe>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl DeploymentVerifier {
    pub fn new(probe: Arc<dyn Probe>, clock: Arc<dyn Clock>, poll_interval: Duration) -> Self {
        Self {
            probe,
            clock,
            poll_interval,
        }
    }

    /// `true` once the URL answers 2xx; `false` when `timeout` elapses first
    ///
    /// Transport errors mean "not ready yet". A request still pending at the
    /// deadline is abandoned, so this returns within `timeout` of the start.
    pub async fn verify(&self, url: &str, timeout: Duration) -> bool {
        info!(
            "Verifying deployment at {} (up to {}s)",
            url,
            timeout.as_secs()
        );
        fail_open(
            FailureKind::VerificationTimeout,
            "verify deployment",
            self.poll_until_live(url, timeout),
        )
        .await
        .is_some()
    }

    async fn poll_until_live(&self, url: &str, timeout: Duration) -> Result<()> {
        let start = self.clock.now();
        let remaining = || timeout.saturating_sub(self.clock.now().duration_since(start));
        let mut polls = 0usize;

        loop {
            let left = remaining();
            if left.is_zero() {
                break;
            }

            polls += 1;
            let answer = match select(self.probe.status(url), self.clock.sleep(left)).await {
                Either::Left((answer, _)) => answer,
                Either::Right(_) => {
                    debug!("{} still pending at the deadline", url);
                    break;
                }
            };
            match answer {
                Ok(status) if (200..300).contains(&status) => {
                    info!("Deployment verified after {} poll(s) (HTTP {})", polls, status);
                    return Ok(());
                }
                Ok(status) => debug!("{} answered {}, not ready", url, status),
                Err(e) => debug!("{} not reachable yet: {}", url, e),
            }

            let left = remaining();
            if left.is_zero() {
                break;
            }
            self.clock.sleep(self.poll_interval.min(left)).await;
        }

        Err(KilnError::VerificationTimeout(format!(
            "{} did not answer within {}s ({} polls)",
            url,
            timeout.as_secs(),
            polls
        )))
    }
}
