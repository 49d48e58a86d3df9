//! Result notification with bounded retry

use async_trait::async_trait;
use kiln_core::fail_open::{fail_open, retry_with_policy};
use kiln_core::{
    Clock, FailureKind, KilnError, NotificationPayload, NotifyConfig, Result, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Delivery of one callback POST
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    /// POST the payload as JSON; any non-2xx status is an error
    async fn post(&self, url: &str, payload: &NotificationPayload) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpCallback {
    http: reqwest::Client,
}

impl HttpCallback {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| KilnError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl CallbackTransport for HttpCallback {
    async fn post(&self, url: &str, payload: &NotificationPayload) -> Result<()> {
        self.http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| KilnError::Notification(e.to_string()))?
            .error_for_status()
            .map_err(|e| KilnError::Notification(e.to_string()))?;
        Ok(())
    }
}

/// Reports job results to the caller's callback URL
pub struct ResultNotifier {
    transport: Arc<dyn CallbackTransport>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ResultNotifier {
    pub fn new(
        transport: Arc<dyn CallbackTransport>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            policy,
            clock,
        }
    }

    /// POST `payload` to `url` under the retry policy
    ///
    /// Returns `false` after the last attempt fails; never errors.
    pub async fn notify(&self, url: &str, payload: &NotificationPayload) -> bool {
        let transport = self.transport.as_ref();
        let delivered = fail_open(
            FailureKind::Notification,
            "notify callback",
            retry_with_policy(
                "notify callback",
                &self.policy,
                self.clock.as_ref(),
                |attempt| async move {
                    transport.post(url, payload).await?;
                    Ok(attempt)
                },
            ),
        )
        .await;

        match delivered {
            Some(attempt) => {
                info!("Notified {} on attempt {}", url, attempt);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::ManualClock;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakyTransport {
        failures_before_success: Option<usize>,
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl CallbackTransport for FlakyTransport {
        async fn post(&self, _url: &str, _payload: &NotificationPayload) -> Result<()> {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            match self.failures_before_success {
                Some(n) if *attempts > n => Ok(()),
                _ => Err(KilnError::Notification("HTTP 500".to_string())),
            }
        }
    }

    fn payload() -> NotificationPayload {
        NotificationPayload {
            email: "student@example.com".to_string(),
            task: "timer".to_string(),
            round: 1,
            nonce: "n-1".to_string(),
            repo_url: "https://github.com/octo/timer".to_string(),
            commit_sha: "abc".to_string(),
            pages_url: "https://octo.github.io/timer/".to_string(),
        }
    }

    #[tokio::test]
    async fn test_always_failing_endpoint_gets_four_attempts() {
        let transport = Arc::new(FlakyTransport::default());
        let clock = Arc::new(ManualClock::new());
        let notifier =
            ResultNotifier::new(transport.clone(), RetryPolicy::notification(), clock.clone());

        assert!(!notifier.notify("https://eval.example.com/cb", &payload()).await);
        assert_eq!(*transport.attempts.lock().unwrap(), 4);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test]
    async fn test_delivered_after_retry() {
        let transport = Arc::new(FlakyTransport {
            failures_before_success: Some(1),
            ..Default::default()
        });
        let clock = Arc::new(ManualClock::new());
        let notifier =
            ResultNotifier::new(transport.clone(), RetryPolicy::notification(), clock.clone());

        assert!(notifier.notify("https://eval.example.com/cb", &payload()).await);
        assert_eq!(*transport.attempts.lock().unwrap(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_sleep() {
        let transport = Arc::new(FlakyTransport {
            failures_before_success: Some(0),
            ..Default::default()
        });
        let clock = Arc::new(ManualClock::new());
        let notifier = ResultNotifier::new(transport, RetryPolicy::notification(), clock.clone());

        assert!(notifier.notify("https://eval.example.com/cb", &payload()).await);
        assert!(clock.sleeps().is_empty());
    }
}
