//! Waiting for asynchronously created remote objects

use crate::error::{EngineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use vdcflow_cloud::STATUS_DEPLOYED;
use vdcflow_config::PollSettings;

/// Fixed-interval poll of a remote status until it reads `DEPLOYED`
///
/// The status is sampled immediately and then once per interval. The last
/// sample is taken when the budget is used up, so a status that never
/// converges fails after exactly `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentPoller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for DeploymentPoller {
    fn default() -> Self {
        Self::from(&PollSettings::default())
    }
}

impl From<&PollSettings> for DeploymentPoller {
    fn from(settings: &PollSettings) -> Self {
        Self {
            interval: settings.interval(),
            timeout: settings.timeout(),
        }
    }
}

impl DeploymentPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Poll `status` until it reports deployed
    ///
    /// Errors returned by `status` end the wait immediately.
    pub async fn wait_until_deployed<F, Fut>(&self, label: &str, mut status: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let started = Instant::now();
        loop {
            let current = status().await?;
            if current == STATUS_DEPLOYED {
                tracing::debug!(
                    resource = label,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Deployment finished"
                );
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return Err(EngineError::Timeout(format!("{} not yet deployed", label)));
            }

            tracing::debug!(resource = label, status = %current, "Waiting for deployment");
            sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }
}
