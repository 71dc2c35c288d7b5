//! Bounded exponential retry, described as data
//!
//! A [`RetryPolicy`] names its attempt budget, its backoff schedule, and
//! the API status codes that end the loop immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    /// Random extra delay, as a fraction of the scheduled one
    pub jitter: f64,
    /// API status codes that stop retrying at once
    pub stop_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    /// 4 attempts, 10ms growing 5x, 10% jitter; stops on NotFound
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(10),
            factor: 5,
            max_delay: Duration::from_secs(5),
            jitter: 0.1,
            stop_codes: vec![404],
        }
    }
}

/// How a retried operation ended
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Completed(T),
    /// Failed with one of the policy's stop codes
    Stopped(kube::Error),
    /// Every attempt failed
    Exhausted(kube::Error),
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (0-based), jitter excluded
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.factor.max(1).saturating_pow(attempt.min(16));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        delay + delay.mul_f64(extra)
    }

    pub fn is_stop(&self, err: &kube::Error) -> bool {
        matches!(err, kube::Error::Api(resp) if self.stop_codes.contains(&resp.code))
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, kube::Error>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return RetryOutcome::Completed(value),
                Err(e) if self.is_stop(&e) => return RetryOutcome::Stopped(e),
                Err(e) if attempt + 1 >= attempts => return RetryOutcome::Exhausted(e),
                Err(e) => {
                    let delay = self.jittered(self.delay_for(attempt));
                    warn!(
                        "Attempt {}/{} failed, retrying in {:?}: {}",
                        attempt + 1,
                        attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
