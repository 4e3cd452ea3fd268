//! Retry policy with exponential backoff and jitter.
//!
//! Mutating control-plane and data-plane calls go through
//! [`RetryPolicy::execute`]. Reads are sent exactly once.
//!
//! The default classification retries transport failures, `429` and `5xx`
//! (except `501`). A call site may install a [`RetryPredicate`] that is
//! consulted first; topic creation uses one to ride out the warm-up window
//! of a freshly provisioned cluster, during which the data plane answers
//! `400`.

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::transport::{dispatch, CallContext, HttpRequest, HttpResponse, HttpTransport};

/// Backoff configuration for retried calls
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based), before jitter.
    ///
    /// Never exceeds `max_delay`; nonsensical multipliers fall back to it.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let secs = (self.initial_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        self.clamp(secs)
    }

    fn clamp(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("retry max_attempts must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(format!(
                "retry backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::config(
                "retry initial_delay must not exceed max_delay",
            ));
        }
        Ok(())
    }
}

/// Extra retry predicate evaluated before the default classification.
///
/// Receives the response status, or `None` when no status line was received.
/// Returning `false` falls through to the default classification.
pub type RetryPredicate = fn(Option<u16>) -> bool;

/// Retry `400` and missing statuses while a new cluster warms up
pub fn retry_while_cluster_warms_up(status: Option<u16>) -> bool {
    matches!(status, None | Some(0) | Some(400))
}

/// Default classification: transport errors, 429 and 5xx other than 501
pub fn default_should_retry(status: Option<u16>) -> bool {
    match status {
        None | Some(0) => true,
        Some(429) => true,
        Some(501) => false,
        Some(code) => (500..600).contains(&code),
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    predicate: Option<RetryPredicate>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            predicate: None,
        }
    }

    /// Policy used by topic creation
    pub fn create_topic(config: RetryConfig) -> Self {
        Self::new(config).with_predicate(retry_while_cluster_warms_up)
    }

    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Classify a single attempt's outcome
    pub fn should_retry(&self, outcome: &Result<HttpResponse>) -> bool {
        let status = match outcome {
            Ok(response) => Some(response.status),
            Err(Error::Transport(_)) => None,
            Err(_) => return false,
        };

        if let Some(predicate) = self.predicate {
            if predicate(status) {
                return true;
            }
        }
        default_should_retry(status)
    }

    /// Send `request`, retrying retryable outcomes with backoff.
    ///
    /// Returns the first non-retryable outcome. When the attempt budget is
    /// spent the last outcome is returned as is, so callers see the final
    /// status code or transport error.
    pub async fn execute(
        &self,
        transport: &dyn HttpTransport,
        ctx: &CallContext,
        operation: &str,
        request: HttpRequest,
    ) -> Result<HttpResponse> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = dispatch(transport, ctx, request.clone()).await;

            if !self.should_retry(&outcome) {
                return outcome;
            }

            let status = outcome.as_ref().ok().map(|r| r.status);
            if attempt >= max_attempts {
                error!(
                    operation = %operation,
                    attempt = attempt,
                    status = ?status,
                    "Giving up after max retries"
                );
                return outcome;
            }

            // Jitter: 0.5x to 1.5x of the delay
            let jitter = rand::thread_rng().gen_range(0.5..1.5);
            let delay = self
                .config
                .clamp(self.config.delay_for(attempt).as_secs_f64() * jitter);

            match &outcome {
                Ok(_) => warn!(
                    operation = %operation,
                    attempt = attempt,
                    status = ?status,
                    delay_ms = delay.as_millis() as u64,
                    "Retryable status, retrying"
                ),
                Err(e) => warn!(
                    operation = %operation,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                ),
            }

            ctx.sleep(delay).await?;
        }
    }
}
