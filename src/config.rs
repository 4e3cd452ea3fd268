//! Provider configuration
//!
//! Credentials and endpoint are supplied by the caller; the CLI reads them
//! from flags or `CONFLUENT_*` environment variables.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::RetryConfig;

pub const DEFAULT_API_ENDPOINT: &str = "https://confluent.cloud";

#[derive(Clone)]
pub struct ProviderConfig {
    /// Control-plane base URL
    pub api_endpoint: String,
    pub email: String,
    pub password: String,
    /// Transport-level timeout applied to every HTTP exchange
    pub request_timeout: Duration,
    /// Backoff for mutating calls
    pub retry: RetryConfig,
}

impl ProviderConfig {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            email: email.into(),
            password: password.into(),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_endpoint.is_empty() {
            return Err(Error::config("api endpoint must not be empty"));
        }
        if self.email.trim().is_empty() {
            return Err(Error::config("email must not be empty"));
        }
        if self.password.is_empty() {
            return Err(Error::config("password must not be empty"));
        }
        self.retry.validate()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_endpoint", &self.api_endpoint)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}
