use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::EmbeddingConfig;

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;

/// Blocking HTTP agent with bounded retry and exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    retry_attempts: u32,
    base_delay: Duration,
}

impl HttpTransport {
    #[inline]
    pub fn new(timeout: Duration, retry_attempts: u32, base_delay: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            retry_attempts: retry_attempts.max(1),
            base_delay,
        }
    }

    #[inline]
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            Duration::from_secs(config.timeout_secs),
            config.retry_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    #[inline]
    pub fn get(&self, url: &Url) -> Result<String> {
        self.with_retry(url, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    #[inline]
    pub fn post_json(&self, url: &Url, body: &str, bearer: Option<&str>) -> Result<String> {
        let authorization = bearer.map(|token| format!("Bearer {token}"));
        self.with_retry(url, || {
            let mut request = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            if let Some(value) = &authorization {
                request = request.header("Authorization", value);
            }
            request
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("POST {url} failed"))
    }

    fn with_retry<F>(&self, url: &Url, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    if !is_retryable(&error) {
                        warn!("Non-retryable error: {}", error);
                        return Err(match error {
                            ureq::Error::StatusCode(status) => {
                                anyhow::anyhow!("Client error: HTTP {}", status)
                            }
                            other => anyhow::anyhow!("Non-retryable error: {}", other),
                        });
                    }

                    warn!(
                        "Request error: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = backoff_delay(self.base_delay, attempt);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Server errors, rate limiting and transport failures are worth retrying.
fn is_retryable(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500 || *status == 429,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

/// Delay before retrying after the given (1-based) failed attempt.
#[inline]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt.saturating_sub(1)))
}

/// Joins a relative API path onto a base URL, keeping any path prefix the
/// base carries (e.g. a reverse proxy mount point).
#[inline]
pub fn join_endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .with_context(|| format!("Failed to build {path} URL from {base}"))
}
