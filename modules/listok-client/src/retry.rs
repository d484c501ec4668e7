use std::time::{Duration, Instant};

use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{CrmError, Result};
use crate::transport::{ApiRequest, HttpTransport, RawResponse};

/// Max attempts against a rate-limited (429) endpoint, counting the first call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// First 429 backoff. Doubles per attempt: 1s, 2s, 4s.
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
/// Upper bound of the random jitter added to each 429 backoff.
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);
/// Flat pause before the single retry after a network-level failure.
const DEFAULT_NETWORK_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_jitter: Duration,
    pub network_retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_jitter: DEFAULT_MAX_JITTER,
            network_retry_delay: DEFAULT_NETWORK_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Same retry counts, no sleeping. For tests and replay.
    pub fn without_delays(mut self) -> Self {
        self.base_backoff = Duration::ZERO;
        self.max_jitter = Duration::ZERO;
        self.network_retry_delay = Duration::ZERO;
        self
    }

    /// Backoff after the `attempt`-th rate-limited call (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_backoff.saturating_mul(2u32.saturating_pow(attempt));
        exponential + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }
}

/// Issues one logical request, absorbing rate limits and a single network blip.
///
/// - 2xx: returned as-is.
/// - 429: retried with exponential backoff until `max_attempts` calls were made,
///   then `RateLimitExceeded`.
/// - 404: `NotFound` right away.
/// - any other status: `Upstream` right away.
/// - no response at all: one retry after a flat delay, then `Transient`.
pub struct RetryingClient<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: HttpTransport> RetryingClient<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn call(&self, request: &ApiRequest) -> Result<RawResponse> {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut rate_limited = 0u32;
        let mut network_retried = false;

        loop {
            let resp = match self.transport.execute(request).await {
                Ok(resp) => resp,
                Err(e) if network_retried => {
                    return Err(CrmError::Transient(e.to_string()));
                }
                Err(e) => {
                    network_retried = true;
                    let delay = self.policy.network_retry_delay;
                    warn!(
                        url = request.url.as_str(),
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Network failure, retrying once"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            match resp.status {
                200..=299 => {
                    debug!(
                        url = request.url.as_str(),
                        status = resp.status,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Request succeeded"
                    );
                    return Ok(resp);
                }
                429 => {
                    rate_limited += 1;
                    if rate_limited >= max_attempts {
                        warn!(
                            url = request.url.as_str(),
                            attempts = rate_limited,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Rate limit persisted through every attempt"
                        );
                        return Err(CrmError::RateLimitExceeded {
                            attempts: rate_limited,
                        });
                    }
                    let backoff = self.policy.backoff(rate_limited - 1);
                    warn!(
                        url = request.url.as_str(),
                        attempt = rate_limited,
                        backoff_ms = backoff.as_millis() as u64,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "429 rate limit hit, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                404 => {
                    return Err(CrmError::NotFound {
                        url: request.url.clone(),
                    });
                }
                status => {
                    return Err(CrmError::Upstream {
                        status,
                        body: resp.body,
                    });
                }
            }
        }
    }

    /// `call` followed by JSON decoding of the body.
    pub async fn call_json<R: DeserializeOwned>(&self, request: &ApiRequest) -> Result<R> {
        let resp = self.call(request).await?;
        Ok(serde_json::from_str(&resp.body)?)
    }
}
