//! Paced HTTP client with retry logic shared by all provider clients.
//!
//! Window budgets are the tracker's job; this client only smooths sub-window
//! bursts against a single provider and absorbs transient 429/5xx answers
//! with a bounded backoff.

use governor::{Quota, RateLimiter as GovernorRateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::sleep;

use crate::shared::errors::{AppError, AppResult};

type DirectRateLimiter = GovernorRateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
    governor::middleware::NoOpMiddleware,
>;

/// Configuration for HTTP retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt; a server-provided Retry-After wins.
    pub fn calculate_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(server_delay) = retry_after {
            return server_delay.min(self.max_delay);
        }
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis((self.base_delay.as_millis() as f64 * multiplier) as u64);
        delay.min(self.max_delay)
    }
}

pub struct RestClient {
    client: reqwest::Client,
    pacer: DirectRateLimiter,
    retry_policy: RetryPolicy,
    provider_name: String,
}

impl RestClient {
    pub fn new(provider_name: &str, requests_per_second: f64, burst: u32) -> Self {
        Self::with_policy(
            provider_name,
            requests_per_second,
            burst,
            RetryPolicy::default(),
        )
    }

    pub fn with_policy(
        provider_name: &str,
        requests_per_second: f64,
        burst: u32,
        retry_policy: RetryPolicy,
    ) -> Self {
        let period = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::MAX
        };
        let burst = NonZeroU32::new(burst.max(1)).unwrap();
        let quota = Quota::with_period(period).unwrap().allow_burst(burst);

        Self {
            client: reqwest::Client::new(),
            pacer: GovernorRateLimiter::direct(quota),
            retry_policy,
            provider_name: provider_name.to_string(),
        }
    }

    /// GET a JSON document, pacing the request and retrying transient
    /// failures (429, 5xx, transport errors) with bounded backoff.
    pub async fn get_json(&self, url: &str) -> AppResult<Value> {
        let mut last_error: Option<AppError> = None;

        for attempt in 0..=self.retry_policy.max_retries {
            self.pacer.until_ready().await;

            let response = match self
                .client
                .get(url)
                .header("Accept", "application/json")
                .timeout(Duration::from_secs(10))
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    let err: AppError = e.into();
                    if retryable && attempt < self.retry_policy.max_retries {
                        let delay = self.retry_policy.calculate_delay(attempt, None);
                        log::warn!(
                            "{} request failed (attempt {}/{}): {}. Retrying in {:?}",
                            self.provider_name,
                            attempt + 1,
                            self.retry_policy.max_retries + 1,
                            err,
                            delay
                        );
                        last_error = Some(err);
                        sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();

            if status.as_u16() == 429 {
                let retry_after = retry_after_header(response.headers());
                if attempt < self.retry_policy.max_retries {
                    let delay = self.retry_policy.calculate_delay(attempt, retry_after);
                    log::warn!(
                        "{} rate limited (attempt {}/{}). Waiting {:?} before retry",
                        self.provider_name,
                        attempt + 1,
                        self.retry_policy.max_retries + 1,
                        delay
                    );
                    sleep(delay).await;
                    continue;
                }
                return Err(AppError::ProviderUnavailable(format!(
                    "{} rate limit exceeded after {} attempts",
                    self.provider_name,
                    self.retry_policy.max_retries + 1
                )));
            }

            if status.is_server_error() && attempt < self.retry_policy.max_retries {
                let delay = self.retry_policy.calculate_delay(attempt, None);
                log::warn!(
                    "{} returned {} (attempt {}/{}). Retrying in {:?}",
                    self.provider_name,
                    status,
                    attempt + 1,
                    self.retry_policy.max_retries + 1,
                    delay
                );
                last_error = Some(AppError::ApiError(format!(
                    "{} returned {}",
                    self.provider_name, status
                )));
                sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                return Err(AppError::ApiError(format!(
                    "{} returned {}",
                    self.provider_name, status
                )));
            }

            return self.parse_response(response).await;
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::ApiError(format!(
                "{} request failed after {} attempts",
                self.provider_name,
                self.retry_policy.max_retries + 1
            ))
        }))
    }

    async fn parse_response(&self, response: reqwest::Response) -> AppResult<Value> {
        let body = response.text().await.map_err(|e| {
            AppError::SerializationError(format!(
                "failed to read {} response: {}",
                self.provider_name, e
            ))
        })?;

        serde_json::from_str(&body).map_err(|e| {
            let preview = if body.len() > 200 {
                format!("{}...", clip(&body, 200))
            } else {
                body.clone()
            };
            AppError::SerializationError(format!(
                "failed to parse {} response: {}. Body: {}",
                self.provider_name, e, preview
            ))
        })
    }

    /// Whether a request would go out immediately (for testing/debugging).
    pub fn can_request_now(&self) -> bool {
        self.pacer.check().is_ok()
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
pub(crate) fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
