//! The "cache, then rate-gate, then call" adapter.
//!
//! Every outbound fetch goes through the same funnel: serve from cache when
//! the entry is fresh; otherwise hold the call against every configured
//! window budget; on admission invoke the underlying fetch, record the
//! attempt on each window, and cache the result under the category TTL.

use rand::Rng;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::modules::market_data::domain::{DataCategory, ProviderConfig};
use crate::modules::market_data::infrastructure::cache::ResponseCache;
use crate::modules::market_data::infrastructure::rate_limit::RateLimitTracker;
use crate::shared::errors::{AppError, AppResult};

/// What to do when a window budget is exhausted.
#[derive(Debug, Clone, Copy)]
pub enum GatePolicy {
    /// Fail fast with `ProviderUnavailable`; the caller falls back.
    Deny,
    /// Sleep until a slot frees up, but never longer than `max_wait`.
    Wait { max_wait: Duration },
}

/// Run one logical fetch through the cache and the rate gate.
pub async fn fetch_cached_gated<F, Fut>(
    cache: &ResponseCache,
    tracker: &RateLimitTracker,
    provider: &ProviderConfig,
    endpoint: &str,
    params: &[(&str, &str)],
    category: DataCategory,
    policy: GatePolicy,
    fetch: F,
) -> AppResult<Value>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<Value>>,
{
    if let Some(cached) = cache.cached_response(provider.kind, endpoint, params).await {
        return Ok(cached);
    }

    wait_for_budget(tracker, provider, policy).await?;

    // Record the attempt on every window before the call resolves; a failed
    // call still spent budget at the provider.
    for limit in &provider.limits {
        tracker.record_call(provider.kind, limit.window);
    }

    let payload = fetch().await?;

    cache
        .cache_response(
            provider.kind,
            endpoint,
            params,
            payload.clone(),
            category,
            None,
        )
        .await?;

    Ok(payload)
}

async fn wait_for_budget(
    tracker: &RateLimitTracker,
    provider: &ProviderConfig,
    policy: GatePolicy,
) -> AppResult<()> {
    loop {
        let blocked = provider.limits.iter().find(|limit| {
            !tracker.can_call(
                provider.kind,
                limit.window,
                limit.max_calls,
                limit.window.period(),
            )
        });

        let Some(blocked) = blocked else {
            return Ok(());
        };

        match policy {
            GatePolicy::Deny => {
                return Err(AppError::ProviderUnavailable(format!(
                    "{} exhausted its {} budget",
                    provider.kind, blocked.window
                )));
            }
            GatePolicy::Wait { max_wait } => {
                let until_slot = tracker
                    .time_until_reset(provider.kind, blocked.window, blocked.window.period())
                    .unwrap_or(Duration::from_secs(1));

                if until_slot > max_wait {
                    return Err(AppError::ProviderUnavailable(format!(
                        "{} {} budget frees in {:?}, beyond the {:?} wait cap",
                        provider.kind, blocked.window, until_slot, max_wait
                    )));
                }

                // Jitter keeps concurrent waiters from stampeding the slot.
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
                debug!(
                    provider = %provider.kind,
                    window = %blocked.window,
                    wait = ?until_slot,
                    "budget exhausted, waiting for slot"
                );
                sleep(until_slot + jitter).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::market_data::domain::{ProviderKind, WindowLimit};
    use serde_json::json;

    fn provider(limits: Vec<WindowLimit>) -> ProviderConfig {
        ProviderConfig::new(ProviderKind::ExchangeRate, DataCategory::Price, limits, 1)
    }

    #[tokio::test]
    async fn cache_hit_skips_gate_and_fetch() {
        let cache = ResponseCache::in_memory(16);
        let tracker = RateLimitTracker::new();
        // Zero budget: any attempt to pass the gate would be denied.
        let provider = provider(vec![WindowLimit::per_minute(0)]);

        cache
            .cache_response(
                provider.kind,
                "rate",
                &[("symbol", "EURUSD")],
                json!(1.1001),
                DataCategory::Price,
                None,
            )
            .await
            .unwrap();

        let result = fetch_cached_gated(
            &cache,
            &tracker,
            &provider,
            "rate",
            &[("symbol", "EURUSD")],
            DataCategory::Price,
            GatePolicy::Deny,
            || async { panic!("fetch must not run on a cache hit") },
        )
        .await
        .unwrap();

        assert_eq!(result, json!(1.1001));
        assert!(tracker.usage().is_empty());
    }

    #[tokio::test]
    async fn miss_fetches_records_and_caches() {
        let cache = ResponseCache::in_memory(16);
        let tracker = RateLimitTracker::new();
        let provider = provider(vec![WindowLimit::per_minute(5)]);

        let result = fetch_cached_gated(
            &cache,
            &tracker,
            &provider,
            "rate",
            &[("symbol", "EURUSD")],
            DataCategory::Price,
            GatePolicy::Deny,
            || async { Ok(json!(1.1002)) },
        )
        .await
        .unwrap();

        assert_eq!(result, json!(1.1002));
        let usage = tracker.usage();
        assert_eq!(
            usage[&ProviderKind::ExchangeRate]
                [&crate::modules::market_data::domain::WindowKind::Minute],
            1
        );
        assert_eq!(
            cache
                .cached_response(provider.kind, "rate", &[("symbol", "EURUSD")])
                .await,
            Some(json!(1.1002))
        );
    }

    #[tokio::test]
    async fn deny_policy_fails_fast_on_exhaustion() {
        let cache = ResponseCache::in_memory(16);
        let tracker = RateLimitTracker::new();
        let provider = provider(vec![WindowLimit::per_minute(1)]);
        tracker.record_call(
            provider.kind,
            crate::modules::market_data::domain::WindowKind::Minute,
        );

        let result = fetch_cached_gated(
            &cache,
            &tracker,
            &provider,
            "rate",
            &[("symbol", "EURUSD")],
            DataCategory::Price,
            GatePolicy::Deny,
            || async { Ok(json!(0.0)) },
        )
        .await;

        assert!(matches!(result, Err(AppError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn wait_policy_gives_up_past_the_cap() {
        let cache = ResponseCache::in_memory(16);
        let tracker = RateLimitTracker::new();
        let provider = provider(vec![WindowLimit::per_minute(1)]);
        tracker.record_call(
            provider.kind,
            crate::modules::market_data::domain::WindowKind::Minute,
        );

        // The slot frees in ~60s; a 100ms cap cannot cover that.
        let result = fetch_cached_gated(
            &cache,
            &tracker,
            &provider,
            "rate",
            &[("symbol", "EURUSD")],
            DataCategory::Price,
            GatePolicy::Wait {
                max_wait: Duration::from_millis(100),
            },
            || async { Ok(json!(0.0)) },
        )
        .await;

        assert!(matches!(result, Err(AppError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn failed_fetch_still_spends_budget() {
        let cache = ResponseCache::in_memory(16);
        let tracker = RateLimitTracker::new();
        let provider = provider(vec![WindowLimit::per_minute(5)]);

        let result = fetch_cached_gated(
            &cache,
            &tracker,
            &provider,
            "rate",
            &[("symbol", "EURUSD")],
            DataCategory::Price,
            GatePolicy::Deny,
            || async { Err(AppError::ApiError("boom".to_string())) },
        )
        .await;

        assert!(result.is_err());
        let usage = tracker.usage();
        assert_eq!(
            usage[&ProviderKind::ExchangeRate]
                [&crate::modules::market_data::domain::WindowKind::Minute],
            1
        );
        // Nothing cached for a failed call.
        assert!(cache
            .cached_response(provider.kind, "rate", &[("symbol", "EURUSD")])
            .await
            .is_none());
    }
}
