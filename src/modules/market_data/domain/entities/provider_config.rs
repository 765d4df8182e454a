use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::modules::market_data::domain::value_objects::{DataCategory, ProviderKind};
use crate::shared::errors::{AppError, AppResult};

/// A trailing time interval over which a call-count limit is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    pub fn period(&self) -> Duration {
        match self {
            WindowKind::Minute => Duration::from_secs(60),
            WindowKind::Hour => Duration::from_secs(3_600),
            WindowKind::Day => Duration::from_secs(86_400),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Minute => "minute",
            WindowKind::Hour => "hour",
            WindowKind::Day => "day",
        }
    }
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call budget on one window. A `max_calls` of zero always denies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowLimit {
    pub window: WindowKind,
    pub max_calls: u32,
}

impl WindowLimit {
    pub fn per_minute(max_calls: u32) -> Self {
        Self {
            window: WindowKind::Minute,
            max_calls,
        }
    }

    pub fn per_hour(max_calls: u32) -> Self {
        Self {
            window: WindowKind::Hour,
            max_calls,
        }
    }

    pub fn per_day(max_calls: u32) -> Self {
        Self {
            window: WindowKind::Day,
            max_calls,
        }
    }
}

/// Configuration for a single market data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// The data category this provider serves.
    pub category: DataCategory,
    /// Call budgets, all of which must hold for a call to be admitted.
    pub limits: Vec<WindowLimit>,
    /// Priority order within the category's fallback chain (lower = tried first).
    pub priority: u32,
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(
        kind: ProviderKind,
        category: DataCategory,
        limits: Vec<WindowLimit>,
        priority: u32,
    ) -> Self {
        Self {
            kind,
            category,
            limits,
            priority,
            enabled: true,
        }
    }
}

/// Configuration surface of the feed layer.
///
/// All knobs live here so multiple independent instances of the stack can
/// coexist (one per test, if need be) instead of a process-global registry.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub providers: Vec<ProviderConfig>,
    /// Relative tolerance around the agreement center for consensus retention.
    pub tolerance: f64,
    /// Minimum number of agreeing sources before a value is trusted.
    pub min_sources: usize,
    /// Known placeholder prices per symbol that must never count as data.
    pub sentinels: HashMap<String, Vec<f64>>,
    /// Deadline for one consensus fan-out per provider.
    pub request_timeout: Duration,
    /// How long a probe result is trusted before `status()` re-probes.
    pub probe_staleness: Duration,
    /// Directory for the persisted response cache. `None` keeps the cache
    /// in-process only.
    pub cache_dir: Option<PathBuf>,
    /// Bound on the in-process cache store.
    pub max_cache_entries: usize,
    /// Per-category TTL overrides; anything absent uses the category default.
    pub ttl_overrides: HashMap<DataCategory, Duration>,
    /// API keys by provider, usually loaded from the environment.
    pub api_keys: HashMap<ProviderKind, String>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            tolerance: 0.001,
            min_sources: 2,
            sentinels: default_sentinels(),
            request_timeout: Duration::from_secs(10),
            probe_staleness: Duration::from_secs(600),
            cache_dir: None,
            max_cache_entries: 2_000,
            ttl_overrides: HashMap::new(),
            api_keys: HashMap::new(),
        }
    }
}

impl FeedSettings {
    /// Build settings with API keys and the cache directory read from the
    /// environment (`.env` is honored).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut settings = Self::default();

        let key_vars = [
            (ProviderKind::AlphaVantage, "ALPHA_VANTAGE_API_KEY"),
            (ProviderKind::TwelveData, "TWELVE_DATA_API_KEY"),
            (ProviderKind::Fred, "FRED_API_KEY"),
            (ProviderKind::Finnhub, "FINNHUB_API_KEY"),
            (ProviderKind::NewsApi, "NEWS_API_KEY"),
            (ProviderKind::ExchangeRate, "EXCHANGERATE_API_KEY"),
            (ProviderKind::FreeCurrency, "FREECURRENCY_API_KEY"),
            (ProviderKind::CurrencyApi, "CURRENCYAPI_API_KEY"),
            (ProviderKind::Fixer, "FIXER_API_KEY"),
            (ProviderKind::ExchangeRates, "EXCHANGERATES_API_KEY"),
        ];
        for (kind, var) in key_vars {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    settings.api_keys.insert(kind, key);
                }
            }
        }

        if let Ok(dir) = std::env::var("VERIQUOTE_CACHE_DIR") {
            settings.cache_dir = Some(PathBuf::from(dir));
        }

        settings
    }

    /// The ordered fallback chain for a category: enabled providers sorted by
    /// ascending priority.
    pub fn chain(&self, category: DataCategory) -> Vec<&ProviderConfig> {
        let mut chain: Vec<&ProviderConfig> = self
            .providers
            .iter()
            .filter(|p| p.enabled && p.category == category)
            .collect();
        chain.sort_by_key(|p| p.priority);
        chain
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    pub fn ttl_for(&self, category: DataCategory) -> Duration {
        self.ttl_overrides
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_ttl())
    }

    /// True when `value` matches a known placeholder for `symbol`.
    pub fn is_sentinel(&self, symbol: &str, value: f64) -> bool {
        self.sentinels
            .get(symbol)
            .map(|banned| banned.iter().any(|b| (value - b).abs() < 1e-3))
            .unwrap_or(false)
    }

    /// Reject setups that would misbehave at runtime: duplicate provider
    /// entries or a provider with no configured window at all.
    pub fn validate(&self) -> AppResult<()> {
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.kind) {
                return Err(AppError::ConfigurationError(format!(
                    "provider {} configured more than once",
                    provider.kind
                )));
            }
            if provider.enabled && provider.limits.is_empty() {
                return Err(AppError::ConfigurationError(format!(
                    "provider {} has no rate limit windows configured",
                    provider.kind
                )));
            }
        }
        if self.min_sources == 0 {
            return Err(AppError::ConfigurationError(
                "min_sources must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(AppError::ConfigurationError(
                "tolerance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default fallback chains, mirroring the free-tier budgets of each source.
fn default_providers() -> Vec<ProviderConfig> {
    vec![
        // Price / forex rates
        ProviderConfig::new(
            ProviderKind::ExchangeRate,
            DataCategory::Price,
            vec![WindowLimit::per_day(1_500)],
            1,
        ),
        ProviderConfig::new(
            ProviderKind::FreeCurrency,
            DataCategory::Price,
            vec![WindowLimit::per_day(5_000)],
            2,
        ),
        ProviderConfig::new(
            ProviderKind::CurrencyApi,
            DataCategory::Price,
            vec![WindowLimit::per_day(300)],
            3,
        ),
        ProviderConfig::new(
            ProviderKind::Fixer,
            DataCategory::Price,
            vec![WindowLimit::per_day(100)],
            4,
        ),
        ProviderConfig::new(
            ProviderKind::ExchangeRates,
            DataCategory::Price,
            vec![WindowLimit::per_day(250)],
            5,
        ),
        // Short-horizon series
        ProviderConfig::new(
            ProviderKind::AlphaVantage,
            DataCategory::Series,
            vec![WindowLimit::per_minute(5), WindowLimit::per_day(500)],
            1,
        ),
        ProviderConfig::new(
            ProviderKind::TwelveData,
            DataCategory::Series,
            vec![WindowLimit::per_minute(8), WindowLimit::per_day(800)],
            2,
        ),
        // Economic indicators
        ProviderConfig::new(
            ProviderKind::Fred,
            DataCategory::Economic,
            vec![WindowLimit::per_minute(120)],
            1,
        ),
        // Sentiment
        ProviderConfig::new(
            ProviderKind::Finnhub,
            DataCategory::Sentiment,
            vec![WindowLimit::per_minute(60)],
            1,
        ),
        // News
        ProviderConfig::new(
            ProviderKind::NewsApi,
            DataCategory::News,
            vec![WindowLimit::per_day(100)],
            1,
        ),
    ]
}

/// Placeholder prices observed in the wild that must never pass validation,
/// no matter how plausible they look.
fn default_sentinels() -> HashMap<String, Vec<f64>> {
    let mut sentinels = HashMap::new();
    sentinels.insert("EURUSD".to_string(), vec![1.0950, 1.095, 1.09]);
    sentinels.insert("GBPUSD".to_string(), vec![1.2650]);
    sentinels.insert("USDJPY".to_string(), vec![110.0]);
    sentinels
}
