use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Categories of market/economic data, each with its own cache lifetime.
///
/// The TTLs match real-world volatility and the free-tier budgets of the
/// providers behind each category, so a scheduled burst of demand is served
/// mostly from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    /// Spot prices / forex rates.
    Price,
    /// Short-horizon time series (intraday candles etc).
    Series,
    /// Economic indicators (rates, CPI, ...).
    Economic,
    /// Market sentiment readings.
    Sentiment,
    /// News headlines.
    News,
}

impl DataCategory {
    /// Default time-to-live for cached responses of this category.
    pub fn default_ttl(&self) -> Duration {
        match self {
            DataCategory::Price => Duration::from_secs(30),
            DataCategory::Series => Duration::from_secs(300),
            DataCategory::Economic => Duration::from_secs(86_400),
            DataCategory::Sentiment => Duration::from_secs(21_600),
            DataCategory::News => Duration::from_secs(3_600),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::Price => "price",
            DataCategory::Series => "series",
            DataCategory::Economic => "economic",
            DataCategory::Sentiment => "sentiment",
            DataCategory::News => "news",
        }
    }
}

impl std::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
