use async_trait::async_trait;

use crate::modules::market_data::domain::{DataCategory, ProviderKind};
use crate::shared::errors::AppResult;

/// A client that can fetch one numeric data point from its provider.
///
/// Implementations talk to exactly one external service; the consensus path
/// fans out across several of these, each call rate-gated and cache-aware.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProviderClient: Send + Sync {
    /// The provider this client handles.
    fn provider_kind(&self) -> ProviderKind;

    /// Fetch the current value for a symbol in the given category.
    async fn fetch_value(&self, category: DataCategory, symbol: &str) -> AppResult<f64>;
}
