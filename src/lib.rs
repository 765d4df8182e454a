//! Rate-limited, multi-source market data acquisition with cross-source
//! consensus validation.
//!
//! The stack is explicit and self-contained: build [`FeedSettings`], hand
//! them to a [`MarketDataService`], and wrap it in a [`ConsensusValidator`]
//! to get prices no single provider can fake.
//!
//! ```no_run
//! use veriquote::{ConsensusValidator, FeedSettings, MarketDataService};
//! use std::sync::Arc;
//!
//! # async fn run() -> veriquote::AppResult<()> {
//! let service = Arc::new(MarketDataService::new(FeedSettings::from_env())?);
//! let validator = ConsensusValidator::from_settings(service)?;
//! let prices = validator.validated_values(&["EURUSD", "GBPUSD"]).await;
//! # Ok(())
//! # }
//! ```

pub mod modules;
pub mod shared;

pub use modules::consensus::{consensus_from, ConsensusOutcome, ConsensusValidator, Quote};
pub use modules::market_data::application::MarketDataService;
pub use modules::market_data::domain::{
    DataCategory, FeedSettings, HealthStatus, ProviderConfig, ProviderKind, WindowKind,
    WindowLimit,
};
pub use modules::market_data::infrastructure::adapters::{fetch_cached_gated, GatePolicy};
pub use modules::market_data::infrastructure::cache::{CacheStats, ResponseCache};
pub use modules::market_data::infrastructure::manager::{ApiStatistics, SmartApiManager};
pub use modules::market_data::infrastructure::monitoring::{
    HealthMonitor, HealthMonitorConfig, HealthProbe, HttpHealthProbe,
};
pub use modules::market_data::infrastructure::rate_limit::RateLimitTracker;
pub use modules::market_data::traits::MarketDataProviderClient;
pub use shared::errors::{AppError, AppResult};

/// Install the default tracing subscriber. Safe to call more than once; only
/// the first call wins.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().try_init();
}
