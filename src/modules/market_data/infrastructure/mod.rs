pub mod adapters;
pub mod cache;
pub mod http_client;
pub mod manager;
pub mod monitoring;
pub mod rate_limit;

pub use adapters::{fetch_cached_gated, GatePolicy};
pub use cache::{CacheStats, ResponseCache};
pub use http_client::{ForexRateClient, RestClient};
pub use manager::{ApiStatistics, SmartApiManager};
pub use monitoring::{HealthMonitor, HealthMonitorConfig, HealthProbe, HttpHealthProbe};
pub use rate_limit::RateLimitTracker;
