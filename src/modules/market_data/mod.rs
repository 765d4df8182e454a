pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod traits;

pub use application::MarketDataService;
pub use domain::{
    DataCategory, FeedSettings, HealthStatus, ProviderConfig, ProviderKind, WindowKind,
    WindowLimit,
};
pub use traits::MarketDataProviderClient;
