pub mod data_category;
pub mod provider_health;
pub mod provider_kind;

pub use data_category::DataCategory;
pub use provider_health::{HealthStatus, ProviderHealth, ProviderHealthMetrics};
pub use provider_kind::ProviderKind;
