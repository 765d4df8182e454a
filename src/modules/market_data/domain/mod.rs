pub mod entities;
pub mod value_objects;

pub use entities::{FeedSettings, ProviderConfig, WindowKind, WindowLimit};
pub use value_objects::{DataCategory, HealthStatus, ProviderHealth, ProviderKind};
