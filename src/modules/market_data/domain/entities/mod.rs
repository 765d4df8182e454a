pub mod provider_config;

pub use provider_config::{FeedSettings, ProviderConfig, WindowKind, WindowLimit};
