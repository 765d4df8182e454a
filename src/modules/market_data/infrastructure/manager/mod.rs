pub mod api_manager;

pub use api_manager::{ApiStatistics, SmartApiManager};
