pub mod service;

pub use service::MarketDataService;
