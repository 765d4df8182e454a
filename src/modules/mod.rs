pub mod consensus;
pub mod market_data;
