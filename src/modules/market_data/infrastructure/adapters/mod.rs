pub mod cached_fetch;

pub use cached_fetch::{fetch_cached_gated, GatePolicy};
