pub mod tracker;

pub use tracker::RateLimitTracker;
