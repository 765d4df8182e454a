pub mod forex_client;
pub mod rest_client;

pub use forex_client::ForexRateClient;
pub use rest_client::{RestClient, RetryPolicy};
