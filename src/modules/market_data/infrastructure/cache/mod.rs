pub mod response_cache;
pub mod store;

pub use response_cache::{CacheStats, ResponseCache};
pub use store::{CacheStore, FileStore, MemoryStore, StoredEntry};
