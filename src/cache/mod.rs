pub mod key;
pub mod store;

pub use store::{CacheKind, CacheStats, CacheStore};
