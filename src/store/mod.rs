//! Named, versioned cache stores for request/response pairs.
//!
//! A store maps request identities (method + normalized URL) to stored
//! responses. The controller keeps exactly one store current; stale versions
//! are purged at activation.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CachedEntry, StoreBackend};
