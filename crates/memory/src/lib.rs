//! Persistent fact store implementations for factlayer.

pub mod noop;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use noop::NoopFactStore;
pub use in_memory::InMemoryFactStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteFactStore;
