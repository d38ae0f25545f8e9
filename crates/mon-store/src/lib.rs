pub mod error;
pub mod memory;
pub mod repository;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use repository::Store;
pub use sqlite::SqliteStore;
