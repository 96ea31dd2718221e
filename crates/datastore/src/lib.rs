mod memory;
mod sqlite;
mod store;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{DataAccess, JsonStore, StateStore};
