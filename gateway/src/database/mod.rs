//! Storage layer: `Store` trait plus SQLite and in-memory backends
//! (grounded on the teacher's `database` module and its `sqlx::migrate!`
//! bootstrap in `database::mod`).

pub mod memory;
pub mod sqlite;
pub mod store;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use store::{SessionMutator, Store};
