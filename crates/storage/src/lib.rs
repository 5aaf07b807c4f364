pub mod error;
pub mod schema;
pub mod sqlite;

pub use error::StorageError;
pub use sqlite::SqliteBackend;
