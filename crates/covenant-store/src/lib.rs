//! Storage adapters: SQLite (documents, clauses, feedback), LanceDB
//! (embedding index), and the filesystem artifact store.

mod error;
pub use error::StoreError;

mod fs;
pub use fs::FsArtifactStore;

mod sqlite;
pub use sqlite::SqliteRepository;

#[cfg(feature = "lancedb")]
mod lance;
#[cfg(feature = "lancedb")]
pub use lance::LanceIndex;
