pub mod artifacts;
pub mod database;
pub mod error;
pub mod idempotency;
pub mod pointers;
pub mod row_helpers;
pub mod schema;

pub use artifacts::SqliteArtifactStore;
pub use database::Database;
pub use error::StoreError;
pub use idempotency::SqliteIdempotencyCache;
pub use pointers::SqlitePointerStore;
