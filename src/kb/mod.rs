//! Knowledge-base side: store capabilities, backends, the write adapter and
//! the incremental synchronizer.

pub mod adapter;
pub mod memory_store;
pub mod record;
pub mod signature;
pub mod sqlite_store;
pub mod store;
pub mod sync;

pub use adapter::{document_records, resolve_write_method, KnowledgeBaseAdapter, WriteMethod, WriteMode};
pub use memory_store::{Capabilities, InMemoryStore};
pub use record::{parse_jsonl, SourceRow, StoreRecord};
pub use signature::ContentSignature;
pub use sqlite_store::{SqliteStore, StoreStats};
pub use store::KnowledgeStore;
pub use sync::{IncrementalSynchronizer, SyncParams, SyncStrategy, SyncSummary};
