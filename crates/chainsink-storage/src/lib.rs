//! Persistence backends for the ingestion pipeline.
//!
//! Both backends implement [`chainsink_core::store::EvmStore`] with the
//! same conflict semantics, so the pipeline can run against SQLite in
//! production and the in-memory store in tests.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
