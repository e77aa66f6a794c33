//! Core of the pagetree hierarchical document store.
//! This crate owns the document forest, its lifecycle cascades and the
//! real-time sync layer built on top of it.

pub mod config;
pub mod db;
pub mod engine;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ConfigError, DatabaseLocation, EngineConfig, LogSettings};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use engine::{DocumentEngine, EngineError, EngineResult};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status};
pub use model::document::{
    AffectedSet, ArchiveBatchId, Document, DocumentId, DocumentPatch, OwnerId, DEFAULT_TITLE,
};
pub use query::{descendant_ids, list_children, list_trash, search_titles, ArchiveFilter, TitleQuery};
pub use repo::document_repo::{
    DocRepoError, DocRepoResult, DocumentRepository, SqliteDocumentRepository,
};
pub use service::cascade_service::{CascadeOutcome, CascadeService};
pub use service::document_service::{DocumentError, DocumentResult, DocumentService, MoveOutcome};
pub use sync::{Interest, Notification, Payload, Subscriber, SubscriptionError, SyncHub};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
