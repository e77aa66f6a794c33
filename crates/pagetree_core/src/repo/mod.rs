//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the document store persistence contract.
//! - Isolate SQLite details from service and engine orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod document_repo;
