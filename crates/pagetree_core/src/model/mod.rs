//! Document domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by the store, cascade and sync
//!   layers.
//!
//! # Invariants
//! - Every document is identified by a stable `DocumentId`.
//! - Parent/child links are id references, never embedded records.

pub mod document;
