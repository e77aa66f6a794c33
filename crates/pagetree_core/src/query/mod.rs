//! Read-side queries over the document forest.
//!
//! # Responsibility
//! - Answer child listings, trash listings and title search per owner.
//! - Enumerate descendant closures for the cascade engine.
//!
//! # Invariants
//! - Every listing is scoped to exactly one owner.
//! - Result ordering is deterministic for identical store state.

mod listing;
mod title_search;

pub use listing::{descendant_ids, list_children, list_trash, ArchiveFilter};
pub use title_search::{search_titles, TitleQuery};
