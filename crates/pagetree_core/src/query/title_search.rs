//! Case-insensitive title search.

use crate::model::document::{Document, OwnerId};
use crate::repo::document_repo::{parse_document_row, DocRepoResult, DOCUMENT_COLUMNS};
use rusqlite::Connection;

/// Title search options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleQuery {
    /// Substring to look for; blank matches every live document.
    pub text: String,
    /// Maximum number of hits, `None` for all.
    pub limit: Option<usize>,
}

impl TitleQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Searches live document titles owned by `owner_id`.
///
/// Matching lowercases both sides with Unicode rules, which SQLite's `lower`
/// does not do, so filtering happens after the owner-scoped scan. Results are
/// ordered `updated_at DESC, id ASC`.
pub fn search_titles(
    conn: &Connection,
    owner_id: &OwnerId,
    query: &TitleQuery,
) -> DocRepoResult<Vec<Document>> {
    if query.limit == Some(0) {
        return Ok(Vec::new());
    }
    let needle = query.text.trim().to_lowercase();

    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {DOCUMENT_COLUMNS}
         FROM documents
         WHERE owner_id = ?1
           AND is_archived = 0
         ORDER BY updated_at DESC, id ASC;"
    ))?;
    let mut rows = stmt.query([owner_id.as_str()])?;

    let mut hits = Vec::new();
    while let Some(row) = rows.next()? {
        let document = parse_document_row(row)?;
        if !needle.is_empty() && !document.title.to_lowercase().contains(&needle) {
            continue;
        }
        hits.push(document);
        if query.limit.is_some_and(|limit| hits.len() >= limit) {
            break;
        }
    }
    Ok(hits)
}
