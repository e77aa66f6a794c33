//! Child, trash and closure listings.

use crate::model::document::{Document, DocumentId, OwnerId};
use crate::repo::document_repo::{
    parse_document_row, parse_uuid, DocRepoError, DocRepoResult, DOCUMENT_COLUMNS,
};
use rusqlite::{params, Connection};
use std::collections::{HashSet, VecDeque};

/// Archive-state filter for child listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArchiveFilter {
    /// Live documents only.
    #[default]
    ActiveOnly,
    /// Archived documents only (trash views).
    ArchivedOnly,
    /// Both live and archived documents.
    All,
}

impl ArchiveFilter {
    fn sql_predicate(self) -> &'static str {
        match self {
            Self::ActiveOnly => "AND is_archived = 0",
            Self::ArchivedOnly => "AND is_archived = 1",
            Self::All => "",
        }
    }
}

/// Lists direct children of `parent_id` (or root documents) owned by `owner_id`.
///
/// Ordered by `created_at ASC, id ASC`. A parent owned by someone else simply
/// yields no rows.
pub fn list_children(
    conn: &Connection,
    owner_id: &OwnerId,
    parent_id: Option<DocumentId>,
    filter: ArchiveFilter,
) -> DocRepoResult<Vec<Document>> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS}
         FROM documents
         WHERE owner_id = ?1
           AND parent_id IS ?2
           {}
         ORDER BY created_at ASC, id ASC;",
        filter.sql_predicate()
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params![
        owner_id.as_str(),
        parent_id.map(|value| value.to_string())
    ])?;

    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_document_row(row)?);
    }
    Ok(items)
}

/// Lists the top level of an owner's trash.
///
/// An archived document is listed only when its parent is absent or live, so
/// one cascade shows up as a single entry. Ordered by `archived_at DESC, id ASC`.
pub fn list_trash(conn: &Connection, owner_id: &OwnerId) -> DocRepoResult<Vec<Document>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {DOCUMENT_COLUMNS}
         FROM documents
         WHERE owner_id = ?1
           AND is_archived = 1
           AND NOT EXISTS (
             SELECT 1
             FROM documents parent
             WHERE parent.id = documents.parent_id
               AND parent.is_archived = 1
           )
         ORDER BY archived_at DESC, id ASC;"
    ))?;
    let mut rows = stmt.query([owner_id.as_str()])?;

    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_document_row(row)?);
    }
    Ok(items)
}

/// Returns every transitive descendant of `root` in breadth-first order,
/// excluding `root` itself. Archive state is ignored.
///
/// # Errors
/// - `InvalidData` when the stored parent links contain a cycle.
pub fn descendant_ids(conn: &Connection, root: DocumentId) -> DocRepoResult<Vec<DocumentId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id
         FROM documents
         WHERE parent_id = ?1
         ORDER BY created_at ASC, id ASC;",
    )?;

    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut result = Vec::new();
    while let Some(current) = queue.pop_front() {
        let child_ids = stmt
            .query_map([current.to_string()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for child_text in child_ids {
            let child = parse_uuid(&child_text, "documents.id")?;
            if !visited.insert(child) {
                return Err(DocRepoError::InvalidData(format!(
                    "parent cycle detected below {root} at {child}"
                )));
            }
            result.push(child);
            queue.push_back(child);
        }
    }
    Ok(result)
}
