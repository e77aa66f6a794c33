//! Document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist document records and their parent links.
//! - Apply subtree-wide archive/delete writes inside one transaction.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Subtree writes either commit for the whole closure or not at all.
//! - Archiving never overwrites an existing `archived_at`/`archive_batch`.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::document::{ArchiveBatchId, Document, DocumentId, OwnerId};
use crate::query::descendant_ids;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub(crate) const DOCUMENT_COLUMNS: &str = "id,
    owner_id,
    parent_id,
    title,
    content,
    cover_image_url,
    icon,
    is_archived,
    is_published,
    archived_at,
    archive_batch,
    created_at,
    updated_at";

const REQUIRED_COLUMNS: [&str; 13] = [
    "id",
    "owner_id",
    "parent_id",
    "title",
    "content",
    "cover_image_url",
    "icon",
    "is_archived",
    "is_published",
    "archived_at",
    "archive_batch",
    "created_at",
    "updated_at",
];

/// Result type used by document repository operations.
pub type DocRepoResult<T> = Result<T, DocRepoError>;

/// Errors from document persistence and query operations.
#[derive(Debug)]
pub enum DocRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target row does not exist (or is not in the expected state).
    NotFound(DocumentId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid document.
    InvalidData(String),
}

impl Display for DocRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "document row not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "document repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "document repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "document repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted document data: {message}"),
        }
    }
}

impl Error for DocRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for DocRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for DocRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the document store.
pub trait DocumentRepository {
    /// Inserts a new document row.
    fn insert_document(&self, document: &Document) -> DocRepoResult<()>;
    /// Loads one document regardless of archive state.
    fn get_document(&self, id: DocumentId) -> DocRepoResult<Option<Document>>;
    /// Persists editable fields, publish flag and `updated_at` of a live document.
    fn update_fields(&self, document: &Document) -> DocRepoResult<()>;
    /// Re-parents one live document.
    fn set_parent(
        &self,
        id: DocumentId,
        parent_id: Option<DocumentId>,
        updated_at: i64,
    ) -> DocRepoResult<()>;
    /// Archives `root` and its descendant closure under one batch.
    ///
    /// Returns the closure (root first) as stored after the write.
    fn archive_subtree(
        &self,
        root: DocumentId,
        batch: ArchiveBatchId,
        archived_at: i64,
    ) -> DocRepoResult<Vec<Document>>;
    /// Clears the archive state of exactly one document.
    fn restore_document(&self, id: DocumentId, updated_at: i64) -> DocRepoResult<Document>;
    /// Removes `root` and its descendant closure.
    ///
    /// Returns the removed rows (root first) as they were before deletion.
    fn delete_subtree(&self, root: DocumentId) -> DocRepoResult<Vec<Document>>;
}

/// SQLite-backed document repository.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> DocRepoResult<Self> {
        ensure_document_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Wraps a connection whose schema was already checked by [`Self::try_new`].
    pub(crate) fn from_verified(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn insert_document(&self, document: &Document) -> DocRepoResult<()> {
        self.conn.execute(
            "INSERT INTO documents (
                id,
                owner_id,
                parent_id,
                title,
                content,
                cover_image_url,
                icon,
                is_archived,
                is_published,
                archived_at,
                archive_batch,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            params![
                document.id.to_string(),
                document.owner_id.as_str(),
                document.parent_id.map(|value| value.to_string()),
                document.title.as_str(),
                document.content.as_deref(),
                document.cover_image_url.as_deref(),
                document.icon.as_deref(),
                bool_to_int(document.is_archived),
                bool_to_int(document.is_published),
                document.archived_at,
                document.archive_batch.map(|value| value.to_string()),
                document.created_at,
                document.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_document(&self, id: DocumentId) -> DocRepoResult<Option<Document>> {
        load_document(self.conn, id)
    }

    fn update_fields(&self, document: &Document) -> DocRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE documents
             SET title = ?2,
                 content = ?3,
                 cover_image_url = ?4,
                 icon = ?5,
                 is_published = ?6,
                 updated_at = ?7
             WHERE id = ?1
               AND is_archived = 0;",
            params![
                document.id.to_string(),
                document.title.as_str(),
                document.content.as_deref(),
                document.cover_image_url.as_deref(),
                document.icon.as_deref(),
                bool_to_int(document.is_published),
                document.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(DocRepoError::NotFound(document.id));
        }
        Ok(())
    }

    fn set_parent(
        &self,
        id: DocumentId,
        parent_id: Option<DocumentId>,
        updated_at: i64,
    ) -> DocRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE documents
             SET parent_id = ?2,
                 updated_at = ?3
             WHERE id = ?1
               AND is_archived = 0;",
            params![
                id.to_string(),
                parent_id.map(|value| value.to_string()),
                updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(DocRepoError::NotFound(id));
        }
        Ok(())
    }

    fn archive_subtree(
        &self,
        root: DocumentId,
        batch: ArchiveBatchId,
        archived_at: i64,
    ) -> DocRepoResult<Vec<Document>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let closure = subtree_ids(&tx, root)?;

        {
            let mut stmt = tx.prepare(
                "UPDATE documents
                 SET is_archived = 1,
                     archived_at = ?2,
                     archive_batch = ?3,
                     updated_at = ?2
                 WHERE id = ?1
                   AND is_archived = 0;",
            )?;
            for id in &closure {
                stmt.execute(params![id.to_string(), archived_at, batch.to_string()])?;
            }
        }

        let documents = load_required_documents(&tx, &closure)?;
        tx.commit()?;
        Ok(documents)
    }

    fn restore_document(&self, id: DocumentId, updated_at: i64) -> DocRepoResult<Document> {
        let changed = self.conn.execute(
            "UPDATE documents
             SET is_archived = 0,
                 archived_at = NULL,
                 archive_batch = NULL,
                 updated_at = ?2
             WHERE id = ?1
               AND is_archived = 1;",
            params![id.to_string(), updated_at],
        )?;
        if changed == 0 {
            return Err(DocRepoError::NotFound(id));
        }
        load_document(self.conn, id)?.ok_or(DocRepoError::NotFound(id))
    }

    fn delete_subtree(&self, root: DocumentId) -> DocRepoResult<Vec<Document>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let closure = subtree_ids(&tx, root)?;
        let documents = load_required_documents(&tx, &closure)?;

        {
            let mut stmt = tx.prepare("DELETE FROM documents WHERE id = ?1;")?;
            // Breadth-first order reversed puts every child before its parent,
            // which keeps the parent foreign key satisfied after each statement.
            for id in closure.iter().rev() {
                stmt.execute([id.to_string()])?;
            }
        }

        tx.commit()?;
        Ok(documents)
    }
}

fn subtree_ids(conn: &Connection, root: DocumentId) -> DocRepoResult<Vec<DocumentId>> {
    let mut closure = vec![root];
    closure.extend(descendant_ids(conn, root)?);
    Ok(closure)
}

fn load_document(conn: &Connection, id: DocumentId) -> DocRepoResult<Option<Document>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {DOCUMENT_COLUMNS}
         FROM documents
         WHERE id = ?1;"
    ))?;
    stmt.query_row([id.to_string()], |row| Ok(parse_document_row(row)))
        .optional()?
        .transpose()
}

fn load_required_documents(
    conn: &Connection,
    ids: &[DocumentId],
) -> DocRepoResult<Vec<Document>> {
    ids.iter()
        .map(|id| load_document(conn, *id)?.ok_or(DocRepoError::NotFound(*id)))
        .collect()
}

/// Converts one `documents` row selected with [`DOCUMENT_COLUMNS`].
pub(crate) fn parse_document_row(row: &Row<'_>) -> DocRepoResult<Document> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "documents.id")?;

    let owner_text: String = row.get("owner_id")?;
    let owner_id = OwnerId::new(owner_text);
    if owner_id.is_blank() {
        return Err(DocRepoError::InvalidData(format!(
            "blank owner in documents.owner_id for {id}"
        )));
    }

    let parent_id = row
        .get::<_, Option<String>>("parent_id")?
        .map(|value| parse_uuid(&value, "documents.parent_id"))
        .transpose()?;
    let archive_batch = row
        .get::<_, Option<String>>("archive_batch")?
        .map(|value| parse_uuid(&value, "documents.archive_batch"))
        .transpose()?;

    let is_archived = parse_flag(row.get("is_archived")?, "documents.is_archived")?;
    let is_published = parse_flag(row.get("is_published")?, "documents.is_published")?;
    let archived_at: Option<i64> = row.get("archived_at")?;

    if is_archived != archived_at.is_some() {
        return Err(DocRepoError::InvalidData(format!(
            "archive flag and archived_at disagree for {id}"
        )));
    }

    Ok(Document {
        id,
        owner_id,
        parent_id,
        title: row.get("title")?,
        content: row.get("content")?,
        cover_image_url: row.get("cover_image_url")?,
        icon: row.get("icon")?,
        is_archived,
        is_published,
        archived_at,
        archive_batch,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> DocRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| DocRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_flag(value: i64, column: &'static str) -> DocRepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DocRepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn ensure_document_connection_ready(conn: &Connection) -> DocRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(DocRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "documents")? {
        return Err(DocRepoError::MissingRequiredTable("documents"));
    }
    let columns = table_columns(conn, "documents")?;
    for column in REQUIRED_COLUMNS {
        if !columns.iter().any(|current| current == column) {
            return Err(DocRepoError::MissingRequiredColumn {
                table: "documents",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> DocRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> DocRepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::{DocRepoError, DocumentRepository, SqliteDocumentRepository};
    use crate::db::open_db_in_memory;
    use crate::model::document::{Document, OwnerId};
    use rusqlite::Connection;
    use uuid::Uuid;

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteDocumentRepository::try_new(&conn)
            .err()
            .expect("unmigrated connection must be rejected");
        assert!(matches!(
            err,
            DocRepoError::UninitializedConnection {
                actual_version: 0,
                ..
            }
        ));
    }

    #[test]
    fn insert_then_get_preserves_every_field() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteDocumentRepository::try_new(&conn).unwrap();

        let mut document = Document::new(OwnerId::from("u1"), None);
        document.content = Some(r#"[{"type":"paragraph"}]"#.to_string());
        document.cover_image_url = Some("https://files.example/c.png".to_string());
        document.icon = Some("🚀".to_string());
        repo.insert_document(&document).unwrap();

        let loaded = repo.get_document(document.id).unwrap().unwrap();
        assert_eq!(loaded, document);
    }

    #[test]
    fn insert_rejects_unknown_parent() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteDocumentRepository::try_new(&conn).unwrap();

        let orphan = Document::new(OwnerId::from("u1"), Some(Uuid::new_v4()));
        let err = repo.insert_document(&orphan).unwrap_err();
        assert!(matches!(err, DocRepoError::Db(_)));
    }

    #[test]
    fn archive_subtree_keeps_first_archive_timestamp() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteDocumentRepository::try_new(&conn).unwrap();
        let owner = OwnerId::from("u1");

        let root = Document::new(owner.clone(), None);
        let child = Document::new(owner.clone(), Some(root.id));
        repo.insert_document(&root).unwrap();
        repo.insert_document(&child).unwrap();

        let first_batch = Uuid::new_v4();
        let first = repo.archive_subtree(child.id, first_batch, 1_000).unwrap();
        assert_eq!(first.len(), 1);

        let second_batch = Uuid::new_v4();
        let second = repo.archive_subtree(root.id, second_batch, 2_000).unwrap();
        assert_eq!(second[0].id, root.id);
        assert_eq!(second[0].archived_at, Some(2_000));
        assert_eq!(second[1].id, child.id);
        assert_eq!(second[1].archived_at, Some(1_000));
        assert_eq!(second[1].archive_batch, Some(first_batch));
    }

    #[test]
    fn delete_subtree_removes_children_before_parents() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteDocumentRepository::try_new(&conn).unwrap();
        let owner = OwnerId::from("u1");

        let root = Document::new(owner.clone(), None);
        let child = Document::new(owner.clone(), Some(root.id));
        let grandchild = Document::new(owner.clone(), Some(child.id));
        for document in [&root, &child, &grandchild] {
            repo.insert_document(document).unwrap();
        }

        let removed = repo.delete_subtree(root.id).unwrap();
        assert_eq!(
            removed.iter().map(|d| d.id).collect::<Vec<_>>(),
            vec![root.id, child.id, grandchild.id]
        );
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn restore_requires_archived_row() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteDocumentRepository::try_new(&conn).unwrap();

        let document = Document::new(OwnerId::from("u1"), None);
        repo.insert_document(&document).unwrap();

        let err = repo.restore_document(document.id, 5).unwrap_err();
        assert!(matches!(err, DocRepoError::NotFound(id) if id == document.id));
    }
}
