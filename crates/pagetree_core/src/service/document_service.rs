//! Document store use-case service.
//!
//! # Responsibility
//! - Enforce ownership, parent, cycle and archive invariants above the
//!   repository layer.
//! - Provide create, get, update, move and publish operations.
//!
//! # Invariants
//! - A parent must exist and share the child's owner.
//! - A move never makes a document its own ancestor.
//! - Archived documents are read-only; only the cascade service changes them.

use crate::model::document::{Document, DocumentId, DocumentPatch, OwnerId};
use crate::repo::document_repo::{DocRepoError, DocumentRepository};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for document store and cascade operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Typed failures returned to callers of the document store.
#[derive(Debug)]
pub enum DocumentError {
    /// Document does not exist or is not visible to the caller.
    NotFound(DocumentId),
    /// Caller is not the owner of a document it tried to mutate.
    Forbidden(DocumentId),
    /// Document (or target parent) is archived and therefore read-only.
    Archived(DocumentId),
    /// Restore or permanent delete requested on a live document.
    NotArchived(DocumentId),
    /// Move would make `document` an ancestor of itself.
    CycleDetected {
        document: DocumentId,
        parent: DocumentId,
    },
    /// Parent does not exist or belongs to another owner.
    InvalidParent(DocumentId),
    /// Caller id is blank.
    InvalidCaller,
    /// Storage failure.
    Repo(DocRepoError),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "document not found: {id}"),
            Self::Forbidden(id) => write!(f, "caller does not own document: {id}"),
            Self::Archived(id) => write!(f, "document is archived: {id}"),
            Self::NotArchived(id) => write!(f, "document is not archived: {id}"),
            Self::CycleDetected { document, parent } => write!(
                f,
                "move would create cycle: document {document} under parent {parent}"
            ),
            Self::InvalidParent(id) => write!(f, "invalid parent document: {id}"),
            Self::InvalidCaller => write!(f, "caller id must not be blank"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DocRepoError> for DocumentError {
    fn from(value: DocRepoError) -> Self {
        match value {
            DocRepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Outcome of a re-parent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub document: Document,
    /// Parent before the move; `None` means the document was at root level.
    pub previous_parent: Option<DocumentId>,
}

/// Document store facade.
pub struct DocumentService<R: DocumentRepository> {
    repo: R,
}

impl<R: DocumentRepository> DocumentService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Creates a root document, or a child of `parent_id`.
    pub fn create(
        &self,
        owner_id: &OwnerId,
        parent_id: Option<DocumentId>,
    ) -> DocumentResult<Document> {
        ensure_caller(owner_id)?;
        if let Some(parent_id) = parent_id {
            self.ensure_valid_parent(owner_id, parent_id)?;
        }

        let document = Document::new(owner_id.clone(), parent_id);
        self.repo.insert_document(&document)?;
        Ok(document)
    }

    /// Loads one document the caller may see.
    ///
    /// Non-owners only see published documents; anything else is `NotFound`.
    pub fn get(&self, id: DocumentId, caller: &OwnerId) -> DocumentResult<Document> {
        ensure_caller(caller)?;
        self.repo
            .get_document(id)?
            .filter(|document| document.is_visible_to(caller))
            .ok_or(DocumentError::NotFound(id))
    }

    /// Applies a partial edit of title, content, cover and icon.
    pub fn update(
        &self,
        id: DocumentId,
        caller: &OwnerId,
        patch: &DocumentPatch,
    ) -> DocumentResult<Document> {
        let mut document = self.load_editable(id, caller)?;
        patch.apply_to(&mut document);
        document.touch();
        self.repo.update_fields(&document)?;
        Ok(document)
    }

    /// Re-parents a document under `new_parent_id` (or to root level).
    pub fn move_document(
        &self,
        id: DocumentId,
        caller: &OwnerId,
        new_parent_id: Option<DocumentId>,
    ) -> DocumentResult<MoveOutcome> {
        let mut document = self.load_editable(id, caller)?;
        let previous_parent = document.parent_id;

        if let Some(parent_id) = new_parent_id {
            if parent_id == id {
                return Err(DocumentError::CycleDetected {
                    document: id,
                    parent: parent_id,
                });
            }
            self.ensure_valid_parent(caller, parent_id)?;
            if self.would_create_cycle(id, parent_id)? {
                return Err(DocumentError::CycleDetected {
                    document: id,
                    parent: parent_id,
                });
            }
        }

        document.parent_id = new_parent_id;
        document.touch();
        self.repo
            .set_parent(id, new_parent_id, document.updated_at)?;
        Ok(MoveOutcome {
            document,
            previous_parent,
        })
    }

    /// Sets the publish flag of one document. Children keep their own flag.
    pub fn publish(
        &self,
        id: DocumentId,
        caller: &OwnerId,
        published: bool,
    ) -> DocumentResult<Document> {
        let mut document = self.load_editable(id, caller)?;
        document.is_published = published;
        document.touch();
        self.repo.update_fields(&document)?;
        Ok(document)
    }

    /// Loads a document the caller owns, whatever its archive state.
    pub fn load_owned(&self, id: DocumentId, caller: &OwnerId) -> DocumentResult<Document> {
        ensure_caller(caller)?;
        let document = self
            .repo
            .get_document(id)?
            .ok_or(DocumentError::NotFound(id))?;
        if !document.is_owned_by(caller) {
            return Err(DocumentError::Forbidden(id));
        }
        Ok(document)
    }

    /// Loads a live document the caller owns.
    pub fn load_editable(&self, id: DocumentId, caller: &OwnerId) -> DocumentResult<Document> {
        let document = self.load_owned(id, caller)?;
        if document.is_archived {
            return Err(DocumentError::Archived(id));
        }
        Ok(document)
    }

    fn ensure_valid_parent(&self, owner_id: &OwnerId, parent_id: DocumentId) -> DocumentResult<()> {
        let parent = self
            .repo
            .get_document(parent_id)?
            .filter(|parent| parent.is_owned_by(owner_id))
            .ok_or(DocumentError::InvalidParent(parent_id))?;
        if parent.is_archived {
            return Err(DocumentError::Archived(parent_id));
        }
        Ok(())
    }

    fn would_create_cycle(
        &self,
        id: DocumentId,
        candidate_parent: DocumentId,
    ) -> DocumentResult<bool> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent);
        while let Some(current) = cursor {
            if current == id || !visited.insert(current) {
                return Ok(true);
            }
            let node = self
                .repo
                .get_document(current)?
                .ok_or(DocumentError::InvalidParent(current))?;
            cursor = node.parent_id;
        }
        Ok(false)
    }
}

pub(crate) fn ensure_caller(caller: &OwnerId) -> DocumentResult<()> {
    if caller.is_blank() {
        return Err(DocumentError::InvalidCaller);
    }
    Ok(())
}
