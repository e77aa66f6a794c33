//! Cascade engine for subtree-wide lifecycle transitions.
//!
//! # Responsibility
//! - Expand archive and permanent delete into one transaction over the
//!   descendant closure.
//! - Restore exactly one document out of the trash.
//!
//! # Invariants
//! - Archive marks the whole closure; nodes already archived keep their
//!   original `archived_at` and batch.
//! - Restore never changes the archive state of descendants.
//! - Permanent delete is only reachable from the trash and removes the whole
//!   closure or nothing.

use crate::db::clock::now_ms;
use crate::model::document::{AffectedSet, Document, DocumentId, OwnerId};
use crate::repo::document_repo::DocumentRepository;
use crate::service::document_service::{DocumentError, DocumentResult, DocumentService};
use log::debug;
use uuid::Uuid;

/// Outcome of a subtree-wide operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub affected: AffectedSet,
    /// Snapshot of every affected document: post-write for archive,
    /// pre-delete for permanent delete.
    pub documents: Vec<Document>,
}

impl CascadeOutcome {
    /// Distinct parent slots of the affected documents, in first-seen order.
    ///
    /// `None` stands for the owner's root level.
    pub fn parent_slots(&self) -> Vec<Option<DocumentId>> {
        let mut slots = Vec::new();
        for document in &self.documents {
            if !slots.contains(&document.parent_id) {
                slots.push(document.parent_id);
            }
        }
        slots
    }
}

/// Lifecycle transitions layered over the document store.
pub struct CascadeService<R: DocumentRepository> {
    documents: DocumentService<R>,
}

impl<R: DocumentRepository> CascadeService<R> {
    pub fn new(repo: R) -> Self {
        Self {
            documents: DocumentService::new(repo),
        }
    }

    /// Archives `id` and every descendant.
    ///
    /// Archiving an already-archived document is a successful no-op whose
    /// affected set holds only `id`.
    pub fn archive(&self, id: DocumentId, caller: &OwnerId) -> DocumentResult<CascadeOutcome> {
        let document = self.documents.load_owned(id, caller)?;
        if document.is_archived {
            debug!("event=doc_archive module=cascade status=noop doc_id={id}");
            return Ok(CascadeOutcome {
                affected: AffectedSet::single(id),
                documents: vec![document],
            });
        }

        let batch = Uuid::new_v4();
        let documents = self
            .documents
            .repo()
            .archive_subtree(id, batch, now_ms())?;
        debug!(
            "event=doc_archive module=cascade status=ok doc_id={id} batch={batch} affected={}",
            documents.len()
        );
        Ok(CascadeOutcome {
            affected: affected_set(id, &documents),
            documents,
        })
    }

    /// Un-archives `id` only.
    ///
    /// When the parent is still archived the document stays out of the root
    /// listing until the parent is restored too.
    pub fn restore(&self, id: DocumentId, caller: &OwnerId) -> DocumentResult<Document> {
        let document = self.documents.load_owned(id, caller)?;
        if !document.is_archived {
            return Err(DocumentError::NotArchived(id));
        }
        let restored = self.documents.repo().restore_document(id, now_ms())?;
        debug!(
            "event=doc_restore module=cascade status=ok doc_id={id} parent_archived={}",
            self.parent_is_archived(&restored)?
        );
        Ok(restored)
    }

    /// Permanently removes `id` and every descendant.
    ///
    /// Descendants restored individually under an archived ancestor are
    /// removed as well; the forest never keeps orphaned rows.
    pub fn permanently_delete(
        &self,
        id: DocumentId,
        caller: &OwnerId,
    ) -> DocumentResult<CascadeOutcome> {
        let document = self.documents.load_owned(id, caller)?;
        if !document.is_archived {
            return Err(DocumentError::NotArchived(id));
        }
        let documents = self.documents.repo().delete_subtree(id)?;
        debug!(
            "event=doc_delete module=cascade status=ok doc_id={id} affected={}",
            documents.len()
        );
        Ok(CascadeOutcome {
            affected: affected_set(id, &documents),
            documents,
        })
    }

    fn parent_is_archived(&self, document: &Document) -> DocumentResult<bool> {
        let Some(parent_id) = document.parent_id else {
            return Ok(false);
        };
        Ok(self
            .documents
            .repo()
            .get_document(parent_id)?
            .is_some_and(|parent| parent.is_archived))
    }
}

fn affected_set(root: DocumentId, documents: &[Document]) -> AffectedSet {
    AffectedSet {
        root,
        ids: documents.iter().map(|document| document.id).collect(),
    }
}
