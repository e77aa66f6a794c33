//! Mapping from committed mutations to the interests they may change.

use crate::model::document::{Document, DocumentId, OwnerId};
use crate::query::{list_children, list_trash, ArchiveFilter};
use crate::repo::document_repo::{DocRepoResult, DocumentRepository, SqliteDocumentRepository};
use crate::service::cascade_service::CascadeOutcome;
use crate::sync::{Interest, Payload};
use rusqlite::Connection;

/// Ordered, duplicate-free list of interests touched by one commit.
#[derive(Debug, Default)]
pub(crate) struct AffectedInterests {
    interests: Vec<Interest>,
}

impl AffectedInterests {
    pub(crate) fn push(&mut self, interest: Interest) {
        if !self.interests.contains(&interest) {
            self.interests.push(interest);
        }
    }

    /// The document itself and the listing it appears in.
    pub(crate) fn for_document(document: &Document) -> Self {
        let mut affected = Self::default();
        affected.push(Interest::document(document.id));
        affected.push(Interest::children(
            document.owner_id.clone(),
            document.parent_id,
        ));
        affected
    }

    /// A re-parented document, its old listing and its new listing.
    pub(crate) fn for_move(document: &Document, previous_parent: Option<DocumentId>) -> Self {
        let mut affected = Self::for_document(document);
        affected.push(Interest::children(
            document.owner_id.clone(),
            previous_parent,
        ));
        affected
    }

    /// A restored document plus its owner's trash.
    pub(crate) fn for_restore(document: &Document) -> Self {
        let mut affected = Self::for_document(document);
        affected.push(Interest::trash(document.owner_id.clone()));
        affected
    }

    /// Every affected document, every listing they appear in or own, and
    /// the owner's trash.
    pub(crate) fn for_cascade(owner_id: &OwnerId, outcome: &CascadeOutcome) -> Self {
        let mut affected = Self::default();
        for id in &outcome.affected.ids {
            affected.push(Interest::document(*id));
        }
        for slot in outcome.parent_slots() {
            affected.push(Interest::children(owner_id.clone(), slot));
        }
        for id in &outcome.affected.ids {
            affected.push(Interest::children(owner_id.clone(), Some(*id)));
        }
        affected.push(Interest::trash(owner_id.clone()));
        affected
    }

    pub(crate) fn into_vec(self) -> Vec<Interest> {
        self.interests
    }
}

/// Reads the current authoritative value of `interest`.
pub(crate) fn load_payload(conn: &Connection, interest: &Interest) -> DocRepoResult<Payload> {
    match interest {
        Interest::Document { id } => Ok(Payload::Document(
            SqliteDocumentRepository::from_verified(conn).get_document(*id)?,
        )),
        Interest::Children {
            owner_id,
            parent_id,
        } => Ok(Payload::Children(list_children(
            conn,
            owner_id,
            *parent_id,
            ArchiveFilter::ActiveOnly,
        )?)),
        Interest::Trash { owner_id } => Ok(Payload::Trash(list_trash(conn, owner_id)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::AffectedInterests;
    use crate::model::document::{AffectedSet, Document, OwnerId};
    use crate::service::cascade_service::CascadeOutcome;
    use crate::sync::Interest;

    #[test]
    fn move_touches_both_listings_once() {
        let owner = OwnerId::from("u1");
        let parent = Document::new(owner.clone(), None);
        let document = Document::new(owner.clone(), Some(parent.id));

        let interests = AffectedInterests::for_move(&document, Some(parent.id)).into_vec();
        assert_eq!(
            interests,
            vec![
                Interest::document(document.id),
                Interest::children(owner, Some(parent.id)),
            ]
        );
    }

    #[test]
    fn cascade_touches_every_node_parent_listing_and_trash() {
        let owner = OwnerId::from("u1");
        let root = Document::new(owner.clone(), None);
        let child = Document::new(owner.clone(), Some(root.id));
        let outcome = CascadeOutcome {
            affected: AffectedSet {
                root: root.id,
                ids: vec![root.id, child.id],
            },
            documents: vec![root.clone(), child.clone()],
        };

        let interests = AffectedInterests::for_cascade(&owner, &outcome).into_vec();
        assert!(interests.contains(&Interest::document(root.id)));
        assert!(interests.contains(&Interest::document(child.id)));
        assert!(interests.contains(&Interest::children(owner.clone(), None)));
        assert!(interests.contains(&Interest::children(owner.clone(), Some(root.id))));
        assert!(interests.contains(&Interest::children(owner.clone(), Some(child.id))));
        assert_eq!(interests.last(), Some(&Interest::trash(owner)));
        let root_listing_count = interests
            .iter()
            .filter(|interest| **interest == Interest::children(OwnerId::from("u1"), Some(root.id)))
            .count();
        assert_eq!(root_listing_count, 1);
    }
}
