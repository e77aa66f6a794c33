//! Watchable query shapes and the notifications delivered for them.

use crate::model::document::{Document, DocumentId, OwnerId};
use serde::Serialize;

/// Something a subscriber can watch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Interest {
    /// One document by id.
    #[serde(rename_all = "camelCase")]
    Document { id: DocumentId },
    /// Live children of `parent_id` (root documents when `None`).
    #[serde(rename_all = "camelCase")]
    Children {
        owner_id: OwnerId,
        parent_id: Option<DocumentId>,
    },
    /// Top level of an owner's trash.
    #[serde(rename_all = "camelCase")]
    Trash { owner_id: OwnerId },
}

impl Interest {
    pub fn document(id: DocumentId) -> Self {
        Self::Document { id }
    }

    pub fn children(owner_id: OwnerId, parent_id: Option<DocumentId>) -> Self {
        Self::Children {
            owner_id,
            parent_id,
        }
    }

    pub fn trash(owner_id: OwnerId) -> Self {
        Self::Trash { owner_id }
    }

    /// Owner a listing interest is scoped to; `None` for document interests.
    pub fn scoped_owner(&self) -> Option<&OwnerId> {
        match self {
            Self::Document { .. } => None,
            Self::Children { owner_id, .. } | Self::Trash { owner_id } => Some(owner_id),
        }
    }
}

/// Authoritative value of an interest after a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Payload {
    /// `None` once the document is gone or no longer visible to the subscriber.
    Document(Option<Document>),
    Children(Vec<Document>),
    Trash(Vec<Document>),
}

/// Full replacement value for one interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub interest: Interest,
    /// Commit sequence the payload was read at.
    pub seq: u64,
    pub payload: Payload,
}

impl Notification {
    /// Returns the notification as seen by `caller`.
    ///
    /// Document payloads the caller may not see are replaced by `None`.
    pub fn visible_to(&self, caller: &OwnerId) -> Self {
        match &self.payload {
            Payload::Document(Some(document)) if !document.is_visible_to(caller) => Self {
                interest: self.interest.clone(),
                seq: self.seq,
                payload: Payload::Document(None),
            },
            _ => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Interest, Notification, Payload};
    use crate::model::document::{Document, OwnerId};

    #[test]
    fn private_document_is_masked_for_strangers() {
        let owner = OwnerId::from("owner");
        let document = Document::new(owner.clone(), None);
        let notification = Notification {
            interest: Interest::document(document.id),
            seq: 7,
            payload: Payload::Document(Some(document)),
        };

        let masked = notification.visible_to(&OwnerId::from("stranger"));
        assert_eq!(masked.payload, Payload::Document(None));
        assert_eq!(masked.seq, 7);
        assert_eq!(notification.visible_to(&owner), notification);
    }

    #[test]
    fn notification_wire_shape_is_tagged() {
        let owner = OwnerId::from("u1");
        let notification = Notification {
            interest: Interest::children(owner, None),
            seq: 3,
            payload: Payload::Children(Vec::new()),
        };
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["interest"]["kind"], "children");
        assert_eq!(value["interest"]["ownerId"], "u1");
        assert!(value["interest"]["parentId"].is_null());
        assert_eq!(value["payload"]["type"], "children");
        assert_eq!(value["seq"], 3);
    }
}
