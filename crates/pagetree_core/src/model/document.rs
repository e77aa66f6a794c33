//! Document domain model.
//!
//! # Responsibility
//! - Define the canonical document record and its identifiers.
//! - Describe partial edits and the result of subtree-wide operations.
//!
//! # Invariants
//! - `id` and `owner_id` never change after creation.
//! - `archived_at` and `archive_batch` are set exactly when `is_archived`.
//! - `content`, `cover_image_url` and `icon` are opaque and stored verbatim.

use crate::db::clock::now_ms;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable document identifier.
pub type DocumentId = Uuid;

/// Identifier shared by every document archived in one cascade.
pub type ArchiveBatchId = Uuid;

/// Title given to documents at creation.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Opaque, pre-authenticated user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Blank ids never identify a caller.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One node of an owner's document forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: OwnerId,
    /// `None` means root level.
    pub parent_id: Option<DocumentId>,
    pub title: String,
    /// Serialized editor payload.
    pub content: Option<String>,
    /// URL produced by the external upload service.
    pub cover_image_url: Option<String>,
    pub icon: Option<String>,
    /// Soft-delete marker; archived documents live in the trash.
    pub is_archived: bool,
    pub is_published: bool,
    /// Epoch ms of the first archive that reached this document.
    pub archived_at: Option<i64>,
    pub archive_batch: Option<ArchiveBatchId>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms timestamp of the last mutation.
    pub updated_at: i64,
}

impl Document {
    /// Creates a live, unpublished document with a fresh id and default title.
    pub fn new(owner_id: OwnerId, parent_id: Option<DocumentId>) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            parent_id,
            title: DEFAULT_TITLE.to_string(),
            content: None,
            cover_image_url: None,
            icon: None,
            is_archived: false,
            is_published: false,
            archived_at: None,
            archive_batch: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, caller: &OwnerId) -> bool {
        &self.owner_id == caller
    }

    /// Owners always see their documents; everyone else only published ones.
    pub fn is_visible_to(&self, caller: &OwnerId) -> bool {
        self.is_owned_by(caller) || self.is_published
    }

    /// Bumps `updated_at` to the next clock value.
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}

/// Partial edit of the user-editable document fields.
///
/// Nullable fields use `Some(None)` to clear the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<Option<String>>,
    pub cover_image_url: Option<Option<String>>,
    pub icon: Option<Option<String>>,
}

impl DocumentPatch {
    pub fn title(value: impl Into<String>) -> Self {
        Self {
            title: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn content(value: Option<String>) -> Self {
        Self {
            content: Some(value),
            ..Self::default()
        }
    }

    pub fn with_cover_image_url(mut self, value: Option<String>) -> Self {
        self.cover_image_url = Some(value);
        self
    }

    pub fn with_icon(mut self, value: Option<String>) -> Self {
        self.icon = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.cover_image_url.is_none()
            && self.icon.is_none()
    }

    /// Writes the present fields into `document`. Does not touch timestamps.
    pub fn apply_to(&self, document: &mut Document) {
        if let Some(title) = &self.title {
            document.title = title.clone();
        }
        if let Some(content) = &self.content {
            document.content = content.clone();
        }
        if let Some(cover) = &self.cover_image_url {
            document.cover_image_url = cover.clone();
        }
        if let Some(icon) = &self.icon {
            document.icon = icon.clone();
        }
    }
}

/// Documents touched by one subtree-wide lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedSet {
    /// Document the operation was requested on.
    pub root: DocumentId,
    /// `root` first, then its descendants in breadth-first order.
    pub ids: Vec<DocumentId>,
}

impl AffectedSet {
    pub fn single(root: DocumentId) -> Self {
        Self {
            root,
            ids: vec![root],
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.ids.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::{Document, DocumentPatch, OwnerId, DEFAULT_TITLE};

    #[test]
    fn new_document_starts_live_and_private() {
        let document = Document::new(OwnerId::from("u1"), None);
        assert_eq!(document.title, DEFAULT_TITLE);
        assert!(!document.is_archived);
        assert!(!document.is_published);
        assert_eq!(document.created_at, document.updated_at);
        assert!(document.archived_at.is_none());
    }

    #[test]
    fn visibility_follows_owner_or_publish_flag() {
        let owner = OwnerId::from("owner");
        let stranger = OwnerId::from("stranger");
        let mut document = Document::new(owner.clone(), None);
        assert!(document.is_visible_to(&owner));
        assert!(!document.is_visible_to(&stranger));

        document.is_published = true;
        assert!(document.is_visible_to(&stranger));
        assert!(!document.is_owned_by(&stranger));
    }

    #[test]
    fn patch_sets_and_clears_nullable_fields() {
        let mut document = Document::new(OwnerId::from("u1"), None);
        document.icon = Some("📄".to_string());

        let patch = DocumentPatch::title("Roadmap")
            .with_cover_image_url(Some("https://cdn.example/cover.png".to_string()))
            .with_icon(None);
        patch.apply_to(&mut document);

        assert_eq!(document.title, "Roadmap");
        assert_eq!(
            document.cover_image_url.as_deref(),
            Some("https://cdn.example/cover.png")
        );
        assert!(document.icon.is_none());
        assert!(document.content.is_none());
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(DocumentPatch::default().is_empty());
        assert!(!DocumentPatch::content(None).is_empty());
    }

    #[test]
    fn blank_owner_is_detected() {
        assert!(OwnerId::from("  ").is_blank());
        assert!(!OwnerId::from("u1").is_blank());
    }

    #[test]
    fn document_serializes_with_camel_case_keys() {
        let document = Document::new(OwnerId::from("u1"), None);
        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["ownerId"], "u1");
        assert_eq!(value["isArchived"], false);
        assert!(value["parentId"].is_null());
    }
}
