//! Coalescing of rapid content edits.
//!
//! # Responsibility
//! - Hold the latest submitted content per document until its window closes.
//!
//! # Invariants
//! - At most one pending entry exists per document.
//! - A later submit always replaces an earlier one (last write wins).
//! - Only the submit that opens a window asks the caller to schedule a flush.

use crate::model::document::{DocumentId, OwnerId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Content waiting for its debounce window to close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingContent {
    pub caller: OwnerId,
    pub content: String,
    /// Number of submits folded into this entry.
    pub submits: u32,
}

/// Per-document last-write-wins buffer.
pub struct ContentDebouncer {
    window: Duration,
    pending: Mutex<HashMap<DocumentId, PendingContent>>,
}

impl ContentDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records `content` as the latest value for `id`.
    ///
    /// Returns `true` when this submit opened a new window, in which case the
    /// caller must schedule exactly one flush after [`Self::window`].
    pub fn submit(&self, id: DocumentId, caller: OwnerId, content: String) -> bool {
        let mut pending = self.lock();
        match pending.get_mut(&id) {
            Some(entry) => {
                entry.caller = caller;
                entry.content = content;
                entry.submits += 1;
                false
            }
            None => {
                pending.insert(
                    id,
                    PendingContent {
                        caller,
                        content,
                        submits: 1,
                    },
                );
                true
            }
        }
    }

    /// Removes and returns the pending content for `id`, closing its window.
    pub fn take(&self, id: DocumentId) -> Option<PendingContent> {
        self.lock().remove(&id)
    }

    /// Drops pending content for `id` without applying it.
    pub fn discard(&self, id: DocumentId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DocumentId, PendingContent>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::ContentDebouncer;
    use crate::model::document::OwnerId;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn only_first_submit_opens_window_and_last_content_wins() {
        let debouncer = ContentDebouncer::new(Duration::from_millis(50));
        let id = Uuid::new_v4();
        let owner = OwnerId::from("u1");

        assert!(debouncer.submit(id, owner.clone(), "h".to_string()));
        assert!(!debouncer.submit(id, owner.clone(), "he".to_string()));
        assert!(!debouncer.submit(id, owner.clone(), "hey".to_string()));

        let pending = debouncer.take(id).unwrap();
        assert_eq!(pending.content, "hey");
        assert_eq!(pending.submits, 3);
        assert!(debouncer.take(id).is_none());

        assert!(debouncer.submit(id, owner, "again".to_string()));
    }

    #[test]
    fn windows_are_tracked_per_document() {
        let debouncer = ContentDebouncer::new(Duration::from_millis(50));
        let owner = OwnerId::from("u1");
        assert!(debouncer.submit(Uuid::new_v4(), owner.clone(), "a".to_string()));
        assert!(debouncer.submit(Uuid::new_v4(), owner, "b".to_string()));
        assert_eq!(debouncer.pending_count(), 2);
    }
}
