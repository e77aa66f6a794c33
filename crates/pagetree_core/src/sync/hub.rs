//! Subscriber registry and per-subscriber latest-wins mailboxes.
//!
//! # Responsibility
//! - Track which subscriber watches which interest.
//! - Deliver notifications without ever blocking the publisher.
//!
//! # Invariants
//! - A mailbox holds at most one pending notification per interest.
//! - For one interest, a subscriber never receives a notification with a
//!   lower or equal sequence number than one it already holds or received.
//! - Dropping a [`Subscriber`] removes every watch it registered.

use crate::model::document::OwnerId;
use crate::sync::interest::{Interest, Notification};
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Process-unique subscriber id.
pub type SubscriberId = u64;

/// Watch registration failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Subscriber already watches the configured maximum of interests.
    Limit { limit: usize },
    /// Listing interests may only be watched by their owner.
    ForeignInterest,
    /// Subscriber was disconnected.
    Disconnected(SubscriberId),
}

impl Display for SubscriptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit { limit } => write!(f, "subscriber watch limit reached: {limit}"),
            Self::ForeignInterest => write!(f, "listing interest belongs to another owner"),
            Self::Disconnected(id) => write!(f, "subscriber disconnected: {id}"),
        }
    }
}

impl Error for SubscriptionError {}

#[derive(Default)]
struct MailboxState {
    order: VecDeque<Interest>,
    pending: HashMap<Interest, Notification>,
    /// Highest sequence accepted per interest, delivered or still pending.
    high_water: HashMap<Interest, u64>,
    closed: bool,
}

impl MailboxState {
    fn offer(&mut self, notification: Notification) -> bool {
        if self.closed {
            return false;
        }
        if self
            .high_water
            .get(&notification.interest)
            .is_some_and(|seen| *seen >= notification.seq)
        {
            return false;
        }
        self.high_water
            .insert(notification.interest.clone(), notification.seq);
        match self.pending.get_mut(&notification.interest) {
            Some(slot) => *slot = notification,
            None => {
                self.order.push_back(notification.interest.clone());
                self.pending
                    .insert(notification.interest.clone(), notification);
            }
        }
        true
    }

    fn take(&mut self) -> Option<Notification> {
        while let Some(interest) = self.order.pop_front() {
            if let Some(notification) = self.pending.remove(&interest) {
                return Some(notification);
            }
        }
        None
    }

    fn forget(&mut self, interest: &Interest) {
        self.pending.remove(interest);
        self.high_water.remove(interest);
        self.order.retain(|queued| queued != interest);
    }
}

struct Mailbox {
    state: Mutex<MailboxState>,
    ready: Notify,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState::default()),
            ready: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MailboxState> {
        lock_recover(&self.state)
    }

    fn offer(&self, notification: Notification) {
        if self.state().offer(notification) {
            self.ready.notify_one();
        }
    }

    fn close(&self) {
        self.state().closed = true;
        self.ready.notify_one();
    }
}

struct SubscriberEntry {
    caller: OwnerId,
    watches: HashSet<Interest>,
    mailbox: Arc<Mailbox>,
}

#[derive(Default)]
struct HubState {
    subscribers: HashMap<SubscriberId, SubscriberEntry>,
    watchers: HashMap<Interest, HashSet<SubscriberId>>,
}

/// In-process fan-out point between committed mutations and subscribers.
pub struct SyncHub {
    state: Mutex<HubState>,
    next_id: AtomicU64,
    max_watches: usize,
}

impl SyncHub {
    pub fn new(max_watches_per_subscriber: usize) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            next_id: AtomicU64::new(1),
            max_watches: max_watches_per_subscriber,
        }
    }

    /// Registers one client connection.
    pub fn connect(self: &Arc<Self>, caller: OwnerId) -> Subscriber {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mailbox = Arc::new(Mailbox::new());
        self.state().subscribers.insert(
            id,
            SubscriberEntry {
                caller: caller.clone(),
                watches: HashSet::new(),
                mailbox: Arc::clone(&mailbox),
            },
        );
        debug!("event=sync_connect module=sync status=ok subscriber_id={id}");
        Subscriber {
            id,
            caller,
            mailbox,
            hub: Arc::clone(self),
        }
    }

    /// Adds `interest` to the subscriber's watch set.
    ///
    /// Returns `false` when the interest was already watched.
    pub fn add_watch(
        &self,
        subscriber_id: SubscriberId,
        interest: Interest,
    ) -> Result<bool, SubscriptionError> {
        let mut state = self.state();
        let entry = state
            .subscribers
            .get_mut(&subscriber_id)
            .ok_or(SubscriptionError::Disconnected(subscriber_id))?;
        if entry.watches.contains(&interest) {
            return Ok(false);
        }
        if entry.watches.len() >= self.max_watches {
            return Err(SubscriptionError::Limit {
                limit: self.max_watches,
            });
        }
        entry.watches.insert(interest.clone());
        state
            .watchers
            .entry(interest)
            .or_default()
            .insert(subscriber_id);
        Ok(true)
    }

    /// Removes `interest` from the subscriber's watch set and drops any
    /// undelivered notification for it.
    pub fn remove_watch(&self, subscriber_id: SubscriberId, interest: &Interest) {
        let mut state = self.state();
        let Some(entry) = state.subscribers.get_mut(&subscriber_id) else {
            return;
        };
        if !entry.watches.remove(interest) {
            return;
        }
        entry.mailbox.state().forget(interest);
        detach_watcher(&mut state, subscriber_id, interest);
    }

    /// Removes the subscriber and closes its mailbox.
    pub fn disconnect(&self, subscriber_id: SubscriberId) {
        let mut state = self.state();
        let Some(entry) = state.subscribers.remove(&subscriber_id) else {
            return;
        };
        for interest in &entry.watches {
            detach_watcher(&mut state, subscriber_id, interest);
        }
        entry.mailbox.close();
        debug!(
            "event=sync_disconnect module=sync status=ok subscriber_id={subscriber_id} watches={}",
            entry.watches.len()
        );
    }

    /// Returns whether anyone currently watches `interest`.
    pub fn is_watched(&self, interest: &Interest) -> bool {
        self.state().watchers.contains_key(interest)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Enqueues `notification` for every watcher of its interest.
    ///
    /// Returns the number of mailboxes the notification was offered to.
    pub fn publish(&self, notification: &Notification) -> usize {
        let state = self.state();
        let Some(watcher_ids) = state.watchers.get(&notification.interest) else {
            return 0;
        };
        let mut offered = 0;
        for subscriber_id in watcher_ids {
            if let Some(entry) = state.subscribers.get(subscriber_id) {
                entry.mailbox.offer(notification.visible_to(&entry.caller));
                offered += 1;
            }
        }
        offered
    }

    /// Enqueues `notification` for one subscriber only, if it still watches
    /// the interest.
    pub fn deliver_to(&self, subscriber_id: SubscriberId, notification: &Notification) -> bool {
        let state = self.state();
        match state.subscribers.get(&subscriber_id) {
            Some(entry) if entry.watches.contains(&notification.interest) => {
                entry.mailbox.offer(notification.visible_to(&entry.caller));
                true
            }
            _ => false,
        }
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        lock_recover(&self.state)
    }
}

fn detach_watcher(state: &mut HubState, subscriber_id: SubscriberId, interest: &Interest) {
    if let Some(ids) = state.watchers.get_mut(interest) {
        ids.remove(&subscriber_id);
        if ids.is_empty() {
            state.watchers.remove(interest);
        }
    }
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Mailbox and registry state stay consistent between statements, so a
    // panic elsewhere never leaves them half-written.
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One client connection's view of the sync layer.
///
/// Dropping the handle disconnects the subscriber.
pub struct Subscriber {
    id: SubscriberId,
    caller: OwnerId,
    mailbox: Arc<Mailbox>,
    hub: Arc<SyncHub>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn caller(&self) -> &OwnerId {
        &self.caller
    }

    /// Waits for the next notification.
    ///
    /// Returns `None` once the subscriber is disconnected and drained.
    pub async fn next(&self) -> Option<Notification> {
        loop {
            {
                let mut state = self.mailbox.state();
                if let Some(notification) = state.take() {
                    return Some(notification);
                }
                if state.closed {
                    return None;
                }
            }
            self.mailbox.ready.notified().await;
        }
    }

    /// Returns the next pending notification without waiting.
    pub fn try_next(&self) -> Option<Notification> {
        self.mailbox.state().take()
    }

    /// Number of interests with an undelivered notification.
    pub fn pending_len(&self) -> usize {
        self.mailbox.state().pending.len()
    }

    /// Stops watching `interest`.
    pub fn unwatch(&self, interest: &Interest) {
        self.hub.remove_watch(self.id, interest);
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::{SubscriptionError, SyncHub};
    use crate::model::document::{Document, OwnerId};
    use crate::sync::interest::{Interest, Notification, Payload};
    use std::sync::Arc;

    fn children_note(owner: &OwnerId, seq: u64, titles: &[&str]) -> Notification {
        let payload = titles
            .iter()
            .map(|title| {
                let mut document = Document::new(owner.clone(), None);
                document.title = title.to_string();
                document
            })
            .collect();
        Notification {
            interest: Interest::children(owner.clone(), None),
            seq,
            payload: Payload::Children(payload),
        }
    }

    fn titles(notification: &Notification) -> Vec<String> {
        match &notification.payload {
            Payload::Children(items) => items.iter().map(|d| d.title.clone()).collect(),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn slow_subscriber_only_sees_latest_value() {
        let hub = Arc::new(SyncHub::new(8));
        let owner = OwnerId::from("u1");
        let subscriber = hub.connect(owner.clone());
        hub.add_watch(subscriber.id(), Interest::children(owner.clone(), None))
            .unwrap();

        hub.publish(&children_note(&owner, 1, &["a"]));
        hub.publish(&children_note(&owner, 2, &["a", "b"]));
        hub.publish(&children_note(&owner, 3, &["a", "b", "c"]));

        assert_eq!(subscriber.pending_len(), 1);
        let latest = subscriber.try_next().unwrap();
        assert_eq!(latest.seq, 3);
        assert_eq!(titles(&latest), vec!["a", "b", "c"]);
        assert!(subscriber.try_next().is_none());
    }

    #[test]
    fn stale_sequence_is_dropped_after_delivery() {
        let hub = Arc::new(SyncHub::new(8));
        let owner = OwnerId::from("u1");
        let subscriber = hub.connect(owner.clone());
        hub.add_watch(subscriber.id(), Interest::children(owner.clone(), None))
            .unwrap();

        hub.publish(&children_note(&owner, 5, &["new"]));
        assert_eq!(subscriber.try_next().unwrap().seq, 5);

        hub.publish(&children_note(&owner, 4, &["old"]));
        assert!(subscriber.try_next().is_none());
    }

    #[test]
    fn watch_limit_is_enforced() {
        let hub = Arc::new(SyncHub::new(1));
        let owner = OwnerId::from("u1");
        let subscriber = hub.connect(owner.clone());
        hub.add_watch(subscriber.id(), Interest::trash(owner.clone()))
            .unwrap();
        assert!(!hub
            .add_watch(subscriber.id(), Interest::trash(owner.clone()))
            .unwrap());

        let err = hub
            .add_watch(subscriber.id(), Interest::children(owner, None))
            .unwrap_err();
        assert_eq!(err, SubscriptionError::Limit { limit: 1 });
    }

    #[test]
    fn dropping_subscriber_unregisters_watches() {
        let hub = Arc::new(SyncHub::new(8));
        let owner = OwnerId::from("u1");
        let interest = Interest::trash(owner.clone());
        {
            let subscriber = hub.connect(owner.clone());
            hub.add_watch(subscriber.id(), interest.clone()).unwrap();
            assert!(hub.is_watched(&interest));
            assert_eq!(hub.subscriber_count(), 1);
        }
        assert!(!hub.is_watched(&interest));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn unwatch_discards_pending_notification() {
        let hub = Arc::new(SyncHub::new(8));
        let owner = OwnerId::from("u1");
        let subscriber = hub.connect(owner.clone());
        let interest = Interest::children(owner.clone(), None);
        hub.add_watch(subscriber.id(), interest.clone()).unwrap();

        hub.publish(&children_note(&owner, 1, &["a"]));
        subscriber.unwatch(&interest);

        assert_eq!(subscriber.pending_len(), 0);
        assert!(!hub.is_watched(&interest));
        assert_eq!(hub.publish(&children_note(&owner, 2, &["a"])), 0);
    }

    #[tokio::test]
    async fn next_wakes_on_publish() {
        let hub = Arc::new(SyncHub::new(8));
        let owner = OwnerId::from("u1");
        let subscriber = hub.connect(owner.clone());
        hub.add_watch(subscriber.id(), Interest::children(owner.clone(), None))
            .unwrap();

        let publisher = {
            let hub = Arc::clone(&hub);
            let owner = owner.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                hub.publish(&children_note(&owner, 1, &["a"]));
            })
        };

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), subscriber.next())
            .await
            .expect("notification should arrive")
            .expect("subscriber should still be connected");
        assert_eq!(received.seq, 1);
        publisher.await.unwrap();
    }
}
