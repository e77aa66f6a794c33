//! Subscription and real-time sync layer.
//!
//! # Responsibility
//! - Register subscriber interest in documents and listings.
//! - Fan committed changes out as full replacement values.
//! - Coalesce keystroke-level content edits.
//!
//! # Invariants
//! - Publishing never waits on a subscriber.
//! - Per interest, delivery order follows commit order.

mod debounce;
mod hub;
mod interest;

pub use debounce::{ContentDebouncer, PendingContent};
pub use hub::{Subscriber, SubscriberId, SubscriptionError, SyncHub};
pub use interest::{Interest, Notification, Payload};
