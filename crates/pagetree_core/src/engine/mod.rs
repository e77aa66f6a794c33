//! Async document engine.
//!
//! # Responsibility
//! - Expose every document store, cascade, query and subscription operation
//!   as an awaitable call.
//! - Serialize tree-shaping operations per owner.
//! - Publish fresh values to subscribers after every commit.
//!
//! # Invariants
//! - SQLite work runs on blocking workers, never on async threads.
//! - Notification payloads and their sequence number are read while the
//!   connection is still held by the committing operation.
//! - Publishing happens after the write is durable and never blocks.

mod fanout;
mod owner_locks;

use crate::config::{ConfigError, DatabaseLocation, EngineConfig};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::logging::init_logging_with;
use crate::model::document::{AffectedSet, Document, DocumentId, DocumentPatch, OwnerId};
use crate::query::{list_children, list_trash, search_titles, ArchiveFilter, TitleQuery};
use crate::repo::document_repo::{DocRepoError, SqliteDocumentRepository};
use crate::service::cascade_service::CascadeService;
use crate::service::document_service::{ensure_caller, DocumentError, DocumentService};
use crate::sync::{
    ContentDebouncer, Interest, Notification, Subscriber, SubscriptionError, SyncHub,
};
use fanout::{load_payload, AffectedInterests};
use log::{debug, error, info, warn};
use owner_locks::OwnerLocks;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by [`DocumentEngine`].
#[derive(Debug)]
pub enum EngineError {
    /// Document store or cascade failure.
    Document(DocumentError),
    Subscription(SubscriptionError),
    Config(ConfigError),
    /// Database could not be opened or migrated.
    Open(DbError),
    /// Blocking worker failed before producing a result.
    Worker(String),
}

impl EngineError {
    /// Returns the document-level failure, if this is one.
    pub fn as_document(&self) -> Option<&DocumentError> {
        match self {
            Self::Document(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document(err) => write!(f, "{err}"),
            Self::Subscription(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Open(err) => write!(f, "failed to open document store: {err}"),
            Self::Worker(message) => write!(f, "engine worker failed: {message}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Document(err) => Some(err),
            Self::Subscription(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Open(err) => Some(err),
            Self::Worker(_) => None,
        }
    }
}

impl From<DocumentError> for EngineError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

impl From<DocRepoError> for EngineError {
    fn from(value: DocRepoError) -> Self {
        Self::Document(value.into())
    }
}

impl From<SubscriptionError> for EngineError {
    fn from(value: SubscriptionError) -> Self {
        Self::Subscription(value)
    }
}

impl From<ConfigError> for EngineError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for EngineError {
    fn from(value: DbError) -> Self {
        Self::Open(value)
    }
}

struct EngineInner {
    conn: Mutex<Connection>,
    /// Bumped once per commit while `conn` is held.
    commit_seq: AtomicU64,
    owner_locks: OwnerLocks,
    hub: Arc<SyncHub>,
    debouncer: ContentDebouncer,
    config: EngineConfig,
}

impl EngineInner {
    /// Reads the value of every watched interest for the commit just made.
    fn snapshot(&self, conn: &Connection, affected: AffectedInterests) -> Vec<Notification> {
        let seq = self.commit_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut notifications = Vec::new();
        for interest in affected.into_vec() {
            if !self.hub.is_watched(&interest) {
                continue;
            }
            match load_payload(conn, &interest) {
                Ok(payload) => notifications.push(Notification {
                    interest,
                    seq,
                    payload,
                }),
                Err(err) => error!(
                    "event=sync_snapshot module=engine status=error seq={seq} error={err}"
                ),
            }
        }
        notifications
    }
}

/// Cloneable handle to one document store and its sync hub.
#[derive(Clone)]
pub struct DocumentEngine {
    inner: Arc<EngineInner>,
}

impl DocumentEngine {
    /// Opens the configured database, applying migrations, and starts logging
    /// when the config asks for it.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        if let Some(settings) = &config.log {
            init_logging_with(settings).map_err(|message| {
                EngineError::Config(ConfigError::Invalid(format!("logging: {message}")))
            })?;
        }
        let conn = match &config.database {
            DatabaseLocation::Memory => open_db_in_memory()?,
            DatabaseLocation::File { path } => open_db(path)?,
        };
        Self::from_connection(conn, config)
    }

    /// Builds an engine over an already migrated connection.
    pub fn from_connection(conn: Connection, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        SqliteDocumentRepository::try_new(&conn)?;
        info!(
            "event=engine_start module=engine status=ok debounce_ms={} max_watches={}",
            config.debounce_window_ms, config.max_watches_per_subscriber
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                conn: Mutex::new(conn),
                commit_seq: AtomicU64::new(0),
                owner_locks: OwnerLocks::default(),
                hub: Arc::new(SyncHub::new(config.max_watches_per_subscriber)),
                debouncer: ContentDebouncer::new(config.debounce_window()),
                config,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Creates a document at root level or under `parent_id`.
    pub async fn create(
        &self,
        owner_id: &OwnerId,
        parent_id: Option<DocumentId>,
    ) -> EngineResult<Document> {
        let _guard = self.inner.owner_locks.acquire(owner_id).await;
        let owner_id = owner_id.clone();
        self.mutate("create", move |conn| {
            let document = documents(conn).create(&owner_id, parent_id)?;
            let affected = AffectedInterests::for_document(&document);
            Ok((document, affected))
        })
        .await
    }

    /// Loads a document visible to `caller`.
    pub async fn get(&self, id: DocumentId, caller: &OwnerId) -> EngineResult<Document> {
        let caller = caller.clone();
        self.with_connection("get", move |_, conn| Ok(documents(conn).get(id, &caller)?))
            .await
    }

    /// Applies a partial edit. Does not take the owner lock.
    ///
    /// A patch carrying `content` supersedes any content still pending from
    /// [`Self::submit_content`]; the pending value is dropped once the write
    /// succeeds.
    pub async fn update(
        &self,
        id: DocumentId,
        caller: &OwnerId,
        patch: DocumentPatch,
    ) -> EngineResult<Document> {
        let supersedes_pending = patch.content.is_some();
        self.write_patch("update", id, caller, patch, supersedes_pending)
            .await
    }

    /// Re-parents a document.
    pub async fn move_document(
        &self,
        id: DocumentId,
        caller: &OwnerId,
        new_parent_id: Option<DocumentId>,
    ) -> EngineResult<Document> {
        let _guard = self.inner.owner_locks.acquire(caller).await;
        let caller = caller.clone();
        self.mutate("move", move |conn| {
            let outcome = documents(conn).move_document(id, &caller, new_parent_id)?;
            let affected = AffectedInterests::for_move(&outcome.document, outcome.previous_parent);
            Ok((outcome.document, affected))
        })
        .await
    }

    /// Archives a document and its whole subtree.
    pub async fn archive(&self, id: DocumentId, caller: &OwnerId) -> EngineResult<AffectedSet> {
        let _guard = self.inner.owner_locks.acquire(caller).await;
        let caller = caller.clone();
        let affected = self
            .mutate("archive", move |conn| {
                let outcome = cascade(conn).archive(id, &caller)?;
                let affected = AffectedInterests::for_cascade(&caller, &outcome);
                Ok((outcome.affected, affected))
            })
            .await?;
        info!(
            "event=doc_archive module=engine status=ok doc_id={id} affected={}",
            affected.len()
        );
        Ok(affected)
    }

    /// Takes one document out of the trash.
    pub async fn restore(&self, id: DocumentId, caller: &OwnerId) -> EngineResult<Document> {
        let _guard = self.inner.owner_locks.acquire(caller).await;
        let caller = caller.clone();
        let document = self
            .mutate("restore", move |conn| {
                let document = cascade(conn).restore(id, &caller)?;
                let affected = AffectedInterests::for_restore(&document);
                Ok((document, affected))
            })
            .await?;
        info!("event=doc_restore module=engine status=ok doc_id={id}");
        Ok(document)
    }

    /// Irreversibly removes an archived document and its whole subtree.
    ///
    /// Only the requested document has to be in the trash. Descendants that
    /// were restored on their own while it stayed archived are removed too,
    /// and so is any content still pending for them.
    pub async fn permanently_delete(
        &self,
        id: DocumentId,
        caller: &OwnerId,
    ) -> EngineResult<AffectedSet> {
        let _guard = self.inner.owner_locks.acquire(caller).await;
        let caller = caller.clone();
        let affected = self
            .mutate("permanently_delete", move |conn| {
                let outcome = cascade(conn).permanently_delete(id, &caller)?;
                let affected = AffectedInterests::for_cascade(&caller, &outcome);
                Ok((outcome.affected, affected))
            })
            .await?;
        for removed in &affected.ids {
            if self.inner.debouncer.discard(*removed) {
                debug!("event=content_discard module=engine status=ok doc_id={removed}");
            }
        }
        info!(
            "event=doc_delete module=engine status=ok doc_id={id} affected={}",
            affected.len()
        );
        Ok(affected)
    }

    /// Sets the publish flag of one document.
    pub async fn publish(
        &self,
        id: DocumentId,
        caller: &OwnerId,
        published: bool,
    ) -> EngineResult<Document> {
        let caller = caller.clone();
        self.mutate("publish", move |conn| {
            let document = documents(conn).publish(id, &caller, published)?;
            let affected = AffectedInterests::for_document(&document);
            Ok((document, affected))
        })
        .await
    }

    /// Lists the caller's documents directly under `parent_id`.
    pub async fn list_children(
        &self,
        caller: &OwnerId,
        parent_id: Option<DocumentId>,
        filter: ArchiveFilter,
    ) -> EngineResult<Vec<Document>> {
        ensure_caller(caller)?;
        let caller = caller.clone();
        self.with_connection("list_children", move |_, conn| {
            Ok(list_children(conn, &caller, parent_id, filter)?)
        })
        .await
    }

    /// Searches the caller's live document titles.
    pub async fn search(&self, caller: &OwnerId, query: TitleQuery) -> EngineResult<Vec<Document>> {
        ensure_caller(caller)?;
        let caller = caller.clone();
        self.with_connection("search", move |_, conn| {
            Ok(search_titles(conn, &caller, &query)?)
        })
        .await
    }

    /// Lists the top level of the caller's trash.
    pub async fn list_trash(&self, caller: &OwnerId) -> EngineResult<Vec<Document>> {
        ensure_caller(caller)?;
        let caller = caller.clone();
        self.with_connection("list_trash", move |_, conn| Ok(list_trash(conn, &caller)?))
            .await
    }

    /// Registers a client connection for `caller`.
    pub fn connect(&self, caller: OwnerId) -> EngineResult<Subscriber> {
        ensure_caller(&caller)?;
        Ok(self.inner.hub.connect(caller))
    }

    /// Starts watching `interest` and queues its current value.
    ///
    /// # Errors
    /// - `ForeignInterest` for another owner's listing.
    /// - `NotFound` for a document the subscriber may not see.
    /// - `Limit` when the subscriber watches too many interests.
    pub async fn watch(&self, subscriber: &Subscriber, interest: Interest) -> EngineResult<()> {
        let caller = subscriber.caller().clone();
        if interest
            .scoped_owner()
            .is_some_and(|owner_id| owner_id != &caller)
        {
            return Err(SubscriptionError::ForeignInterest.into());
        }

        let subscriber_id = subscriber.id();
        self.with_connection("watch", move |inner, conn| {
            if let Interest::Document { id } = &interest {
                documents(conn).get(*id, &caller)?;
            }
            inner.hub.add_watch(subscriber_id, interest.clone())?;
            let notification = Notification {
                seq: inner.commit_seq.load(Ordering::SeqCst),
                payload: load_payload(conn, &interest)?,
                interest,
            };
            inner.hub.deliver_to(subscriber_id, &notification);
            Ok(())
        })
        .await
    }

    /// Stops watching `interest`.
    pub fn unwatch(&self, subscriber: &Subscriber, interest: &Interest) {
        subscriber.unwatch(interest);
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.hub.subscriber_count()
    }

    /// Queues a content edit; only the last one per debounce window is
    /// written.
    ///
    /// Ownership and archive state are checked on every submit.
    pub async fn submit_content(
        &self,
        id: DocumentId,
        caller: &OwnerId,
        content: impl Into<String>,
    ) -> EngineResult<()> {
        let content = content.into();
        let check_caller = caller.clone();
        self.with_connection("submit_content", move |_, conn| {
            documents(conn).load_editable(id, &check_caller)?;
            Ok(())
        })
        .await?;

        if self.inner.debouncer.submit(id, caller.clone(), content) {
            let engine = self.clone();
            let window = self.inner.debouncer.window();
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                if let Err(err) = engine.flush_content(id).await {
                    warn!("event=content_flush module=engine status=error doc_id={id} error={err}");
                }
            });
        }
        Ok(())
    }

    /// Writes pending debounced content for `id` now.
    ///
    /// Returns `None` when nothing was pending.
    pub async fn flush_content(&self, id: DocumentId) -> EngineResult<Option<Document>> {
        let Some(pending) = self.inner.debouncer.take(id) else {
            return Ok(None);
        };
        debug!(
            "event=content_flush module=engine status=start doc_id={id} submits={}",
            pending.submits
        );
        // Submits arriving after `take` opened a new window and must survive.
        self.write_patch(
            "flush_content",
            id,
            &pending.caller,
            DocumentPatch::content(Some(pending.content)),
            false,
        )
        .await
        .map(Some)
    }

    async fn write_patch(
        &self,
        op: &'static str,
        id: DocumentId,
        caller: &OwnerId,
        patch: DocumentPatch,
        discard_pending: bool,
    ) -> EngineResult<Document> {
        let caller = caller.clone();
        let inner = Arc::clone(&self.inner);
        self.mutate(op, move |conn| {
            let document = documents(conn).update(id, &caller, &patch)?;
            if discard_pending && inner.debouncer.discard(id) {
                debug!("event=content_discard module=engine status=ok doc_id={id} reason=superseded");
            }
            let affected = AffectedInterests::for_document(&document);
            Ok((document, affected))
        })
        .await
    }

    /// Runs a write, then publishes the values it changed.
    async fn mutate<T, F>(&self, op: &'static str, work: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<(T, AffectedInterests), DocumentError> + Send + 'static,
    {
        let (value, notifications) = self
            .with_connection(op, move |inner, conn| {
                let (value, affected) = work(conn)?;
                Ok((value, inner.snapshot(conn, affected)))
            })
            .await?;

        for notification in &notifications {
            self.inner.hub.publish(notification);
        }
        Ok(value)
    }

    async fn with_connection<T, F>(&self, op: &'static str, work: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&EngineInner, &Connection) -> EngineResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let started_at = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            // A panicking worker drops its open transaction, which rolls back.
            let conn = inner.conn.lock().unwrap_or_else(PoisonError::into_inner);
            work(inner.as_ref(), &*conn)
        })
        .await
        .map_err(|err| EngineError::Worker(format!("{op}: {err}")))?;

        match &result {
            Ok(_) => debug!(
                "event=engine_op module=engine status=ok op={op} duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(EngineError::Document(DocumentError::Repo(err))) => error!(
                "event=engine_op module=engine status=error op={op} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => debug!(
                "event=engine_op module=engine status=rejected op={op} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            ),
        }
        result
    }
}

fn documents(conn: &Connection) -> DocumentService<SqliteDocumentRepository<'_>> {
    DocumentService::new(SqliteDocumentRepository::from_verified(conn))
}

fn cascade(conn: &Connection) -> CascadeService<SqliteDocumentRepository<'_>> {
    CascadeService::new(SqliteDocumentRepository::from_verified(conn))
}
