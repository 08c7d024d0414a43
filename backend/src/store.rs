//! In-memory document collection with user-scoped live queries.
//!
//! Every mutation publishes the owning user's id on a broadcast channel. A live
//! query listens on that channel and re-reads its user's full result set
//! whenever its user changed, so subscribers always receive complete snapshots
//! and never see another user's documents.
//!
//! The in-memory collection is authoritative. Write-through to persistence
//! happens after the collection lock is released, one write at a time, and
//! always stores the document's current state, so the durable copy converges
//! on memory even when writes to one document race.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use shared::{
    CollectionError, DocumentUpdate, NewTaskDocument, SnapshotStream, TaskCollection,
    TaskDocument, TaskId, UserId,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use crate::error::StoreError;
use crate::persist::{Persistence, RedisPersistence};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

struct Entry {
    document: TaskDocument,
    /// Insertion order, breaks ties between equal creation times.
    seq: u64,
}

#[derive(Default)]
struct Documents {
    entries: HashMap<TaskId, Entry>,
    next_seq: u64,
}

impl Documents {
    fn put(&mut self, document: TaskDocument) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(document.id, Entry { document, seq });
    }

    fn owned_by(&self, user_id: &UserId) -> Vec<TaskDocument> {
        let mut owned: Vec<&Entry> = self
            .entries
            .values()
            .filter(|entry| &entry.document.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| {
            b.document
                .created_at
                .cmp(&a.document.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        owned.into_iter().map(|entry| entry.document.clone()).collect()
    }
}

#[derive(Clone)]
pub struct DocumentStore {
    documents: Arc<RwLock<Documents>>,
    changes: broadcast::Sender<UserId>,
    persistence: Option<Arc<dyn Persistence>>,
    /// Serializes write-through so saves reach persistence in order.
    persist_order: Arc<Mutex<()>>,
}

impl DocumentStore {
    pub fn in_memory() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            documents: Arc::new(RwLock::new(Documents::default())),
            changes,
            persistence: None,
            persist_order: Arc::new(Mutex::new(())),
        }
    }

    /// Empty store writing through to `persistence`.
    pub fn persisted_to(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            persistence: Some(persistence),
            ..Self::in_memory()
        }
    }

    /// Store backed by redis, pre-loaded with everything already persisted.
    pub async fn with_redis(persistence: RedisPersistence) -> Result<Self, StoreError> {
        let documents = persistence.load_all().await?;
        let store = Self::persisted_to(Arc::new(persistence));
        store.load(documents).await;
        tracing::info!("document store restored from redis");
        Ok(store)
    }

    /// Place existing documents into the collection as-is, keeping their ids
    /// and whatever shape they were stored in.
    pub async fn load(&self, mut documents: Vec<TaskDocument>) {
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let owners: Vec<UserId> = documents.iter().map(|d| d.user_id.clone()).collect();
        let count = documents.len();

        let mut guard = self.documents.write().await;
        for document in documents {
            guard.put(document);
        }
        drop(guard);

        for owner in owners {
            self.notify(owner);
        }
        tracing::debug!(count, "documents loaded");
    }

    pub async fn insert(&self, new: NewTaskDocument) -> Result<TaskDocument, StoreError> {
        let document = TaskDocument::from_new(Uuid::new_v4(), new);

        self.documents.write().await.put(document.clone());

        tracing::debug!(id = %document.id, user_id = %document.user_id, "task document inserted");
        self.notify(document.user_id.clone());
        self.write_through(document.id).await?;
        Ok(document)
    }

    pub async fn update(
        &self,
        id: TaskId,
        update: &DocumentUpdate,
    ) -> Result<TaskDocument, StoreError> {
        let document = {
            let mut guard = self.documents.write().await;
            let entry = guard.entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            entry.document.apply(update);
            entry.document.clone()
        };

        tracing::debug!(%id, "task document updated");
        self.notify(document.user_id.clone());
        self.write_through(id).await?;
        Ok(document)
    }

    pub async fn delete(&self, id: TaskId) -> Result<TaskDocument, StoreError> {
        let removed = self
            .documents
            .write()
            .await
            .entries
            .remove(&id)
            .map(|entry| entry.document)
            .ok_or(StoreError::NotFound(id))?;

        tracing::debug!(%id, "task document deleted");
        self.notify(removed.user_id.clone());
        self.write_through(id).await?;
        Ok(removed)
    }

    /// Current documents of one user, newest first.
    pub async fn snapshot(&self, user_id: &UserId) -> Vec<TaskDocument> {
        self.documents.read().await.owned_by(user_id)
    }

    /// Live query over `user_id`'s documents.
    ///
    /// Yields the current snapshot immediately, then a fresh one after every
    /// change to this user's documents. Consecutive identical snapshots are
    /// coalesced.
    pub fn watch(&self, user_id: UserId) -> BoxStream<'static, Vec<TaskDocument>> {
        let state = Watch {
            store: self.clone(),
            changes: self.changes.subscribe(),
            user_id,
            last: None,
            primed: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if state.primed {
                    match state.changes.recv().await {
                        Ok(changed) if changed != state.user_id => continue,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "live query lagged, re-reading snapshot");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
                state.primed = true;

                let snapshot = state.store.snapshot(&state.user_id).await;
                if state.last.as_ref() == Some(&snapshot) {
                    continue;
                }
                state.last = Some(snapshot.clone());
                return Some((snapshot, state));
            }
        })
        .boxed()
    }

    /// Bring the persisted copy of `id` in line with memory: save it if it
    /// exists, remove it otherwise. A failure is reported to the writer; the
    /// in-memory change stays.
    async fn write_through(&self, id: TaskId) -> Result<(), StoreError> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let _order = self.persist_order.lock().await;
        let current = self
            .documents
            .read()
            .await
            .entries
            .get(&id)
            .map(|entry| entry.document.clone());

        let result = match &current {
            Some(document) => persistence.save(document).await,
            None => persistence.remove(id).await,
        };
        result.inspect_err(|error| {
            tracing::error!(%id, %error, "write-through to persistence failed");
        })
    }

    fn notify(&self, user_id: UserId) {
        // No receivers simply means nobody is watching.
        let _ = self.changes.send(user_id);
    }
}

struct Watch {
    store: DocumentStore,
    changes: broadcast::Receiver<UserId>,
    user_id: UserId,
    last: Option<Vec<TaskDocument>>,
    primed: bool,
}

#[async_trait]
impl TaskCollection for DocumentStore {
    async fn insert(&self, document: NewTaskDocument) -> Result<TaskId, CollectionError> {
        Ok(DocumentStore::insert(self, document).await?.id)
    }

    async fn update(&self, id: TaskId, update: DocumentUpdate) -> Result<(), CollectionError> {
        DocumentStore::update(self, id, &update).await?;
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<(), CollectionError> {
        DocumentStore::delete(self, id).await?;
        Ok(())
    }

    async fn watch(&self, user_id: &UserId) -> Result<SnapshotStream, CollectionError> {
        Ok(DocumentStore::watch(self, user_id.clone())
            .map(Ok::<_, CollectionError>)
            .boxed())
    }
}
