//! Task Store Client: the only path from the UI to the task collection.
//!
//! Writes go straight through to the collection. Nothing here patches local
//! state; callers learn about the effect of a write from the next snapshot of
//! their subscription.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use shared::{
    CollectionError, ContentUpdate, DocumentUpdate, NewTaskDocument, StoreTimestamp, Task,
    TaskCollection, TaskDocument, TaskId, TaskStatus, UserId,
};
use tokio::task::AbortHandle;

type Callback = Box<dyn FnMut(Vec<Task>) + Send>;

pub struct TaskStore<C: ?Sized> {
    collection: Arc<C>,
}

impl<C: ?Sized> Clone for TaskStore<C> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
        }
    }
}

impl<C: TaskCollection + ?Sized> TaskStore<C> {
    pub fn new(collection: Arc<C>) -> Self {
        Self { collection }
    }

    /// Create a task in `todo` for `user_id` and return its id.
    ///
    /// The title is stored as given; trimming and rejecting empty titles is
    /// up to the caller.
    pub async fn add(
        &self,
        title: &str,
        description: &str,
        user_id: &UserId,
    ) -> Result<TaskId, CollectionError> {
        let document = NewTaskDocument::new(title, description, user_id.clone(), StoreTimestamp::now());
        let id = self.collection.insert(document).await.inspect_err(|error| {
            tracing::warn!(%user_id, %error, "failed to add task");
        })?;
        tracing::debug!(%id, %user_id, "task added");
        Ok(id)
    }

    /// Open a live view of `user_id`'s tasks.
    ///
    /// `on_change` receives the full normalized list, newest first, once for
    /// the current state and again after every change. Invocations are
    /// sequential and in stream order. The view stays open until the returned
    /// [`Subscription`] is cancelled or dropped, or the collection ends it.
    /// `on_change` may cancel its own subscription.
    pub async fn subscribe<F>(
        &self,
        user_id: &UserId,
        on_change: F,
    ) -> Result<Subscription, CollectionError>
    where
        F: FnMut(Vec<Task>) + Send + 'static,
    {
        let mut snapshots = self.collection.watch(user_id).await?;
        let delivery = Arc::new(Delivery::new(Box::new(on_change)));

        let slot = Arc::clone(&delivery);
        let owner = user_id.clone();
        let handle = tokio::spawn(async move {
            loop {
                let documents = match snapshots.next().await {
                    Some(Ok(documents)) => documents,
                    Some(Err(error)) => {
                        tracing::warn!(user_id = %owner, %error, "live task query failed");
                        break;
                    }
                    None => {
                        tracing::warn!(user_id = %owner, "live task query closed by the collection");
                        break;
                    }
                };
                let tasks: Vec<Task> = documents.into_iter().map(TaskDocument::normalize).collect();
                tracing::debug!(user_id = %owner, count = tasks.len(), "delivering snapshot");
                if !slot.deliver(tasks) {
                    return;
                }
            }
            // A view the collection ended releases its callback like a cancelled one.
            slot.cancel();
        });

        tracing::info!(%user_id, "subscribed to tasks");
        Ok(Subscription {
            delivery,
            task: handle.abort_handle(),
        })
    }

    /// Edit title and/or description. Always moves `updated_at` to now and
    /// never touches the status.
    pub async fn update_content(
        &self,
        id: TaskId,
        content: ContentUpdate,
    ) -> Result<(), CollectionError> {
        let update = DocumentUpdate::content(content, StoreTimestamp::now());
        self.collection.update(id, update).await.inspect_err(|error| {
            tracing::warn!(%id, %error, "failed to update task content");
        })?;
        tracing::debug!(%id, "task content updated");
        Ok(())
    }

    /// Move a task to `status`. `updated_at` keeps recording the last
    /// content edit, so it is not bumped here.
    pub async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<(), CollectionError> {
        self.collection
            .update(id, DocumentUpdate::status(status))
            .await
            .inspect_err(|error| {
                tracing::warn!(%id, %status, %error, "failed to move task");
            })?;
        tracing::debug!(%id, %status, "task moved");
        Ok(())
    }

    /// Same as [`TaskStore::update_status`]; the name used by drag and drop.
    pub async fn move_to_status(&self, id: TaskId, status: TaskStatus) -> Result<(), CollectionError> {
        self.update_status(id, status).await
    }

    /// Permanently remove a task.
    pub async fn delete(&self, id: TaskId) -> Result<(), CollectionError> {
        self.collection.delete(id).await.inspect_err(|error| {
            tracing::warn!(%id, %error, "failed to delete task");
        })?;
        tracing::debug!(%id, "task deleted");
        Ok(())
    }
}

struct Slot {
    cancelled: bool,
    callback: Option<Callback>,
}

/// Callback shared between a [`Subscription`] and its delivery task.
///
/// The callback is taken out of the slot while it runs, so cancelling from
/// inside it never waits on the lock. It is dropped outside the lock too.
struct Delivery {
    slot: Mutex<Slot>,
}

impl Delivery {
    fn new(callback: Callback) -> Self {
        Self {
            slot: Mutex::new(Slot {
                cancelled: false,
                callback: Some(callback),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a snapshot to the callback. Returns false once cancelled.
    fn deliver(&self, tasks: Vec<Task>) -> bool {
        let taken = {
            let mut slot = self.lock();
            if slot.cancelled {
                None
            } else {
                slot.callback.take()
            }
        };
        let Some(mut on_change) = taken else {
            return false;
        };

        on_change(tasks);

        let mut slot = self.lock();
        if slot.cancelled {
            drop(slot);
            drop(on_change);
            return false;
        }
        slot.callback = Some(on_change);
        true
    }

    /// Returns true the first time only.
    fn cancel(&self) -> bool {
        let (first, released) = {
            let mut slot = self.lock();
            let first = !slot.cancelled;
            slot.cancelled = true;
            (first, slot.callback.take())
        };
        drop(released);
        first
    }

    fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }
}

/// Handle to a live task view. Cancelling it (explicitly or by dropping it)
/// stops delivery and releases the callback. A callback already running
/// finishes; no further one starts after [`Subscription::unsubscribe`]
/// returns.
pub struct Subscription {
    delivery: Arc<Delivery>,
    task: AbortHandle,
}

impl Subscription {
    /// Stop the live view. Safe to call any number of times, including from
    /// inside the callback.
    pub fn unsubscribe(&self) {
        let first = self.delivery.cancel();
        self.task.abort();
        if first {
            tracing::debug!("subscription cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished() && !self.delivery.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
