use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::{DocumentUpdate, NewTaskDocument, TaskDocument, TaskId, UserId};

/// Live result set of a user-scoped query: one full snapshot per change,
/// ordered by creation time, newest first.
pub type SnapshotStream = BoxStream<'static, Result<Vec<TaskDocument>, CollectionError>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend rejected the request ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("failed to decode task documents: {0}")]
    Decode(String),

    #[error("live query closed")]
    Closed,
}

/// The document collection holding every user's tasks.
///
/// There is no unscoped read: the only query is [`TaskCollection::watch`], and
/// it is always filtered to one owner.
#[async_trait]
pub trait TaskCollection: Send + Sync + 'static {
    /// Store a new document and return the id assigned to it.
    async fn insert(&self, document: NewTaskDocument) -> Result<TaskId, CollectionError>;

    /// Merge the fields present in `update` into an existing document.
    async fn update(&self, id: TaskId, update: DocumentUpdate) -> Result<(), CollectionError>;

    async fn delete(&self, id: TaskId) -> Result<(), CollectionError>;

    /// Open a live query over `user_id`'s documents. The first item is the
    /// current result set.
    async fn watch(&self, user_id: &UserId) -> Result<SnapshotStream, CollectionError>;
}
