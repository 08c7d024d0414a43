//! Wire representation of tasks as stored in the document collection, and the
//! mapping from stored documents to the normalized [`Task`].
//!
//! Older records predate the three-column board: they carry a `completed`
//! boolean instead of `status`. [`TaskDocument::normalize`] backfills the status
//! from that flag, so every consumer of a snapshot sees a valid [`TaskStatus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContentUpdate, Task, TaskId, TaskStatus, UserId};

/// Store-native timestamp: whole seconds since the Unix epoch plus nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreTimestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl StoreTimestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            nanoseconds: at.timestamp_subsec_nanos(),
        }
    }

    /// Out-of-range values collapse to the Unix epoch.
    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.seconds, self.nanoseconds).unwrap_or_default()
    }
}

/// A task document exactly as the store holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocument {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Legacy completion flag, only consulted when `status` is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    pub user_id: UserId,
    pub created_at: StoreTimestamp,
    pub updated_at: StoreTimestamp,
}

impl TaskDocument {
    pub fn from_new(id: TaskId, new: NewTaskDocument) -> Self {
        Self {
            id,
            title: new.title,
            description: Some(new.description),
            status: Some(new.status.as_str().to_string()),
            completed: None,
            user_id: new.user_id,
            created_at: new.created_at,
            updated_at: new.updated_at,
        }
    }

    /// Effective status of the document, see [`resolve_status`].
    pub fn resolved_status(&self) -> TaskStatus {
        resolve_status(self.status.as_deref(), self.completed)
    }

    /// Map the stored document into the in-memory task shape.
    pub fn normalize(self) -> Task {
        let status = self.resolved_status();
        Task {
            id: self.id,
            title: self.title,
            description: self.description.unwrap_or_default(),
            status,
            user_id: self.user_id,
            created_at: self.created_at.to_datetime(),
            updated_at: self.updated_at.to_datetime(),
        }
    }

    /// Merge the fields carried by `update`; everything else is left as stored.
    pub fn apply(&mut self, update: &DocumentUpdate) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(description) = &update.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = update.status {
            self.status = Some(status.as_str().to_string());
        }
        if let Some(updated_at) = update.updated_at {
            self.updated_at = updated_at;
        }
    }
}

/// Status of a stored record.
///
/// A recognised `status` wins. Records without one (or with a value outside
/// the three columns) fall back to the legacy `completed` flag, and to `todo`
/// when that is absent too.
pub fn resolve_status(status: Option<&str>, completed: Option<bool>) -> TaskStatus {
    status
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| TaskStatus::from_completed(completed.unwrap_or(false)))
}

/// Insert payload. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskDocument {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub user_id: UserId,
    pub created_at: StoreTimestamp,
    pub updated_at: StoreTimestamp,
}

impl NewTaskDocument {
    /// New tasks always start in `todo` with both timestamps set to `now`.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        user_id: UserId,
        now: StoreTimestamp,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Todo,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial document write. Only the fields present are stored.
///
/// Content edits (`title`, `description`, `updated_at`) and status moves
/// (`status`) never share a patch, so the two can race without clobbering
/// each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<StoreTimestamp>,
}

impl DocumentUpdate {
    pub fn content(content: ContentUpdate, now: StoreTimestamp) -> Self {
        Self {
            title: content.title,
            description: content.description,
            status: None,
            updated_at: Some(now),
        }
    }

    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
