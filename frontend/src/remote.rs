//! [`TaskCollection`] backed by the task backend's HTTP API.

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::future;
use futures::stream::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use shared::{
    CollectionError, DocumentUpdate, InsertResponse, NewTaskDocument, SnapshotStream,
    TaskCollection, TaskDocument, TaskId, UserId, SNAPSHOT_EVENT,
};

use crate::config::ClientConfig;

#[derive(Debug, Clone)]
pub struct RemoteCollection {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn transport(error: reqwest::Error) -> CollectionError {
    CollectionError::Transport(error.to_string())
}

impl RemoteCollection {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.api_base_url.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map non-success responses onto collection errors. A 404 for a known
    /// task id becomes [`CollectionError::NotFound`].
    async fn check(response: Response, id: Option<TaskId>) -> Result<Response, CollectionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(CollectionError::NotFound(id));
            }
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        Err(CollectionError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TaskCollection for RemoteCollection {
    async fn insert(&self, document: NewTaskDocument) -> Result<TaskId, CollectionError> {
        let response = self
            .client
            .post(self.url("/api/tasks"))
            .json(&document)
            .send()
            .await
            .map_err(transport)?;
        let created: InsertResponse = Self::check(response, None)
            .await?
            .json()
            .await
            .map_err(|e| CollectionError::Decode(e.to_string()))?;
        Ok(created.id)
    }

    async fn update(&self, id: TaskId, update: DocumentUpdate) -> Result<(), CollectionError> {
        let response = self
            .client
            .patch(self.url(&format!("/api/tasks/{}", id)))
            .json(&update)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response, Some(id)).await?;
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<(), CollectionError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/tasks/{}", id)))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response, Some(id)).await?;
        Ok(())
    }

    async fn watch(&self, user_id: &UserId) -> Result<SnapshotStream, CollectionError> {
        let response = self
            .client
            .get(self.url("/api/live/tasks"))
            .query(&[("userId", user_id.as_str())])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response, None).await?;

        Ok(snapshot_stream(response.bytes_stream().boxed()))
    }
}

/// Turn a server-sent event byte stream into decoded snapshots. Events other
/// than `snapshot` are skipped. A transport error or an undecodable snapshot
/// is reported once and ends the stream.
fn snapshot_stream<S, B, E>(bytes: S) -> SnapshotStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    bytes
        .eventsource()
        .filter_map(|next| {
            future::ready(match next {
                Ok(event) if event.event == SNAPSHOT_EVENT => Some(
                    serde_json::from_str::<Vec<TaskDocument>>(&event.data)
                        .map_err(|e| CollectionError::Decode(e.to_string())),
                ),
                Ok(_) => None,
                Err(EventStreamError::Transport(e)) => {
                    Some(Err(CollectionError::Transport(e.to_string())))
                }
                Err(other) => Some(Err(CollectionError::Decode(other.to_string()))),
            })
        })
        .scan(false, |failed, next| {
            if *failed {
                return future::ready(None);
            }
            *failed = next.is_err();
            future::ready(Some(next))
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn stream_yields_snapshots_and_stops_after_bad_payload() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"event: snapshot\ndata: []\n\n".to_vec()),
            Ok(b"event: other\ndata: ignored\n\n".to_vec()),
            Ok(b"event: snapshot\ndata: not json\n\nevent: snapshot\ndata: []\n\n".to_vec()),
        ];
        let snapshots: Vec<_> = snapshot_stream(stream::iter(chunks)).collect().await;

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0], Ok(Vec::new()));
        assert!(matches!(snapshots[1], Err(CollectionError::Decode(_))));
    }

    #[tokio::test]
    async fn events_split_across_chunks_are_reassembled() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"event: snapshot\r\nda".to_vec()),
            Ok(b"ta: []\r\n".to_vec()),
            Ok(b"\r\n:\n\nevent: snapshot\ndata: []\n\n".to_vec()),
        ];
        let snapshots: Vec<_> = snapshot_stream(stream::iter(chunks)).collect().await;

        assert_eq!(snapshots, vec![Ok(Vec::new()), Ok(Vec::new())]);
    }

    #[tokio::test]
    async fn keep_alive_comments_produce_no_snapshots() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(b":\n\n: ping\n\n".to_vec())];
        let snapshots: Vec<_> = snapshot_stream(stream::iter(chunks)).collect().await;

        assert!(snapshots.is_empty());
    }

    #[tokio::test]
    async fn transport_errors_end_the_stream() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Err("connection reset".to_string()),
            Ok(b"event: snapshot\ndata: []\n\n".to_vec()),
        ];
        let snapshots: Vec<_> = snapshot_stream(stream::iter(chunks)).collect().await;

        assert_eq!(
            snapshots,
            vec![Err(CollectionError::Transport("connection reset".to_string()))]
        );
    }
}
