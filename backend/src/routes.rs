use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch},
    Router,
};
use serde::Deserialize;
use shared::{
    DocumentUpdate, InsertResponse, NewTaskDocument, StoreTimestamp, TaskDocument, UserId,
};
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::error::ApiError;
use crate::live;
use crate::store::DocumentStore;

pub struct AppState {
    pub store: DocumentStore,
    pub keepalive: Duration,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(store: DocumentStore, keepalive: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            keepalive,
            shutdown,
        }
    }

    /// End every open live query so graceful shutdown does not wait on them.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`AppState::shutdown`] has been called.
    pub fn closing(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Every query is scoped to the owner named here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: UserId,
}

/// Fields of a new task the client gets to choose. Status and timestamps in
/// the request are ignored; new tasks start in `todo`, stamped by the server.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub user_id: UserId,
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/:id", patch(update_task).delete(delete_task))
        .route("/api/live/tasks", get(live::live_tasks))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_tasks(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
) -> Json<Vec<TaskDocument>> {
    Json(state.store.snapshot(&query.user_id).await)
}

async fn create_task(
    State(state): State<SharedState>,
    Json(payload): Json<CreateTask>,
) -> Result<(StatusCode, Json<InsertResponse>), ApiError> {
    let new = NewTaskDocument::new(
        payload.title,
        payload.description,
        payload.user_id,
        StoreTimestamp::now(),
    );
    let document = state.store.insert(new).await?;
    Ok((StatusCode::CREATED, Json(InsertResponse { id: document.id })))
}

async fn update_task(
    Path(id): Path<Uuid>,
    State(state): State<SharedState>,
    Json(payload): Json<DocumentUpdate>,
) -> Result<StatusCode, ApiError> {
    if payload.is_empty() {
        return Err(ApiError::BadRequest("update carries no fields".to_string()));
    }
    state.store.update(id, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_task(
    Path(id): Path<Uuid>,
    State(state): State<SharedState>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
