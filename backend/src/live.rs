use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use shared::SNAPSHOT_EVENT;

use crate::routes::{SharedState, UserQuery};

/// Live query endpoint: one `snapshot` event per change of the user's tasks,
/// starting with the current result set.
pub async fn live_tasks(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::info!(user_id = %query.user_id, "live query opened");

    let user_id = query.user_id.clone();
    let events = state
        .store
        .watch(query.user_id)
        .take_until(state.closing())
        .map(move |snapshot| {
            tracing::debug!(%user_id, count = snapshot.len(), "pushing snapshot");
            Event::default().event(SNAPSHOT_EVENT).json_data(snapshot)
        });

    Sse::new(events).keep_alive(KeepAlive::new().interval(state.keepalive))
}
