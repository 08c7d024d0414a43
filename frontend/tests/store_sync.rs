use std::sync::Arc;
use std::time::Duration;

use backend::DocumentStore;
use frontend::{Msg, TaskBoard, TaskCounts, TaskStore};
use shared::{ContentUpdate, StoreTimestamp, Task, TaskDocument, TaskStatus, UserId};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

fn store() -> (TaskStore<DocumentStore>, DocumentStore) {
    let collection = DocumentStore::in_memory();
    (TaskStore::new(Arc::new(collection.clone())), collection)
}

async fn subscribe(
    store: &TaskStore<DocumentStore>,
    user: &str,
) -> (frontend::Subscription, mpsc::UnboundedReceiver<Vec<Task>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = store
        .subscribe(&UserId::new(user), move |tasks| {
            let _ = tx.send(tasks);
        })
        .await
        .unwrap();
    (subscription, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Vec<Task>>) -> Vec<Task> {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("snapshot in time")
        .expect("subscription open")
}

/// No snapshot arrives: the wait times out, or the subscription released
/// its callback and the channel closed.
async fn nothing_more(rx: &mut mpsc::UnboundedReceiver<Vec<Task>>) -> bool {
    !matches!(
        timeout(Duration::from_millis(150), rx.recv()).await,
        Ok(Some(_))
    )
}

/// The subscription dropped its callback, closing the channel.
async fn released(rx: &mut mpsc::UnboundedReceiver<Vec<Task>>) -> bool {
    matches!(timeout(Duration::from_secs(2), rx.recv()).await, Ok(None))
}

#[tokio::test]
async fn task_lifecycle_is_reflected_in_snapshots() {
    let (store, _) = store();
    let user = UserId::new("u1");
    let (_subscription, mut rx) = subscribe(&store, "u1").await;
    assert!(next(&mut rx).await.is_empty());

    let id = store.add("Buy milk", "", &user).await.unwrap();
    let tasks = next(&mut rx).await;
    assert_eq!(tasks.len(), 1);
    let created = tasks[0].clone();
    assert_eq!(created.id, id);
    assert_eq!(created.title, "Buy milk");
    assert_eq!(created.description, "");
    assert_eq!(created.status, TaskStatus::Todo);
    assert_eq!(created.created_at, created.updated_at);

    store.update_status(id, TaskStatus::Doing).await.unwrap();
    let moved = next(&mut rx).await.remove(0);
    assert_eq!(moved.status, TaskStatus::Doing);
    assert_eq!(moved.updated_at, created.updated_at);

    tokio::time::sleep(Duration::from_millis(5)).await;
    store
        .update_content(id, ContentUpdate::title("Buy oat milk"))
        .await
        .unwrap();
    let edited = next(&mut rx).await.remove(0);
    assert_eq!(edited.title, "Buy oat milk");
    assert_eq!(edited.status, TaskStatus::Doing);
    assert!(edited.updated_at > moved.updated_at);
    assert_eq!(edited.created_at, created.created_at);

    store.delete(id).await.unwrap();
    assert!(next(&mut rx).await.is_empty());
}

#[tokio::test]
async fn snapshots_are_newest_first() {
    let (store, _) = store();
    let user = UserId::new("u1");
    store.add("first", "", &user).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    store.add("second", "", &user).await.unwrap();

    let (_subscription, mut rx) = subscribe(&store, "u1").await;
    let titles: Vec<String> = next(&mut rx).await.into_iter().map(|t| t.title).collect();
    assert_eq!(titles, ["second", "first"]);
}

#[tokio::test]
async fn legacy_records_are_normalized_at_the_boundary() {
    let (store, collection) = store();
    let legacy = |title: &str, completed: Option<bool>| TaskDocument {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: None,
        status: None,
        completed,
        user_id: UserId::new("u1"),
        created_at: StoreTimestamp { seconds: 10, nanoseconds: 0 },
        updated_at: StoreTimestamp { seconds: 10, nanoseconds: 0 },
    };
    collection
        .load(vec![
            legacy("finished", Some(true)),
            legacy("open", Some(false)),
            legacy("unknown", None),
        ])
        .await;

    let (_subscription, mut rx) = subscribe(&store, "u1").await;
    let tasks = next(&mut rx).await;
    let status_of = |title: &str| tasks.iter().find(|t| t.title == title).unwrap().status;

    assert_eq!(status_of("finished"), TaskStatus::Done);
    assert_eq!(status_of("open"), TaskStatus::Todo);
    assert_eq!(status_of("unknown"), TaskStatus::Todo);
    assert!(tasks.iter().all(|t| t.description.is_empty()));
}

#[tokio::test]
async fn users_never_see_each_others_tasks() {
    let (store, _) = store();
    let (_u1, mut u1_rx) = subscribe(&store, "u1").await;
    let (_u2, mut u2_rx) = subscribe(&store, "u2").await;
    assert!(next(&mut u1_rx).await.is_empty());
    assert!(next(&mut u2_rx).await.is_empty());

    store.add("mine", "", &UserId::new("u1")).await.unwrap();

    assert_eq!(next(&mut u1_rx).await.len(), 1);
    assert!(nothing_more(&mut u2_rx).await);
}

#[tokio::test]
async fn unsubscribe_stops_delivery_and_is_idempotent() {
    let (store, _) = store();
    let (subscription, mut rx) = subscribe(&store, "u1").await;
    next(&mut rx).await;
    assert!(subscription.is_active());

    subscription.unsubscribe();
    subscription.unsubscribe();
    assert!(!subscription.is_active());

    store.add("after", "", &UserId::new("u1")).await.unwrap();
    assert!(released(&mut rx).await);
}

#[tokio::test]
async fn dropping_the_handle_cancels_the_subscription() {
    let (store, _) = store();
    let (subscription, mut rx) = subscribe(&store, "u1").await;
    next(&mut rx).await;
    drop(subscription);

    store.add("after", "", &UserId::new("u1")).await.unwrap();
    assert!(released(&mut rx).await);
}

#[tokio::test]
async fn writes_to_missing_tasks_fail() {
    let (store, _) = store();
    let id = Uuid::new_v4();
    assert_eq!(
        store.update_status(id, TaskStatus::Done).await,
        Err(shared::CollectionError::NotFound(id))
    );
    assert_eq!(
        store.update_content(id, ContentUpdate::title("x")).await,
        Err(shared::CollectionError::NotFound(id))
    );
    assert_eq!(store.delete(id).await, Err(shared::CollectionError::NotFound(id)));
}

#[tokio::test]
async fn status_move_and_content_edit_do_not_clobber_each_other() {
    let (store, _) = store();
    let user = UserId::new("u1");
    let id = store.add("Buy milk", "", &user).await.unwrap();

    let (moved, edited) = tokio::join!(
        store.update_status(id, TaskStatus::Done),
        store.update_content(
            id,
            ContentUpdate {
                title: Some("Buy oat milk".to_string()),
                description: Some("2 litres".to_string()),
            }
        ),
    );
    moved.unwrap();
    edited.unwrap();

    let (_subscription, mut rx) = subscribe(&store, "u1").await;
    let task = next(&mut rx).await.remove(0);
    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(task.title, "Buy oat milk");
    assert_eq!(task.description, "2 litres");
}

async fn settle(board: &mut TaskBoard<DocumentStore>) {
    timeout(Duration::from_secs(2), board.next_snapshot())
        .await
        .expect("snapshot in time");
}

#[tokio::test]
async fn board_keeps_counts_consistent_through_moves_and_deletes() {
    let (store, _) = store();
    let mut board = TaskBoard::new(store);

    board.dispatch(Msg::SignedIn(UserId::new("u1"))).await.unwrap();
    settle(&mut board).await;
    assert!(board.is_subscribed());
    assert!(!board.model().is_loading());

    for title in ["a", "b", "c"] {
        board.dispatch(Msg::SetNewTaskTitle(title.to_string())).await.unwrap();
        board.dispatch(Msg::CreateTask).await.unwrap();
        settle(&mut board).await;
    }
    assert_eq!(
        board.model().counts(),
        TaskCounts { total: 3, todo: 3, doing: 0, done: 0 }
    );

    let ids: Vec<_> = board.model().tasks().iter().map(|t| t.id).collect();
    board
        .dispatch(Msg::MoveTask { id: ids[0], to: TaskStatus::Doing })
        .await
        .unwrap();
    settle(&mut board).await;
    board
        .dispatch(Msg::DropTask { id: ids[1], zone: Some("done".to_string()) })
        .await
        .unwrap();
    settle(&mut board).await;

    let counts = board.model().counts();
    assert_eq!(counts, TaskCounts { total: 3, todo: 1, doing: 1, done: 1 });

    board.dispatch(Msg::DeleteTask(ids[2])).await.unwrap();
    settle(&mut board).await;
    let counts = board.model().counts();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.total, counts.todo + counts.doing + counts.done);
}

#[tokio::test]
async fn board_no_op_move_produces_no_snapshot() {
    let (store, _) = store();
    let mut board = TaskBoard::new(store);
    board.dispatch(Msg::SignedIn(UserId::new("u1"))).await.unwrap();
    settle(&mut board).await;

    board.dispatch(Msg::SetNewTaskTitle("Buy milk".to_string())).await.unwrap();
    board.dispatch(Msg::CreateTask).await.unwrap();
    settle(&mut board).await;
    let id = board.model().tasks()[0].id;

    board.dispatch(Msg::MoveTask { id, to: TaskStatus::Todo }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(board.drain_snapshots(), 0);
}

#[tokio::test]
async fn board_switching_users_replaces_the_subscription() {
    let (store, _) = store();
    store.add("u1 task", "", &UserId::new("u1")).await.unwrap();
    store.add("u2 task", "", &UserId::new("u2")).await.unwrap();
    let mut board = TaskBoard::new(store.clone());

    board.dispatch(Msg::SignedIn(UserId::new("u1"))).await.unwrap();
    settle(&mut board).await;
    assert_eq!(board.model().tasks()[0].title, "u1 task");

    board.dispatch(Msg::SignedIn(UserId::new("u2"))).await.unwrap();
    settle(&mut board).await;
    assert_eq!(board.model().tasks().len(), 1);
    assert_eq!(board.model().tasks()[0].title, "u2 task");

    // The u1 view is gone: its changes no longer reach the board.
    store.add("another u1 task", "", &UserId::new("u1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    board.drain_snapshots();
    assert_eq!(board.model().tasks()[0].title, "u2 task");

    board.dispatch(Msg::SignedOut).await.unwrap();
    assert!(!board.is_subscribed());
    assert!(board.model().tasks().is_empty());
}

#[tokio::test]
async fn board_records_failed_writes_without_touching_tasks() {
    let (store, _) = store();
    let mut board = TaskBoard::new(store);
    board.dispatch(Msg::SignedIn(UserId::new("u1"))).await.unwrap();
    settle(&mut board).await;

    let missing = Uuid::new_v4();
    let result = board.dispatch(Msg::DeleteTask(missing)).await;

    assert_eq!(result, Err(shared::CollectionError::NotFound(missing)));
    assert!(board.model().last_error().unwrap().contains("not found"));
    assert!(board.model().tasks().is_empty());
}
