use shared::{CollectionError, TaskCollection};
use tokio::sync::mpsc;

use crate::controller::{Cmd, Model, Msg};
use crate::store::{Subscription, TaskStore};

/// Runs the controller against a [`TaskStore`].
///
/// Keeps at most one live subscription, replacing it when the signed-in user
/// changes. Snapshots are queued by the subscription and applied to the model
/// by [`TaskBoard::next_snapshot`] / [`TaskBoard::drain_snapshots`].
pub struct TaskBoard<C: TaskCollection + ?Sized> {
    model: Model,
    store: TaskStore<C>,
    subscription: Option<Subscription>,
    events_tx: mpsc::UnboundedSender<Msg>,
    events_rx: mpsc::UnboundedReceiver<Msg>,
}

impl<C: TaskCollection + ?Sized> TaskBoard<C> {
    pub fn new(store: TaskStore<C>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            model: Model::default(),
            store,
            subscription: None,
            events_tx,
            events_rx,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Apply a user intent and perform the write it calls for.
    ///
    /// A failed write is logged and recorded on the model, and task state is
    /// left as it was; the error is also returned to the caller.
    pub async fn dispatch(&mut self, msg: Msg) -> Result<(), CollectionError> {
        let cmd = self.model.update(msg);
        let result = self.run(cmd).await;
        if let Err(error) = &result {
            tracing::warn!(%error, "task command failed");
            self.model.update(Msg::Error(error.to_string()));
        }
        result
    }

    /// Wait for the next snapshot and apply it.
    pub async fn next_snapshot(&mut self) {
        if let Some(msg) = self.events_rx.recv().await {
            self.model.update(msg);
        }
    }

    /// Apply every snapshot already delivered. Returns how many were applied.
    pub fn drain_snapshots(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(msg) = self.events_rx.try_recv() {
            self.model.update(msg);
            applied += 1;
        }
        applied
    }

    async fn run(&mut self, cmd: Cmd) -> Result<(), CollectionError> {
        match cmd {
            Cmd::None => Ok(()),
            Cmd::Subscribe(user_id) => {
                // The old view goes first so it cannot deliver after the new one starts.
                self.teardown();
                let events = self.events_tx.clone();
                let owner = user_id.clone();
                let subscription = self
                    .store
                    .subscribe(&user_id, move |tasks| {
                        let _ = events.send(Msg::TasksLoaded {
                            user_id: owner.clone(),
                            tasks,
                        });
                    })
                    .await?;
                self.subscription = Some(subscription);
                Ok(())
            }
            Cmd::Unsubscribe => {
                self.teardown();
                Ok(())
            }
            Cmd::AddTask {
                title,
                description,
                user_id,
            } => self.store.add(&title, &description, &user_id).await.map(|_| ()),
            Cmd::UpdateStatus { id, status } => self.store.move_to_status(id, status).await,
            Cmd::UpdateContent { id, content } => self.store.update_content(id, content).await,
            Cmd::DeleteTask(id) => self.store.delete(id).await,
        }
    }

    fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
