use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use shared::{TaskDocument, TaskId};

use crate::error::StoreError;

const KEY_PREFIX: &str = "task:";

fn key(id: TaskId) -> String {
    format!("{}{}", KEY_PREFIX, id)
}

/// Durable copy of the collection that every write goes through.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    async fn save(&self, document: &TaskDocument) -> Result<(), StoreError>;

    async fn remove(&self, id: TaskId) -> Result<(), StoreError>;
}

/// Write-through copy of the collection in redis, one JSON value per task.
#[derive(Clone)]
pub struct RedisPersistence {
    conn: MultiplexedConnection,
}

impl RedisPersistence {
    pub async fn open(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    /// Every stored document. Values that no longer parse are skipped.
    pub async fn load_all(&self) -> Result<Vec<TaskDocument>, StoreError> {
        let mut conn = self.conn.clone();

        let keys: Vec<String> = conn.keys(format!("{}*", KEY_PREFIX)).await?;
        let mut documents = Vec::with_capacity(keys.len());

        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            let Some(raw) = raw else { continue };
            match serde_json::from_str::<TaskDocument>(&raw) {
                Ok(document) => documents.push(document),
                Err(e) => tracing::warn!(%key, error = %e, "skipping unreadable task document"),
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl Persistence for RedisPersistence {
    async fn save(&self, document: &TaskDocument) -> Result<(), StoreError> {
        let json = serde_json::to_string(document)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(key(document.id), json).await?;
        Ok(())
    }

    async fn remove(&self, id: TaskId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: usize = conn.del(key(id)).await?;
        Ok(())
    }
}
