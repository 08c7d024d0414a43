//! Task document backend: owns every user's task documents, assigns ids, and
//! serves user-scoped live queries over server-sent events.

pub mod config;
pub mod error;
pub mod live;
pub mod persist;
pub mod routes;
pub mod store;

pub use config::ServerConfig;
pub use error::{ApiError, StoreError};
pub use persist::{Persistence, RedisPersistence};
pub use routes::{build_router, AppState, SharedState};
pub use store::DocumentStore;
