//! Client side of the task board: the store client that reads and writes the
//! task collection, and the controller deriving list and board views from its
//! live snapshots.

pub mod board;
pub mod config;
pub mod controller;
pub mod remote;
pub mod store;

pub use board::TaskBoard;
pub use config::ClientConfig;
pub use controller::{filter_tasks, Cmd, EditDraft, Model, Msg, TaskCounts, TaskFilter};
pub use remote::RemoteCollection;
pub use store::{Subscription, TaskStore};
