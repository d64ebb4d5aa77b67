pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod secret;
pub mod storage;

pub use config::{RemoteConfig, RemoteResolver, SyncSettings};
pub use core::{plan, ComparePolicy, SyncConfig, SyncEngine, SyncReport, SyncTask};
pub use error::TransportError;
pub use storage::{RemoteMeta, RemoteStore, WebDavStore};
