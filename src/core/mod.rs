pub mod comparator;
pub mod engine;
pub mod planner;
pub mod retry;

pub use comparator::{content_hash, should_skip, ComparePolicy};
pub use engine::{SyncConfig, SyncEngine, SyncReport};
pub use planner::{plan, SyncTask};
pub use retry::RetryPolicy;
