pub mod cache;
pub mod classify;
pub mod config;
pub mod draft;
pub mod engine;
pub mod errors;
pub mod init;
pub mod logging;
pub mod remote;
pub mod savers;
pub mod scheduler;

pub use classify::{Classification, ErrorCategory, RecommendedAction, classify, classify_failure};
pub use engine::{DraftEngine, SyncAttempt, SyncEvent, SyncState};
pub use scheduler::{AutoSaveScheduler, AutoSaveTimings, SchedulerHandle};
