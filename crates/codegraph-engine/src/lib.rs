//! codegraph-engine: Keeps the code graph in step with the source tree.
//!
//! # Architecture
//!
//! - **upsert**: Per-file contribution diff applied in one store transaction
//! - **symbols**: Qualified-name lookup over committed store state
//! - **tracker**: Per-file state machine and fingerprint table
//! - **indexer**: read -> fingerprint -> parse -> resolve -> apply for one file
//! - **scheduler**: Worker pool with per-file serialization and retries
//! - **service**: JSON context service and background indexing jobs

pub mod indexer;
pub mod scheduler;
pub mod service;
pub mod symbols;
pub mod tracker;
pub mod upsert;

pub use indexer::{FileOutcome, Indexer};
pub use scheduler::{ReconcileSummary, Scheduler, SchedulerStatus};
pub use service::{ContextService, Job, JobState, Request, Response};
pub use symbols::StoreSymbols;
pub use tracker::{ChangeTracker, FailedFile};
pub use upsert::{CommitResult, GraphUpsertEngine};
