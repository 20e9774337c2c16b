//! # cmdb-reconcile
//!
//! Finds relationships in a CMDB inventory whose two ends disagree on the
//! company NIT, and removes them from the inventory and from the service desk
//! that mirrors part of them.
//!
//! ## Design Philosophy
//!
//! - **Resilient download** - whole-transfer retry, a wall-clock budget, and
//!   recovery of truncated snapshots
//! - **Pure classification** - the same snapshot always yields the same result
//! - **One mode gate** - simulation never sends a mutating request, to either target
//! - **Event-driven** - consumers subscribe to events instead of scraping logs
//!
//! ## Quick Start
//!
//! ```no_run
//! use cmdb_reconcile::{Config, Reconciler, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.mode = RunMode::Simulation;
//!     config.apply_env(|key| std::env::var(key).ok())?;
//!
//!     let reconciler = Reconciler::new(config)?;
//!
//!     let mut events = reconciler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = reconciler.run().await?;
//!     println!("{:?}", report.summary());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Inventory authentication
pub mod auth;
/// Relationship classification
pub mod classify;
/// Configuration types
pub mod config;
/// Resilient snapshot download and truncation recovery
pub mod download;
/// Error types
pub mod error;
/// Deletion orchestration
pub mod orchestrator;
/// End-to-end run
pub mod pipeline;
/// Run reports
pub mod report;
/// Retry logic with a fixed delay
pub mod retry;
/// Snapshot decoding and indexing
pub mod snapshot;
/// Deletion targets
pub mod targets;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use auth::{InventoryAuthenticator, StaticToken, TokenProvider};
pub use classify::{Classification, Classifier, InconsistencyRule, NitMismatchRule};
pub use config::{Config, RetryPolicy, RunMode};
pub use download::{Downloader, FetchOutcome, FetchRequest};
pub use error::{DeleteError, Error, Result, TransportError};
pub use orchestrator::{OrchestrationResults, Orchestrator, plan_tasks};
pub use pipeline::Reconciler;
pub use report::{DirectoryReportWriter, ReportSink, RunReport, RunSummary};
pub use snapshot::Snapshot;
pub use targets::{DeletionTarget, InventoryTarget, ServiceDeskTarget};
pub use types::{
    ConfigurationItem, DeletionResult, DeletionStatus, DeletionTask, Event, InconsistencyKind,
    InconsistencyRecord, Relationship, ResultSummary, Stage, TargetKind,
};
