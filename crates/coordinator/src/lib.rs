//! Review pipeline coordinator.
//!
//! The coordinator owns one run at a time:
//! 1. Decomposes the artifact into sub-tasks
//! 2. Dispatches them to a pool of workers, concurrently when the pool allows
//! 3. Aggregates the findings in submission order
//! 4. Hands the aggregate to the validator
//! 5. Lets the synthesizer build the final report
//!
//! # Architecture
//!
//! ```text
//!        Artifact
//!           │
//!           ▼
//! ┌───────────────────┐
//! │    Coordinator    │  ◄── decomposition call
//! │   (this crate)    │
//! └─────────┬─────────┘
//!           │ WorkerPool (i % n)
//!     ┌─────┴─────┬──────────┐
//!     ▼           ▼          ▼
//! [Worker 1]  [Worker 2]  [Worker n]
//!     └─────┬─────┴──────────┘
//!           ▼
//!   Validator ─▶ Synthesizer ─▶ Report
//! ```

pub mod config;
pub mod dispatch;
pub mod pipeline;

pub use config::{ReviewConfig, RoleSettings};
pub use dispatch::WorkerPool;
pub use pipeline::{plan_sub_tasks, Coordinator, Stage};
pub use tokio_util::sync::CancellationToken;
