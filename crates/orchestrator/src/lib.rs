//! Sync orchestration.
//!
//! This crate sequences calls between the pure stages in [`pipeline`]
//! (filtering, prompt composition) and the infrastructure ports (task source,
//! summariser, stores, trigger host, notifier). It contains no domain rules
//! of its own and no I/O of its own.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Depends only on the port traits; the composition
//! root (`cli`) supplies concrete adapters.
//!
//! ## Components
//!
//! | Type | Role |
//! |------|------|
//! | [`SyncOrchestrator`] | One pass of fetch → filter → compose → summarise |
//! | [`OrchestratorFactory`] | Builds an orchestrator from the current settings |
//! | [`SyncScheduler`] | Owns the recurring trigger, runs scheduled syncs, records history, notifies |
//!
//! ## Data Flow
//!
//! ```text
//! trigger fires
//!   └─► SyncScheduler::reconcile_schedule (skip if cleared or rescheduled)
//!   └─► SyncScheduler::run_sync
//!         ├─ take the run permit (in-process guard + SyncLock)
//!         ├─ load settings, build SyncOrchestrator
//!         ├─ for each target project:
//!         │     run_filtered ──► TaskSource → TaskFilter → PromptComposer → Summarizer
//!         │     append result to bounded history (one store update)
//!         ├─ record last-sync time
//!         └─ success / failure notification
//! ```

pub mod notification;
pub mod scheduler;
pub mod sync;

pub use notification::Notification;
pub use scheduler::{SchedulerConfig, SchedulerPorts, SyncScheduler};
pub use sync::{OrchestratorFactory, SyncOrchestrator, SUMMARY_UNAVAILABLE};
