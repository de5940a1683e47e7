//! Task system — supervised execution of named long-running work.
//!
//! Core components:
//! - `state` — Task status state machine (Running → Succeeded/Failed/Cancelled)
//! - `executor` — The unit of work a task runs
//! - `reporter` — Terminal outcome and the collaborator that receives it
//! - `manager` — Registry, cancellation and supervision

pub mod executor;
pub mod manager;
pub mod reporter;
pub mod state;

pub use executor::TaskExecutor;
pub use manager::TaskManager;
pub use reporter::{CANCELLED_ERROR, OutcomeReporter, TaskOutcome};
pub use state::{TaskAssignment, TaskRecord, TaskStatus};
