//! Aggregates every sub-crate's error enum at the CLI boundary
//! (SPEC_FULL.md §4.2). Lives in the root crate rather than `burrow-core`:
//! `burrow-core` is the base dependency every other crate builds on, so an
//! aggregate error naming `burrow-executor`/`burrow-scheduler` types there
//! would invert the dependency graph into a cycle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BurrowError {
    #[error(transparent)]
    Settings(#[from] crate::config::SettingsError),
    #[error(transparent)]
    Service(#[from] burrow_core::traits::ServiceError),
    #[error(transparent)]
    Routine(#[from] burrow_routine::RoutineError),
    #[error(transparent)]
    Executor(#[from] burrow_executor::ExecutorError),
    #[error(transparent)]
    Scheduler(#[from] burrow_scheduler::SchedulerError),
    #[error("no routine named {0:?} in the routines directory")]
    RoutineNotFound(String),
}
