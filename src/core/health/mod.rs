//! Channel health: append-only log and the rolling probe scheduler

pub mod scheduler;
pub mod store;

pub use scheduler::{
    select_batch, BatchSelection, ChannelHealth, HealthReport, HealthScheduler, RunOutcome, RunSummary,
};
pub use store::{HealthLog, StoreError};
