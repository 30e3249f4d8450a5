//! Merge processor ("the Engineer")
//!
//! Drives one claimed merge request through rebase, gates, and merge.
//! Split in two:
//! 1. Plan - describe the steps for this merge request (pure, testable)
//! 2. Execute - perform them against git and the issue store (effectful)

mod execute;
mod plan;

pub use execute::{Engineer, ProcessOutcome};
pub use plan::{create_process_plan, ProcessPlan, ProcessStep};
