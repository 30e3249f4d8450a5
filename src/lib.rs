//! refinery - a merge-queue scheduler for autonomous coding-agent workers
//!
//! Workers submit finished branches as merge requests; refinery processes
//! serialize them onto a shared target: claim with a time-bounded lease,
//! rebase, run validation gates, merge or route the failure. Conflicts
//! spawn a conflict task and a fresh dispatch instead of an in-place
//! retry. Epic-scoped work batches onto integration branches that land
//! on main as one atomic merge.

pub mod anomaly;
pub mod claim;
pub mod config;
pub mod convoy;
pub mod daemon;
pub mod engineer;
pub mod error;
pub mod gate;
pub mod git;
pub mod integration;
pub mod notify;
pub mod store;
pub mod submit;
pub mod types;
