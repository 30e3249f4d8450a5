//! CLI command implementations
//!
//! Thin layer over the library: each command builds a `CommandContext`,
//! calls into the core, and renders the result. Exit codes are handled
//! in `main`.

pub mod context;
pub mod integration;
pub mod mr;
pub mod queue;
pub mod run;
pub mod style;
