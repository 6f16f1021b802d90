//! anvil-lib: Target graph, planner and scheduler for anvil
//!
//! This crate provides the build-automation core:
//! - `target`: declaring targets and their relationships
//! - `graph`: validating declarations into an immutable target graph
//! - `params`: declaring and resolving build parameters
//! - `plan`: computing the ordered execution plan for requested targets
//! - `execute`: walking a plan and reporting every target's outcome
//! - `partition`: splitting work items across shards
//! - `run`: the invocation entry point tying them together

pub mod consts;
pub mod execute;
pub mod graph;
pub mod params;
pub mod partition;
pub mod plan;
pub mod run;
pub mod target;

pub use run::{BuildDefinition, Error, Invocation, Prepared, prepare, run};
