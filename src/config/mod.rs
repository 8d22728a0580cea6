// src/config/mod.rs

//! Configuration for executors and plan files.
//!
//! Responsibilities:
//! - Define the executor configuration used by the library (`executor.rs`).
//! - Define the TOML-backed plan file model (`model.rs`).
//! - Load a plan file from disk (`loader.rs`).
//! - Validate plan invariants like DAG correctness (`validate.rs`).

pub mod duration;
pub mod executor;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use executor::{ExecutorConfig, Timing};
pub use loader::{default_plan_path, load_and_validate, load_from_path};
pub use model::{ExecutorSection, PlanFile, RawPlanFile, TaskSpec};
