// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::Result;

/// Load a plan file from a given path and return the raw `RawPlanFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlanFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let plan: RawPlanFile = toml::from_str(&contents)?;

    Ok(plan)
}

/// Load a plan file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - unknown or self `after` references,
///   - DAG cycles,
///   - executor sanity (ceilings, batch sizes, durations).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanFile> {
    let raw = load_from_path(&path)?;
    let plan = PlanFile::try_from(raw)?;
    Ok(plan)
}

/// `Taskweave.toml` in the current working directory.
pub fn default_plan_path() -> PathBuf {
    PathBuf::from("Taskweave.toml")
}
