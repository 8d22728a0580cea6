// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum TaskweaveError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in plan: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Task {0} was already submitted to an executor")]
    AlreadySubmitted(TaskId),

    #[error("Executor has been shut down")]
    ExecutorShutDown,

    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskweaveError>;
