// src/primitives/mod.rs

//! Specialised tasks built on the same task abstraction.
//!
//! - [`Wait`] holds a worker slot for a duration or until a predicate holds.
//! - [`Repeat`] runs a block on the affinity context at a fixed interval.
//! - [`Observe`] polls a value and reports changes on the affinity context.
//! - [`Compound`] gives a group of child tasks single-task semantics.

pub mod compound;
pub mod observe;
pub mod repeat;
pub mod wait;

pub use compound::Compound;
pub use observe::{Observe, Observer};
pub use repeat::Repeat;
pub use wait::Wait;

/// Predicate polled by the timing primitives.
pub(crate) type Predicate = Box<dyn Fn() -> bool + Send + Sync>;
