//! Context-propagation engine.
//!
//! # Responsibility
//! - Resolve which registered function computes each equation cell
//!   (`resolution`).
//! - Drive resolution over the tree in document order (`propagation`).
//!
//! # Invariants
//! - Only a missing start cell is fatal; per-cell failures are absorbed.
//! - Propagation never emits sync packets by itself.

pub mod propagation;
pub mod resolution;

pub use propagation::{propagate_all, propagate_from, PropagationError, PropagationReport};
pub use resolution::{resolve_equation, Resolution, ResolutionOutcome};
