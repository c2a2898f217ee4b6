//! Document domain model.
//!
//! # Responsibility
//! - Define the project tree, cell kinds and context values shared by the
//!   propagation engine and the sync layer.
//!
//! # Invariants
//! - Every cell is identified by a `CellId` unique across the whole tree.
//! - Timestamps serialize as ISO-8601 strings; round-trips are lossless.

pub mod cell;
pub mod context;
pub mod project;
