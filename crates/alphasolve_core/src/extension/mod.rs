//! Function extension layer.
//!
//! # Responsibility
//! - Describe which plugin functions exist (`registry`).
//! - Define the boundary to the external computation runtime (`executor`).
//! - Ship a first-party executor usable without any plugin runtime (`builtin`).
//!
//! # Invariants
//! - Core never calls a function that is not listed in a `FunctionRegistry`.
//! - Executor failures never cross the function-resolution boundary.

pub mod builtin;
pub mod executor;
pub mod expression;
pub mod registry;

pub use executor::{CellFunctionResult, ExecutorError, FunctionExecutor, MetaFunctionResult};
pub use registry::{FunctionDescriptor, FunctionRegistry, ProcMacroDescriptor, RegistryError};
