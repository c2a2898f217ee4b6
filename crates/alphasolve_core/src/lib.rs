//! Core domain logic for Alpha Solve.
//! Context propagation over the cell tree plus the collaborative sync layer.

pub mod config;
pub mod engine;
pub mod extension;
pub mod logging;
pub mod model;
pub mod service;
pub mod sync;
pub mod tree;

pub use config::{ConfigError, LogConfig, LogTarget, SessionConfig};
pub use engine::{propagate_all, propagate_from, PropagationError, PropagationReport};
pub use extension::builtin::{builtin_registry, BuiltinExecutor};
pub use extension::{
    CellFunctionResult, ExecutorError, FunctionExecutor, FunctionRegistry, MetaFunctionResult,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::cell::{Cell, CellId, CellKind, EquationCell, FolderCell, NoteCell};
pub use model::context::{Context, Variable, VariableType};
pub use model::project::{Project, ProjectId};
pub use service::session_service::{SessionService, SessionServiceError};
pub use sync::{Packet, PacketError, SyncEvent, SyncEventKind};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
