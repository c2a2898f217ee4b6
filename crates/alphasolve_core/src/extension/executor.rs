//! Function executor contract.
//!
//! The executor is the external capability that actually performs symbolic or
//! numeric computation. Core code only ever talks to it through this trait and
//! treats every failure as "no usable result".

use crate::model::context::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Eligibility answer from a meta function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFunctionResult {
    /// Priority index; lower wins.
    pub index: i64,
    /// Human-readable candidate name.
    pub name: String,
    #[serde(default = "default_use_result")]
    pub use_result: bool,
}

fn default_use_result() -> bool {
    true
}

impl MetaFunctionResult {
    pub fn usable(index: i64, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            use_result: true,
        }
    }

    pub fn unusable(name: impl Into<String>) -> Self {
        Self {
            index: 0,
            name: name.into(),
            use_result: false,
        }
    }
}

/// Output of a main cell function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellFunctionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_solutions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_context: Option<Context>,
}

/// Failure of one executor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// No function with this name is loaded in the executor.
    UnknownFunction(String),
    /// The function ran and raised.
    Failed { function: String, message: String },
    /// The function returned something that cannot be interpreted.
    InvalidResult { function: String, message: String },
}

impl Display for ExecutorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFunction(name) => write!(f, "unknown executor function: {name}"),
            Self::Failed { function, message } => {
                write!(f, "executor function `{function}` failed: {message}")
            }
            Self::InvalidResult { function, message } => {
                write!(f, "executor function `{function}` returned invalid result: {message}")
            }
        }
    }
}

impl Error for ExecutorError {}

/// External computation capability consumed by function resolution.
///
/// Every method is a suspension point. Implementations must keep meta calls
/// side-effect free; they run once per registered function per equation cell.
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    /// Asks a meta function whether its companion applies to `text`.
    async fn call_meta(
        &self,
        function_name: &str,
        text: &str,
        context: &Context,
    ) -> Result<MetaFunctionResult, ExecutorError>;

    /// Runs a main cell function.
    async fn call_main(
        &self,
        function_name: &str,
        text: &str,
        context: &Context,
    ) -> Result<CellFunctionResult, ExecutorError>;

    /// Runs a text-transform (proc macro) function and returns the new text.
    async fn call_proc_macro(
        &self,
        function_name: &str,
        text: &str,
        context: &Context,
    ) -> Result<String, ExecutorError>;
}
