//! First-party executor with assignment and evaluation functions.
//!
//! # Responsibility
//! - Provide a local `FunctionExecutor` so sessions work without a plugin runtime.
//! - Normalize common LaTeX notation before evaluation.
//!
//! # Invariants
//! - Meta functions never allocate contexts or touch solutions.
//! - Unknown function names fail with `ExecutorError::UnknownFunction`.

use crate::extension::executor::{
    CellFunctionResult, ExecutorError, FunctionExecutor, MetaFunctionResult,
};
use crate::extension::expression::{evaluate, format_number};
use crate::extension::registry::{
    FunctionDescriptor, FunctionRegistry, ProcMacroDescriptor, RegistryError,
};
use crate::model::context::{Context, Variable};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

pub const SOLVE: &str = "solve";
pub const SOLVE_META: &str = "solve_meta";
pub const EVALUATE: &str = "evaluate";
pub const EVALUATE_META: &str = "evaluate_meta";
pub const LATEX_NORMALIZE: &str = "latex_normalize";

static ASSIGNMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(\S.*?)\s*$").expect("valid assignment regex")
});
static LEFT_RIGHT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\left|\\right").expect("valid left/right regex"));
static FRAC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\frac\{([^{}]*)\}\{([^{}]*)\}").expect("valid frac regex")
});
static SQRT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\sqrt\{([^{}]*)\}").expect("valid sqrt regex"));
static BRACED_EXPONENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\^\{([^{}]*)\}").expect("valid exponent regex"));
static COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\([A-Za-z]+)").expect("valid command regex"));

const MAX_FRAC_PASSES: usize = 10;

/// Registry wiring every built-in function and proc macro.
pub fn builtin_registry() -> Result<FunctionRegistry, RegistryError> {
    let mut registry = FunctionRegistry::new();
    registry.register_proc_macro(ProcMacroDescriptor::new(LATEX_NORMALIZE))?;
    registry.register_function(FunctionDescriptor::new(SOLVE, SOLVE_META))?;
    registry.register_function(FunctionDescriptor::new(EVALUATE, EVALUATE_META))?;
    Ok(registry)
}

/// Built-in executor backed by [`evaluate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinExecutor;

impl BuiltinExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FunctionExecutor for BuiltinExecutor {
    async fn call_meta(
        &self,
        function_name: &str,
        text: &str,
        _context: &Context,
    ) -> Result<MetaFunctionResult, ExecutorError> {
        match function_name {
            SOLVE_META => Ok(if ASSIGNMENT_RE.is_match(text) {
                MetaFunctionResult::usable(0, "Solve assignment")
            } else {
                MetaFunctionResult::unusable("Solve assignment")
            }),
            EVALUATE_META => Ok(if !text.trim().is_empty() && !text.contains('=') {
                MetaFunctionResult::usable(1, "Evaluate expression")
            } else {
                MetaFunctionResult::unusable("Evaluate expression")
            }),
            other => Err(ExecutorError::UnknownFunction(other.to_string())),
        }
    }

    async fn call_main(
        &self,
        function_name: &str,
        text: &str,
        context: &Context,
    ) -> Result<CellFunctionResult, ExecutorError> {
        match function_name {
            SOLVE => solve(text, context),
            EVALUATE => {
                let value = evaluate(text, context).map_err(|err| ExecutorError::Failed {
                    function: EVALUATE.to_string(),
                    message: err.to_string(),
                })?;
                Ok(CellFunctionResult {
                    visible_solutions: Some(vec![format_number(value)]),
                    new_context: None,
                })
            }
            other => Err(ExecutorError::UnknownFunction(other.to_string())),
        }
    }

    async fn call_proc_macro(
        &self,
        function_name: &str,
        text: &str,
        _context: &Context,
    ) -> Result<String, ExecutorError> {
        match function_name {
            LATEX_NORMALIZE => Ok(normalize_latex(text)),
            other => Err(ExecutorError::UnknownFunction(other.to_string())),
        }
    }
}

fn solve(text: &str, context: &Context) -> Result<CellFunctionResult, ExecutorError> {
    let captures = ASSIGNMENT_RE
        .captures(text)
        .ok_or_else(|| ExecutorError::InvalidResult {
            function: SOLVE.to_string(),
            message: "cell text is not an assignment".to_string(),
        })?;
    let name = &captures[1];
    let expression = &captures[2];

    let variable = match evaluate(expression, context) {
        Ok(value) => Variable::numerical(name, format_number(value)),
        Err(_) => Variable::analytical(name, expression),
    };
    let solution = format!(
        "{} = {}",
        variable.name,
        variable.first_value().unwrap_or_default()
    );
    Ok(CellFunctionResult {
        visible_solutions: Some(vec![solution]),
        new_context: Some(context.with_variable(variable)),
    })
}

/// Rewrites common LaTeX notation into plain arithmetic.
pub fn normalize_latex(text: &str) -> String {
    let mut out = LEFT_RIGHT_RE.replace_all(text, "").into_owned();
    for _ in 0..MAX_FRAC_PASSES {
        if !out.contains("\\frac") {
            break;
        }
        out = FRAC_RE.replace_all(&out, "(($1)/($2))").into_owned();
    }
    out = SQRT_RE.replace_all(&out, "sqrt($1)").into_owned();
    out = out.replace("\\cdot", "*").replace("\\times", "*");
    out = BRACED_EXPONENT_RE.replace_all(&out, "^($1)").into_owned();
    out = out.replace('π', "pi");
    out = COMMAND_RE.replace_all(&out, "$1").into_owned();
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{builtin_registry, normalize_latex, BuiltinExecutor, SOLVE, SOLVE_META};
    use crate::extension::executor::FunctionExecutor;
    use crate::model::context::{Context, Variable, VariableType};

    #[test]
    fn normalizes_fractions_roots_and_operators() {
        assert_eq!(normalize_latex(r"\frac{1}{2}"), "((1)/(2))");
        assert_eq!(normalize_latex(r"\sqrt{x} \cdot 2"), "sqrt(x) * 2");
        assert_eq!(normalize_latex(r"x^{2} \times \pi"), "x^(2) * pi");
        assert_eq!(normalize_latex(r"\left(a\right)"), "(a)");
    }

    #[test]
    fn registry_lists_solve_before_evaluate() {
        let registry = builtin_registry().expect("builtin registry");
        assert_eq!(registry.functions()[0].function_name, SOLVE);
        assert_eq!(registry.functions().len(), 2);
        assert_eq!(registry.proc_macros().len(), 1);
    }

    #[tokio::test]
    async fn solve_meta_only_accepts_assignments() {
        let executor = BuiltinExecutor::new();
        let context = Context::empty();
        assert!(executor.call_meta(SOLVE_META, "x = 2", &context).await.unwrap().use_result);
        assert!(!executor.call_meta(SOLVE_META, "x + 2", &context).await.unwrap().use_result);
    }

    #[tokio::test]
    async fn solve_falls_back_to_analytical_values() {
        let executor = BuiltinExecutor::new();
        let context = Context::empty().with_variable(Variable::numerical("x", "2"));
        let result = executor
            .call_main(SOLVE, "y = a * x", &context)
            .await
            .expect("solve result");
        let new_context = result.new_context.expect("new context");
        let y = new_context.get("y").expect("y variable");
        assert_eq!(y.kind, VariableType::Analytical);
        assert_eq!(y.values, vec!["a * x".to_string()]);
        assert_eq!(result.visible_solutions, Some(vec!["y = a * x".to_string()]));
    }
}
