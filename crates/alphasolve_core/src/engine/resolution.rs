//! Function resolution for one equation cell.
//!
//! # Responsibility
//! - Run proc macros over the cell text.
//! - Ask every registered meta function for eligibility and pick one winner.
//! - Run the winner and fold its result into the cell.
//!
//! # Invariants
//! - Lowest priority index wins; ties go to the earliest registration.
//! - Executor failures are logged and degrade to pass-through, never raised.
//! - The stored cell text is never rewritten by proc macros.

use crate::extension::executor::{FunctionExecutor, MetaFunctionResult};
use crate::extension::registry::{FunctionDescriptor, FunctionRegistry};
use crate::logging::loggable_error;
use crate::model::cell::EquationCell;
use crate::model::context::Context;
use chrono::Utc;
use log::{debug, warn};

/// How a resolution step ended, for callers that report on propagation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// No registered function claimed the cell.
    PassThrough,
    /// The named function ran and its result was applied.
    Applied { function_name: String },
    /// The selected function failed; the cell fell back to pass-through.
    Failed { function_name: String },
}

/// Result of resolving one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Context handed to the next cell in document order.
    pub context: Context,
    pub outcome: ResolutionOutcome,
}

/// Selects the winning candidate among meta results.
///
/// `candidates` must be in registration order. Returns the position in that
/// slice of the usable candidate with the lowest index.
pub fn select_candidate(candidates: &[Option<MetaFunctionResult>]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter_map(|(position, result)| match result {
            Some(meta) if meta.use_result => Some((position, meta.index)),
            _ => None,
        })
        // `min_by_key` keeps the first of equal keys, which is the tie rule.
        .min_by_key(|(_, index)| *index)
        .map(|(position, _)| position)
}

/// Applies eligible proc macros to `text` in priority order.
pub async fn apply_proc_macros(
    text: &str,
    preceding: &Context,
    registry: &FunctionRegistry,
    executor: &dyn FunctionExecutor,
) -> String {
    let mut eligible: Vec<(i64, &str)> = Vec::new();
    for descriptor in registry.proc_macros() {
        match &descriptor.meta_function_name {
            None => eligible.push((0, descriptor.function_name.as_str())),
            Some(meta_name) => match executor.call_meta(meta_name, text, preceding).await {
                Ok(meta) if meta.use_result => {
                    eligible.push((meta.index, descriptor.function_name.as_str()))
                }
                Ok(_) => {}
                Err(err) => warn!(
                    "event=proc_macro_meta module=engine status=error function={} error={}",
                    meta_name,
                    loggable_error(&err)
                ),
            },
        }
    }
    eligible.sort_by_key(|(index, _)| *index);

    let mut current = text.to_string();
    for (_, function_name) in eligible {
        match executor
            .call_proc_macro(function_name, &current, preceding)
            .await
        {
            Ok(next) => current = next,
            Err(err) => warn!(
                "event=proc_macro module=engine status=error function={} error={}",
                function_name,
                loggable_error(&err)
            ),
        }
    }
    current
}

/// Resolves one equation cell against the context preceding it.
pub async fn resolve_equation(
    cell: &mut EquationCell,
    preceding: &Context,
    registry: &FunctionRegistry,
    executor: &dyn FunctionExecutor,
) -> Resolution {
    let text = apply_proc_macros(&cell.text, preceding, registry, executor).await;

    let mut candidates = Vec::with_capacity(registry.functions().len());
    for descriptor in registry.functions() {
        candidates.push(call_meta(descriptor, &text, preceding, executor).await);
    }

    let Some(position) = select_candidate(&candidates) else {
        debug!(
            "event=resolve_cell module=engine status=skip cell_id={} candidates={}",
            cell.id,
            candidates.len()
        );
        cell.context = Some(preceding.clone());
        return Resolution {
            context: preceding.clone(),
            outcome: ResolutionOutcome::PassThrough,
        };
    };

    let function_name = registry.functions()[position].function_name.clone();
    match executor.call_main(&function_name, &text, preceding).await {
        Ok(result) => {
            let context = result.new_context.unwrap_or_else(|| preceding.clone());
            if let Some(solutions) = result.visible_solutions {
                cell.solutions = solutions;
            }
            cell.context = Some(context.clone());
            cell.updated_at = Utc::now();
            debug!(
                "event=resolve_cell module=engine status=ok cell_id={} function={} variables={}",
                cell.id,
                function_name,
                context.len()
            );
            Resolution {
                context,
                outcome: ResolutionOutcome::Applied { function_name },
            }
        }
        Err(err) => {
            warn!(
                "event=resolve_cell module=engine status=error cell_id={} function={} error={}",
                cell.id,
                function_name,
                loggable_error(&err)
            );
            cell.context = Some(preceding.clone());
            Resolution {
                context: preceding.clone(),
                outcome: ResolutionOutcome::Failed { function_name },
            }
        }
    }
}

async fn call_meta(
    descriptor: &FunctionDescriptor,
    text: &str,
    preceding: &Context,
    executor: &dyn FunctionExecutor,
) -> Option<MetaFunctionResult> {
    match executor
        .call_meta(&descriptor.meta_function_name, text, preceding)
        .await
    {
        Ok(meta) => Some(meta),
        Err(err) => {
            warn!(
                "event=function_meta module=engine status=error function={} error={}",
                descriptor.meta_function_name,
                loggable_error(&err)
            );
            None
        }
    }
}
