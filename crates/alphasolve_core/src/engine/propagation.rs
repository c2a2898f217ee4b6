//! Context propagation across the cell tree.
//!
//! # Responsibility
//! - Walk cells in document order from a start cell to the end of its array.
//! - Thread the running context through equation cells via function resolution.
//!
//! # Invariants
//! - Steps are strictly sequential; each resolution is awaited before the next.
//! - Context computed inside a folder never leaks to the folder's later siblings.
//! - A missing start cell fails before any cell is touched.

use crate::engine::resolution::{resolve_equation, ResolutionOutcome};
use crate::extension::executor::FunctionExecutor;
use crate::extension::registry::FunctionRegistry;
use crate::model::cell::{Cell, CellId};
use crate::model::context::Context;
use crate::model::project::Project;
use crate::tree;
use futures::future::{BoxFuture, FutureExt};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Fatal propagation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationError {
    /// The start cell does not exist anywhere in the project tree.
    CellNotFound(CellId),
}

impl Display for PropagationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CellNotFound(id) => write!(f, "propagation start cell not found: {id}"),
        }
    }
}

impl Error for PropagationError {}

/// Summary of one propagation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    pub start: CellId,
    /// Equation cells whose selected function ran successfully.
    pub applied: usize,
    /// Equation cells no function claimed.
    pub passed_through: usize,
    /// Equation cells whose selected function failed.
    pub failed: usize,
    /// Running context after the last cell of the start cell's array.
    pub final_context: Context,
}

impl PropagationReport {
    pub fn resolved(&self) -> usize {
        self.applied + self.passed_through + self.failed
    }
}

#[derive(Debug, Default)]
struct Tally {
    applied: usize,
    passed_through: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, outcome: &ResolutionOutcome) {
        match outcome {
            ResolutionOutcome::Applied { .. } => self.applied += 1,
            ResolutionOutcome::PassThrough => self.passed_through += 1,
            ResolutionOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Re-derives context for `cell_id` and every later cell in its array.
///
/// # Errors
/// - `CellNotFound` when `cell_id` is absent; the tree is left untouched.
pub async fn propagate_from(
    project: &mut Project,
    cell_id: CellId,
    registry: &FunctionRegistry,
    executor: &dyn FunctionExecutor,
) -> Result<PropagationReport, PropagationError> {
    let started_at = Instant::now();
    let Some((siblings, index)) = tree::siblings_mut(&mut project.cells, cell_id) else {
        warn!(
            "event=propagate module=engine status=error cell_id={} error_code=cell_not_found",
            cell_id
        );
        return Err(PropagationError::CellNotFound(cell_id));
    };

    let seed = seed_context(&siblings[..index]);
    let mut tally = Tally::default();
    let final_context = walk(&mut siblings[index..], seed, registry, executor, &mut tally).await;
    project.touch();

    info!(
        "event=propagate module=engine status=ok cell_id={} applied={} passed_through={} failed={} duration_ms={}",
        cell_id,
        tally.applied,
        tally.passed_through,
        tally.failed,
        started_at.elapsed().as_millis()
    );
    Ok(PropagationReport {
        start: cell_id,
        applied: tally.applied,
        passed_through: tally.passed_through,
        failed: tally.failed,
        final_context,
    })
}

/// Re-derives context for the whole project from the first top-level cell.
///
/// Returns `None` for an empty project.
pub async fn propagate_all(
    project: &mut Project,
    registry: &FunctionRegistry,
    executor: &dyn FunctionExecutor,
) -> Option<PropagationReport> {
    let first = project.cells.first()?.id();
    propagate_from(project, first, registry, executor).await.ok()
}

/// Nearest stored equation context before the start index, else empty.
///
/// Folders in `preceding` are skipped: their inner results are not visible
/// to later siblings.
pub fn seed_context(preceding: &[Cell]) -> Context {
    preceding
        .iter()
        .rev()
        .find_map(Cell::stored_context)
        .cloned()
        .unwrap_or_else(Context::empty)
}

fn walk<'a>(
    cells: &'a mut [Cell],
    seed: Context,
    registry: &'a FunctionRegistry,
    executor: &'a dyn FunctionExecutor,
    tally: &'a mut Tally,
) -> BoxFuture<'a, Context> {
    async move {
        let mut running = seed;
        for cell in cells.iter_mut() {
            match cell {
                Cell::Equation(equation) => {
                    let resolution =
                        resolve_equation(equation, &running, registry, executor).await;
                    tally.record(&resolution.outcome);
                    running = resolution.context;
                }
                Cell::Folder(folder) => {
                    // Inner result is dropped; later siblings keep `running`.
                    walk(&mut folder.cells, running.clone(), registry, executor, tally).await;
                }
                Cell::Note(_) => {}
            }
        }
        running
    }
    .boxed()
}
