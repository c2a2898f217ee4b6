//! Cell tree lookup and splice primitives.
//!
//! # Responsibility
//! - Locate cells by id anywhere in the nested folder structure.
//! - Hand out the exact containing array of a cell so callers can splice it.
//!
//! # Invariants
//! - Searches run in document order (pre-order, depth-first); first match wins.
//! - Every mutating helper validates before it touches the array, so a
//!   returned error always means the tree is unchanged.

use crate::model::cell::{Cell, CellId};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by tree primitives.
pub type TreeResult<T> = Result<T, TreeError>;

/// Lookup and validation errors from tree primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// No cell with this id exists in the searched tree.
    CellNotFound(CellId),
    /// The parent folder id of an insert/delete does not exist.
    FolderNotFound(CellId),
    /// The parent id exists but does not name a folder.
    NotAFolder(CellId),
    /// Target index lies outside the array bounds.
    IndexOutOfBounds { index: usize, len: usize },
    /// A cell with this id already exists somewhere in the tree.
    DuplicateCellId(CellId),
}

impl TreeError {
    /// Returns whether this is a lookup failure rather than a validation failure.
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::CellNotFound(_) | Self::FolderNotFound(_))
    }
}

impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CellNotFound(id) => write!(f, "cell not found: {id}"),
            Self::FolderNotFound(id) => write!(f, "parent folder not found: {id}"),
            Self::NotAFolder(id) => write!(f, "parent cell is not a folder: {id}"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for array of length {len}")
            }
            Self::DuplicateCellId(id) => write!(f, "cell id already present in tree: {id}"),
        }
    }
}

impl Error for TreeError {}

/// Read-only view of one located cell and the array that holds it.
#[derive(Debug, Clone, Copy)]
pub struct CellLocation<'a> {
    pub cell: &'a Cell,
    pub siblings: &'a [Cell],
    pub index: usize,
}

/// Finds the first cell with `id` in document order.
pub fn find_by_id(cells: &[Cell], id: CellId) -> Option<&Cell> {
    find_with_parent(cells, id).map(|location| location.cell)
}

/// Finds a cell together with its containing array and index.
pub fn find_with_parent(cells: &[Cell], id: CellId) -> Option<CellLocation<'_>> {
    for (index, cell) in cells.iter().enumerate() {
        if cell.id() == id {
            return Some(CellLocation {
                cell,
                siblings: cells,
                index,
            });
        }
        if let Some(children) = cell.children() {
            if let Some(found) = find_with_parent(children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Returns the folder holding `id`: `Some(None)` at top level, `None` when absent.
pub fn parent_id_of(cells: &[Cell], id: CellId) -> Option<Option<CellId>> {
    fn search(cells: &[Cell], id: CellId, parent: Option<CellId>) -> Option<Option<CellId>> {
        for cell in cells {
            if cell.id() == id {
                return Some(parent);
            }
            if let Some(children) = cell.children() {
                if let Some(found) = search(children, id, Some(cell.id())) {
                    return Some(found);
                }
            }
        }
        None
    }
    search(cells, id, None)
}

/// Mutable variant of [`find_by_id`].
pub fn find_by_id_mut(cells: &mut Vec<Cell>, id: CellId) -> Option<&mut Cell> {
    let (siblings, index) = siblings_mut(cells, id)?;
    siblings.get_mut(index)
}

/// Returns the containing array of `id` and its index, mutably.
pub fn siblings_mut(cells: &mut Vec<Cell>, id: CellId) -> Option<(&mut Vec<Cell>, usize)> {
    let mut path = path_to(cells, id)?;
    let index = path.pop()?;
    let siblings = array_at_mut(cells, &path)?;
    Some((siblings, index))
}

/// Resolves the array an insert/delete targets.
///
/// `None` means the top-level array; `Some(folder_id)` means that folder's
/// children.
pub fn target_array_mut(
    cells: &mut Vec<Cell>,
    parent: Option<CellId>,
) -> TreeResult<&mut Vec<Cell>> {
    let Some(parent_id) = parent else {
        return Ok(cells);
    };
    let folder = find_by_id_mut(cells, parent_id).ok_or(TreeError::FolderNotFound(parent_id))?;
    folder
        .children_mut()
        .ok_or(TreeError::NotAFolder(parent_id))
}

/// Inserts `cell` at `index` (`index == len` appends).
pub fn insert_at(array: &mut Vec<Cell>, index: usize, cell: Cell) -> TreeResult<()> {
    if index > array.len() {
        return Err(TreeError::IndexOutOfBounds {
            index,
            len: array.len(),
        });
    }
    array.insert(index, cell);
    Ok(())
}

/// Removes the direct child with `id` from `array`, returning it and its old index.
pub fn remove_by_id(array: &mut Vec<Cell>, id: CellId) -> TreeResult<(Cell, usize)> {
    let index = array
        .iter()
        .position(|cell| cell.id() == id)
        .ok_or(TreeError::CellNotFound(id))?;
    Ok((array.remove(index), index))
}

/// Visits every cell in document order.
pub fn for_each_cell<'a>(cells: &'a [Cell], visit: &mut impl FnMut(&'a Cell)) {
    for cell in cells {
        visit(cell);
        if let Some(children) = cell.children() {
            for_each_cell(children, visit);
        }
    }
}

/// Returns the first id of `candidate` (or its descendants) already present in
/// `cells`, or repeated inside `candidate` itself.
pub fn first_conflicting_id(cells: &[Cell], candidate: &Cell) -> Option<CellId> {
    first_duplicate(collect_ids(cells, None), candidate)
}

/// Like [`first_conflicting_id`] for a candidate that will replace the subtree
/// rooted at `replaced`; ids inside that subtree are free to be reused.
pub fn first_conflicting_replacement_id(
    cells: &[Cell],
    replaced: CellId,
    candidate: &Cell,
) -> Option<CellId> {
    first_duplicate(collect_ids(cells, Some(replaced)), candidate)
}

fn first_duplicate(mut seen: HashSet<CellId>, candidate: &Cell) -> Option<CellId> {
    let mut conflict = None;
    for_each_cell(std::slice::from_ref(candidate), &mut |cell| {
        if conflict.is_none() && !seen.insert(cell.id()) {
            conflict = Some(cell.id());
        }
    });
    conflict
}

fn collect_ids(cells: &[Cell], skip: Option<CellId>) -> HashSet<CellId> {
    fn walk(cells: &[Cell], skip: Option<CellId>, ids: &mut HashSet<CellId>) {
        for cell in cells {
            if Some(cell.id()) == skip {
                continue;
            }
            ids.insert(cell.id());
            if let Some(children) = cell.children() {
                walk(children, skip, ids);
            }
        }
    }
    let mut ids = HashSet::new();
    walk(cells, skip, &mut ids);
    ids
}

fn path_to(cells: &[Cell], id: CellId) -> Option<Vec<usize>> {
    for (index, cell) in cells.iter().enumerate() {
        if cell.id() == id {
            return Some(vec![index]);
        }
        if let Some(children) = cell.children() {
            if let Some(mut rest) = path_to(children, id) {
                rest.insert(0, index);
                return Some(rest);
            }
        }
    }
    None
}

fn array_at_mut<'a>(cells: &'a mut Vec<Cell>, folders: &[usize]) -> Option<&'a mut Vec<Cell>> {
    let mut current = cells;
    for &index in folders {
        current = current.get_mut(index)?.children_mut()?;
    }
    Some(current)
}
