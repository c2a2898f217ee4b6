//! Project aggregate.
//!
//! # Responsibility
//! - Own the top-level cell sequence of one editing session.
//!
//! # Invariants
//! - The project exclusively owns its cell tree.
//! - `updated_at` is refreshed whenever the tree structure or a cell changes.

use crate::model::cell::Cell;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable project identifier, also used as a sync connection parameter.
pub type ProjectId = Uuid;

/// Root aggregate of a collaborative document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub cells: Vec<Cell>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates an empty project with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    /// Creates an empty project with a caller-provided id.
    ///
    /// Used when the id is dictated by the sync session.
    pub fn with_id(id: ProjectId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            cells: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_cells(mut self, cells: Vec<Cell>) -> Self {
        self.cells = cells;
        self
    }

    /// Refreshes `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Counts every cell in the tree, folders and their descendants included.
    pub fn cell_count(&self) -> usize {
        fn count(cells: &[Cell]) -> usize {
            cells
                .iter()
                .map(|cell| 1 + cell.children().map(count).unwrap_or(0))
                .sum()
        }
        count(&self.cells)
    }
}
