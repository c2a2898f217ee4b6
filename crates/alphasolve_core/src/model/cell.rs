//! Cell domain model.
//!
//! # Responsibility
//! - Define the three cell kinds (equation, folder, note) as one tagged enum.
//! - Provide shared accessors and lifecycle helpers over all kinds.
//!
//! # Invariants
//! - `id` is unique across the whole project tree, not only among siblings.
//! - `updated_at` is refreshed on every user-visible or computed change.
//! - Unknown `type` discriminants fail deserialization instead of being dropped.

use crate::model::context::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for every cell in a project tree.
pub type CellId = Uuid;

/// Equation cell: source text plus the context computed after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquationCell {
    pub id: CellId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Source text as typed by the user (LaTeX-flavoured).
    pub text: String,
    /// `None` until the cell has been evaluated at least once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    /// Display-only solution strings; never read back by propagation.
    #[serde(default)]
    pub solutions: Vec<String>,
}

/// Folder cell: named, ordered group of child cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderCell {
    pub id: CellId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

/// Note cell: free-form text, inert for propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCell {
    pub id: CellId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub content: String,
}

/// Cell kind without payload, used for logging and dispatch decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Equation,
    Folder,
    Note,
}

impl CellKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equation => "equation",
            Self::Folder => "folder",
            Self::Note => "note",
        }
    }
}

/// One node of the project document tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cell {
    Equation(EquationCell),
    Folder(FolderCell),
    Note(NoteCell),
}

impl Cell {
    /// Creates an equation cell with a generated id and no context yet.
    pub fn equation(text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self::Equation(EquationCell {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            text: text.into(),
            context: None,
            solutions: Vec::new(),
        })
    }

    /// Creates a folder cell with a generated id.
    pub fn folder(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        let now = Utc::now();
        Self::Folder(FolderCell {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.into(),
            cells,
        })
    }

    /// Creates a note cell with a generated id.
    pub fn note(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self::Note(NoteCell {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            content: content.into(),
        })
    }

    pub fn id(&self) -> CellId {
        match self {
            Self::Equation(cell) => cell.id,
            Self::Folder(cell) => cell.id,
            Self::Note(cell) => cell.id,
        }
    }

    pub fn kind(&self) -> CellKind {
        match self {
            Self::Equation(_) => CellKind::Equation,
            Self::Folder(_) => CellKind::Folder,
            Self::Note(_) => CellKind::Note,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Equation(cell) => cell.created_at,
            Self::Folder(cell) => cell.created_at,
            Self::Note(cell) => cell.created_at,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::Equation(cell) => cell.updated_at,
            Self::Folder(cell) => cell.updated_at,
            Self::Note(cell) => cell.updated_at,
        }
    }

    /// Refreshes `updated_at` to now.
    pub fn touch(&mut self) {
        let now = Utc::now();
        match self {
            Self::Equation(cell) => cell.updated_at = now,
            Self::Folder(cell) => cell.updated_at = now,
            Self::Note(cell) => cell.updated_at = now,
        }
    }

    /// Returns the user-editable text of this cell.
    ///
    /// Equation text, note content, or folder name.
    pub fn editable_text(&self) -> &str {
        match self {
            Self::Equation(cell) => &cell.text,
            Self::Folder(cell) => &cell.name,
            Self::Note(cell) => &cell.content,
        }
    }

    /// Replaces the user-editable text and refreshes `updated_at`.
    pub fn set_editable_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        match self {
            Self::Equation(cell) => cell.text = text,
            Self::Folder(cell) => cell.name = text,
            Self::Note(cell) => cell.content = text,
        }
        self.touch();
    }

    pub fn as_equation(&self) -> Option<&EquationCell> {
        match self {
            Self::Equation(cell) => Some(cell),
            _ => None,
        }
    }

    /// Returns the stored context when this is an evaluated equation cell.
    pub fn stored_context(&self) -> Option<&Context> {
        self.as_equation().and_then(|cell| cell.context.as_ref())
    }

    pub fn children(&self) -> Option<&[Cell]> {
        match self {
            Self::Folder(folder) => Some(&folder.cells),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Cell>> {
        match self {
            Self::Folder(folder) => Some(&mut folder.cells),
            _ => None,
        }
    }
}
