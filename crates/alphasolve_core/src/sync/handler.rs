//! Inbound packet application.
//!
//! # Responsibility
//! - Apply decoded packets to the project tree.
//! - Re-run propagation where an applied packet changes equation order or content.
//! - Keep the echo cache aligned with what was received.
//!
//! # Invariants
//! - Every validation runs before the first mutation; a rejected packet leaves
//!   the tree untouched.
//! - `is_applying()` is true exactly while a packet is being applied.
//! - Received cells are recorded in the echo cache, never re-broadcast.

use crate::engine::propagation::{propagate_from, PropagationError};
use crate::extension::executor::FunctionExecutor;
use crate::extension::registry::FunctionRegistry;
use crate::logging::loggable_error;
use crate::model::cell::{Cell, CellId, CellKind};
use crate::model::project::Project;
use crate::sync::echo::EchoCache;
use crate::sync::events::SyncEvent;
use crate::sync::packet::{DecodeError, Packet};
use crate::tree::{self, TreeError};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Per-packet failures. None of them leaves a partial mutation behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Message is not valid packet JSON.
    Decode(DecodeError),
    /// Target cell or parent folder does not exist.
    Lookup(TreeError),
    /// Packet is well-formed but cannot be applied to the current tree.
    Validation(TreeError),
    /// `CellUpdate` payload id differs from the addressed `cellId`.
    CellIdMismatch { expected: CellId, actual: CellId },
}

impl PacketError {
    /// Stable error code reported on the error stream.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::Lookup(_) => "lookup_error",
            Self::Validation(_) | Self::CellIdMismatch { .. } => "validation_error",
        }
    }
}

impl Display for PacketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "{err}"),
            Self::Lookup(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::CellIdMismatch { expected, actual } => {
                write!(f, "cell update addressed {expected} but carried {actual}")
            }
        }
    }
}

impl Error for PacketError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            Self::Lookup(err) | Self::Validation(err) => Some(err),
            Self::CellIdMismatch { .. } => None,
        }
    }
}

impl From<DecodeError> for PacketError {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<TreeError> for PacketError {
    fn from(value: TreeError) -> Self {
        if value.is_lookup() {
            Self::Lookup(value)
        } else {
            Self::Validation(value)
        }
    }
}

impl From<PropagationError> for PacketError {
    fn from(value: PropagationError) -> Self {
        match value {
            PropagationError::CellNotFound(id) => Self::Lookup(TreeError::CellNotFound(id)),
        }
    }
}

/// Mutable session state a packet is applied to.
pub struct SyncTarget<'a> {
    pub project: &'a mut Project,
    pub echo: &'a mut EchoCache,
    pub registry: &'a FunctionRegistry,
    pub executor: &'a dyn FunctionExecutor,
}

/// Applies inbound packets; owns the "applying inbound" flag.
#[derive(Debug, Default)]
pub struct PacketHandler {
    applying: bool,
}

impl PacketHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an inbound packet is being applied right now.
    pub fn is_applying(&self) -> bool {
        self.applying
    }

    /// Applies one packet and returns the event describing what changed.
    pub async fn apply(
        &mut self,
        packet: Packet,
        target: &mut SyncTarget<'_>,
    ) -> Result<SyncEvent, PacketError> {
        let kind = packet.kind();
        self.applying = true;
        let result = self.apply_inner(packet, target).await;
        self.applying = false;

        match &result {
            Ok(_) => debug!(
                "event=packet_apply module=sync status=ok packet_type={}",
                kind.as_str()
            ),
            Err(err) => warn!(
                "event=packet_apply module=sync status=error packet_type={} error_code={} error={}",
                kind.as_str(),
                err.code(),
                loggable_error(err)
            ),
        }
        result
    }

    async fn apply_inner(
        &self,
        packet: Packet,
        target: &mut SyncTarget<'_>,
    ) -> Result<SyncEvent, PacketError> {
        match packet {
            Packet::ProjectSync { project, .. } => {
                *target.project = project;
                target.echo.rebuild(target.project);
                let cell_count = target.project.cell_count();
                info!(
                    "event=project_sync module=sync status=ok cell_count={}",
                    cell_count
                );
                Ok(SyncEvent::ProjectSynced { cell_count })
            }
            Packet::CellUpdate { cell_id, cell, .. } => {
                self.apply_update(cell_id, cell, target).await
            }
            Packet::CellMove {
                cell_id,
                from_index,
                to_index,
                ..
            } => self.apply_move(cell_id, from_index, to_index, target).await,
            Packet::CellCreate {
                cell,
                index,
                parent_cell_id,
                ..
            } => self.apply_create(cell, index, parent_cell_id, target).await,
            Packet::CellDelete {
                cell_id,
                parent_cell_id,
                ..
            } => self.apply_delete(cell_id, parent_cell_id, target).await,
        }
    }

    async fn apply_update(
        &self,
        cell_id: CellId,
        cell: Cell,
        target: &mut SyncTarget<'_>,
    ) -> Result<SyncEvent, PacketError> {
        if cell.id() != cell_id {
            return Err(PacketError::CellIdMismatch {
                expected: cell_id,
                actual: cell.id(),
            });
        }
        if tree::find_by_id(&target.project.cells, cell_id).is_none() {
            return Err(PacketError::Lookup(TreeError::CellNotFound(cell_id)));
        }
        if let Some(conflict) =
            tree::first_conflicting_replacement_id(&target.project.cells, cell_id, &cell)
        {
            return Err(PacketError::Validation(TreeError::DuplicateCellId(conflict)));
        }
        let (siblings, index) = tree::siblings_mut(&mut target.project.cells, cell_id)
            .ok_or(TreeError::CellNotFound(cell_id))?;

        let is_equation = cell.kind() == CellKind::Equation;
        let previous = std::mem::replace(&mut siblings[index], cell);
        target.echo.forget_subtree(&previous);
        target
            .echo
            .record_subtree(std::slice::from_ref(&siblings[index]));
        target.project.touch();

        if is_equation {
            self.repropagate(cell_id, target).await?;
        }
        Ok(SyncEvent::CellUpdated { cell_id })
    }

    async fn apply_move(
        &self,
        cell_id: CellId,
        from_index: usize,
        to_index: usize,
        target: &mut SyncTarget<'_>,
    ) -> Result<SyncEvent, PacketError> {
        let (siblings, actual_index) = tree::siblings_mut(&mut target.project.cells, cell_id)
            .ok_or(TreeError::CellNotFound(cell_id))?;

        if actual_index != from_index {
            warn!(
                "event=cell_move module=sync status=warn cell_id={} declared_from={} actual_from={}",
                cell_id, from_index, actual_index
            );
        }
        if to_index >= siblings.len() {
            return Err(PacketError::Validation(TreeError::IndexOutOfBounds {
                index: to_index,
                len: siblings.len(),
            }));
        }

        let moved = siblings.remove(actual_index);
        let is_equation = moved.kind() == CellKind::Equation;
        siblings.insert(to_index, moved);
        let restart_id = siblings[actual_index.min(to_index)].id();
        target.project.touch();

        // Folder and note moves leave downstream contexts as they were.
        if is_equation {
            self.repropagate(restart_id, target).await?;
        }
        Ok(SyncEvent::CellMoved {
            cell_id,
            from_index: actual_index,
            to_index,
        })
    }

    async fn apply_create(
        &self,
        cell: Cell,
        index: usize,
        parent_cell_id: Option<CellId>,
        target: &mut SyncTarget<'_>,
    ) -> Result<SyncEvent, PacketError> {
        if let Some(conflict) = tree::first_conflicting_id(&target.project.cells, &cell) {
            return Err(PacketError::Validation(TreeError::DuplicateCellId(conflict)));
        }
        let cell_id = cell.id();
        let is_equation = cell.kind() == CellKind::Equation;

        let siblings = tree::target_array_mut(&mut target.project.cells, parent_cell_id)?;
        tree::insert_at(siblings, index, cell)?;
        target
            .echo
            .record_subtree(std::slice::from_ref(&siblings[index]));
        target.project.touch();

        if is_equation {
            self.repropagate(cell_id, target).await?;
        }
        Ok(SyncEvent::CellCreated {
            cell_id,
            parent_cell_id,
            index,
        })
    }

    async fn apply_delete(
        &self,
        cell_id: CellId,
        parent_cell_id: Option<CellId>,
        target: &mut SyncTarget<'_>,
    ) -> Result<SyncEvent, PacketError> {
        let siblings = tree::target_array_mut(&mut target.project.cells, parent_cell_id)?;
        let (removed, index) = tree::remove_by_id(siblings, cell_id)?;
        let successor = siblings.get(index).map(Cell::id);
        target.echo.forget_subtree(&removed);
        target.project.touch();

        if removed.kind() == CellKind::Equation {
            if let Some(successor) = successor {
                self.repropagate(successor, target).await?;
            }
        }
        Ok(SyncEvent::CellDeleted { cell_id })
    }

    async fn repropagate(
        &self,
        start: CellId,
        target: &mut SyncTarget<'_>,
    ) -> Result<(), PacketError> {
        propagate_from(target.project, start, target.registry, target.executor).await?;
        Ok(())
    }
}

