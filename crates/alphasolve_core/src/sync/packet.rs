//! Sync packet wire model.
//!
//! # Responsibility
//! - Define the five mutation intents exchanged between collaborating clients.
//! - Encode/decode one packet per JSON message.
//!
//! # Invariants
//! - `type` discriminates the packet; unknown types are decode errors.
//! - Every packet carries an ISO-8601 `timestamp` of issue.

use crate::model::cell::{Cell, CellId};
use crate::model::project::Project;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One mutation intent against the project tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    /// Wholesale replacement of the receiver's project.
    #[serde(rename_all = "camelCase")]
    ProjectSync {
        project: Project,
        timestamp: DateTime<Utc>,
    },
    /// Replacement of one cell, in place.
    #[serde(rename_all = "camelCase")]
    CellUpdate {
        cell_id: CellId,
        cell: Cell,
        timestamp: DateTime<Utc>,
    },
    /// Reorder within the array that holds `cell_id`.
    #[serde(rename_all = "camelCase")]
    CellMove {
        cell_id: CellId,
        from_index: usize,
        to_index: usize,
        timestamp: DateTime<Utc>,
    },
    /// Insert into the top-level array or a folder's children.
    #[serde(rename_all = "camelCase")]
    CellCreate {
        cell: Cell,
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_cell_id: Option<CellId>,
        timestamp: DateTime<Utc>,
    },
    /// Removal from the top-level array or a folder's children.
    #[serde(rename_all = "camelCase")]
    CellDelete {
        cell_id: CellId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_cell_id: Option<CellId>,
        timestamp: DateTime<Utc>,
    },
}

/// Packet kind without payload, for logs and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    ProjectSync,
    CellUpdate,
    CellMove,
    CellCreate,
    CellDelete,
}

impl PacketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectSync => "ProjectSync",
            Self::CellUpdate => "CellUpdate",
            Self::CellMove => "CellMove",
            Self::CellCreate => "CellCreate",
            Self::CellDelete => "CellDelete",
        }
    }
}

impl Packet {
    pub fn project_sync(project: Project) -> Self {
        Self::ProjectSync {
            project,
            timestamp: Utc::now(),
        }
    }

    pub fn cell_update(cell: Cell) -> Self {
        Self::CellUpdate {
            cell_id: cell.id(),
            cell,
            timestamp: Utc::now(),
        }
    }

    pub fn cell_move(cell_id: CellId, from_index: usize, to_index: usize) -> Self {
        Self::CellMove {
            cell_id,
            from_index,
            to_index,
            timestamp: Utc::now(),
        }
    }

    pub fn cell_create(cell: Cell, index: usize, parent_cell_id: Option<CellId>) -> Self {
        Self::CellCreate {
            cell,
            index,
            parent_cell_id,
            timestamp: Utc::now(),
        }
    }

    pub fn cell_delete(cell_id: CellId, parent_cell_id: Option<CellId>) -> Self {
        Self::CellDelete {
            cell_id,
            parent_cell_id,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            Self::ProjectSync { .. } => PacketKind::ProjectSync,
            Self::CellUpdate { .. } => PacketKind::CellUpdate,
            Self::CellMove { .. } => PacketKind::CellMove,
            Self::CellCreate { .. } => PacketKind::CellCreate,
            Self::CellDelete { .. } => PacketKind::CellDelete,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ProjectSync { timestamp, .. }
            | Self::CellUpdate { timestamp, .. }
            | Self::CellMove { timestamp, .. }
            | Self::CellCreate { timestamp, .. }
            | Self::CellDelete { timestamp, .. } => *timestamp,
        }
    }

    /// Decodes one packet from a complete JSON message.
    pub fn decode(message: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(message).map_err(|err| DecodeError::new(err.to_string()))
    }

    /// Encodes this packet as one JSON message.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Malformed packet JSON, or a packet/cell with an unknown discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "packet decode failed: {}", self.message)
    }
}

impl Error for DecodeError {}
