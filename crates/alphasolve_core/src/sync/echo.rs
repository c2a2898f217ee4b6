//! Echo-suppression fingerprint cache.
//!
//! # Responsibility
//! - Remember a structural fingerprint of each cell's user-visible fields.
//! - Tell the session whether a cell changed since it was last broadcast or received.
//!
//! # Invariants
//! - Fingerprints cover kind plus text/content/name only; computed context and
//!   solutions never influence them, so propagation alone is never "a change".
//! - A cell with no cached entry counts as changed.

use crate::model::cell::{Cell, CellId};
use crate::model::project::Project;
use crate::sync::packet::Packet;
use crate::tree;
use std::collections::HashMap;

/// Structural fingerprint of one cell's user-visible fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    pub fn of(cell: &Cell) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(cell.kind().as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(cell.editable_text().as_bytes());
        Self(hasher.finalize())
    }
}

/// Cell id to last-synced fingerprint map.
#[derive(Debug, Default)]
pub struct EchoCache {
    fingerprints: HashMap<CellId, Fingerprint>,
}

impl EchoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cache that matches every cell of `project`.
    pub fn from_project(project: &Project) -> Self {
        let mut cache = Self::new();
        cache.rebuild(project);
        cache
    }

    /// Replaces all entries with the current state of `project`.
    pub fn rebuild(&mut self, project: &Project) {
        self.fingerprints.clear();
        self.record_subtree(&project.cells);
    }

    /// Returns whether `cell` differs from its cached fingerprint.
    pub fn has_changed(&self, cell: &Cell) -> bool {
        self.fingerprints.get(&cell.id()) != Some(&Fingerprint::of(cell))
    }

    /// Records `cell` and returns the `CellUpdate` to broadcast, if any.
    ///
    /// Nothing is returned while an inbound packet is being applied or when
    /// the fingerprint is unchanged.
    pub fn observe(&mut self, cell: &Cell, applying_inbound: bool) -> Option<Packet> {
        let changed = self.has_changed(cell);
        self.record(cell);
        if changed && !applying_inbound {
            Some(Packet::cell_update(cell.clone()))
        } else {
            None
        }
    }

    /// Stores the current fingerprint of `cell` (not of its children).
    pub fn record(&mut self, cell: &Cell) {
        self.fingerprints.insert(cell.id(), Fingerprint::of(cell));
    }

    /// Stores fingerprints for `cells` and all their descendants.
    pub fn record_subtree(&mut self, cells: &[Cell]) {
        tree::for_each_cell(cells, &mut |cell| {
            self.fingerprints.insert(cell.id(), Fingerprint::of(cell));
        });
    }

    /// Drops entries for `cell` and all its descendants.
    pub fn forget_subtree(&mut self, cell: &Cell) {
        tree::for_each_cell(std::slice::from_ref(cell), &mut |visited| {
            self.fingerprints.remove(&visited.id());
        });
    }

    pub fn contains(&self, cell_id: CellId) -> bool {
        self.fingerprints.contains_key(&cell_id)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}
