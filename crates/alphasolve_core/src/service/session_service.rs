//! Collaborative session service.
//!
//! # Responsibility
//! - Own one client's project replica together with its registry, executor,
//!   echo cache, packet handler, event bus and outbound sink.
//! - Turn local edits into tree mutations, propagation runs and outbound packets.
//! - Apply inbound messages and report failures on the event bus.
//!
//! # Invariants
//! - A rejected local or inbound operation leaves the tree unchanged.
//! - Nothing is broadcast while an inbound packet is being applied.
//! - Local text edits are broadcast only when the echo cache sees a change.
//! - A malformed inbound message never stops later messages from applying.

use crate::engine::propagation::{propagate_from, PropagationError, PropagationReport};
use crate::extension::executor::FunctionExecutor;
use crate::extension::registry::FunctionRegistry;
use crate::model::cell::{Cell, CellId, CellKind};
use crate::model::project::Project;
use crate::sync::echo::EchoCache;
use crate::sync::events::{EventBus, SyncEvent, SyncEventKind};
use crate::sync::handler::{PacketError, PacketHandler, SyncTarget};
use crate::sync::packet::Packet;
use crate::sync::transport::PacketSink;
use crate::tree::{self, TreeError};
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::mpsc::UnboundedReceiver;

/// Local operation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionServiceError {
    /// Target cell or folder is missing, or the operation is out of bounds.
    Tree(TreeError),
}

impl Display for SessionServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tree(err) => Some(err),
        }
    }
}

impl From<TreeError> for SessionServiceError {
    fn from(value: TreeError) -> Self {
        Self::Tree(value)
    }
}

impl From<PropagationError> for SessionServiceError {
    fn from(value: PropagationError) -> Self {
        match value {
            PropagationError::CellNotFound(id) => Self::Tree(TreeError::CellNotFound(id)),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionServiceError>;

/// One client's view of a shared project.
pub struct SessionService<S: PacketSink> {
    project: Project,
    registry: FunctionRegistry,
    executor: Box<dyn FunctionExecutor>,
    echo: EchoCache,
    handler: PacketHandler,
    bus: EventBus,
    sink: S,
}

impl<S: PacketSink> SessionService<S> {
    /// Creates a session over `project`; every existing cell counts as synced.
    pub fn new(
        project: Project,
        registry: FunctionRegistry,
        executor: Box<dyn FunctionExecutor>,
        sink: S,
    ) -> Self {
        let echo = EchoCache::from_project(&project);
        Self {
            project,
            registry,
            executor,
            echo,
            handler: PacketHandler::new(),
            bus: EventBus::new(),
            sink,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Whether an inbound packet is being applied right now.
    pub fn is_applying_inbound(&self) -> bool {
        self.handler.is_applying()
    }

    /// Registers an event subscriber.
    pub fn subscribe(
        &mut self,
        kind: SyncEventKind,
        subscriber: impl FnMut(&SyncEvent) + Send + 'static,
    ) {
        self.bus.subscribe(kind, subscriber);
    }

    /// Full-project packet for a newly joined peer.
    pub fn snapshot(&self) -> Packet {
        Packet::project_sync(self.project.clone())
    }

    /// Sends [`Self::snapshot`] to every peer.
    pub fn broadcast_snapshot(&mut self) {
        let packet = self.snapshot();
        self.emit(packet);
    }

    /// Re-runs propagation starting at `cell_id`.
    pub async fn propagate_from(&mut self, cell_id: CellId) -> SessionResult<PropagationReport> {
        let report =
            propagate_from(&mut self.project, cell_id, &self.registry, &*self.executor).await?;
        Ok(report)
    }

    /// Replaces the user-editable text of a cell.
    ///
    /// # Contract
    /// - Equations and folders re-propagate from the edited cell.
    /// - A `CellUpdate` is broadcast only when the echo cache sees a change.
    pub async fn edit_cell_text(
        &mut self,
        cell_id: CellId,
        text: impl Into<String>,
    ) -> SessionResult<()> {
        let cell = tree::find_by_id_mut(&mut self.project.cells, cell_id)
            .ok_or(TreeError::CellNotFound(cell_id))?;
        cell.set_editable_text(text);
        let kind = cell.kind();
        self.project.touch();

        if matches!(kind, CellKind::Equation | CellKind::Folder) {
            self.propagate_from(cell_id).await?;
        }

        let Some(cell) = tree::find_by_id(&self.project.cells, cell_id) else {
            return Err(TreeError::CellNotFound(cell_id).into());
        };
        match self.echo.observe(cell, self.handler.is_applying()) {
            Some(packet) => self.emit(packet),
            None => debug!(
                "event=cell_edit module=service status=skip cell_id={} reason=unchanged",
                cell_id
            ),
        }
        Ok(())
    }

    /// Inserts `cell` into the top level or a folder and broadcasts `CellCreate`.
    pub async fn insert_cell(
        &mut self,
        parent_cell_id: Option<CellId>,
        index: usize,
        cell: Cell,
    ) -> SessionResult<CellId> {
        if let Some(conflict) = tree::first_conflicting_id(&self.project.cells, &cell) {
            return Err(TreeError::DuplicateCellId(conflict).into());
        }
        let cell_id = cell.id();
        let is_equation = cell.kind() == CellKind::Equation;

        let siblings = tree::target_array_mut(&mut self.project.cells, parent_cell_id)?;
        tree::insert_at(siblings, index, cell)?;
        self.echo
            .record_subtree(std::slice::from_ref(&siblings[index]));
        self.project.touch();

        if is_equation {
            self.propagate_from(cell_id).await?;
        }
        if let Some(inserted) = tree::find_by_id(&self.project.cells, cell_id) {
            let packet = Packet::cell_create(inserted.clone(), index, parent_cell_id);
            self.emit(packet);
        }
        Ok(cell_id)
    }

    /// Moves a cell within its own array and broadcasts `CellMove`.
    pub async fn move_cell(&mut self, cell_id: CellId, to_index: usize) -> SessionResult<()> {
        let (siblings, from_index) = tree::siblings_mut(&mut self.project.cells, cell_id)
            .ok_or(TreeError::CellNotFound(cell_id))?;
        if to_index >= siblings.len() {
            return Err(TreeError::IndexOutOfBounds {
                index: to_index,
                len: siblings.len(),
            }
            .into());
        }

        let moved = siblings.remove(from_index);
        let is_equation = moved.kind() == CellKind::Equation;
        siblings.insert(to_index, moved);
        let restart_id = siblings[from_index.min(to_index)].id();
        self.project.touch();

        if is_equation {
            self.propagate_from(restart_id).await?;
        }
        self.emit(Packet::cell_move(cell_id, from_index, to_index));
        Ok(())
    }

    /// Deletes a cell (with its subtree) and broadcasts `CellDelete`.
    pub async fn delete_cell(&mut self, cell_id: CellId) -> SessionResult<()> {
        let parent_cell_id = tree::parent_id_of(&self.project.cells, cell_id)
            .ok_or(TreeError::CellNotFound(cell_id))?;
        let siblings = tree::target_array_mut(&mut self.project.cells, parent_cell_id)?;
        let (removed, index) = tree::remove_by_id(siblings, cell_id)?;
        let successor = siblings.get(index).map(Cell::id);
        self.echo.forget_subtree(&removed);
        self.project.touch();

        if removed.kind() == CellKind::Equation {
            if let Some(successor) = successor {
                self.propagate_from(successor).await?;
            }
        }
        self.emit(Packet::cell_delete(cell_id, parent_cell_id));
        Ok(())
    }

    /// Deletes the cell only when its editable text is empty.
    ///
    /// Returns whether the cell was deleted.
    pub async fn backspace(&mut self, cell_id: CellId) -> SessionResult<bool> {
        let cell = tree::find_by_id(&self.project.cells, cell_id)
            .ok_or(TreeError::CellNotFound(cell_id))?;
        if !cell.editable_text().is_empty() {
            return Ok(false);
        }
        self.delete_cell(cell_id).await?;
        Ok(true)
    }

    /// Decodes and applies one inbound message.
    ///
    /// Failures are published as `PacketRejected` and returned; the session
    /// stays usable for later messages.
    pub async fn handle_message(&mut self, message: &str) -> Result<SyncEvent, PacketError> {
        let packet = match Packet::decode(message) {
            Ok(packet) => packet,
            Err(err) => {
                let err = PacketError::from(err);
                self.bus.publish(&SyncEvent::PacketRejected {
                    packet_kind: None,
                    code: err.code(),
                    message: err.to_string(),
                });
                return Err(err);
            }
        };
        self.apply_packet(packet).await
    }

    /// Applies one decoded inbound packet.
    pub async fn apply_packet(&mut self, packet: Packet) -> Result<SyncEvent, PacketError> {
        let packet_kind = packet.kind();
        let mut target = SyncTarget {
            project: &mut self.project,
            echo: &mut self.echo,
            registry: &self.registry,
            executor: &*self.executor,
        };
        let result = self.handler.apply(packet, &mut target).await;
        match &result {
            Ok(event) => self.bus.publish(event),
            Err(err) => self.bus.publish(&SyncEvent::PacketRejected {
                packet_kind: Some(packet_kind),
                code: err.code(),
                message: err.to_string(),
            }),
        }
        result
    }

    /// Applies inbound messages until the channel closes.
    pub async fn run(&mut self, mut inbound: UnboundedReceiver<String>) {
        info!("event=session_run module=service status=start");
        let mut applied = 0usize;
        let mut rejected = 0usize;
        while let Some(message) = inbound.recv().await {
            match self.handle_message(&message).await {
                Ok(_) => applied += 1,
                Err(_) => rejected += 1,
            }
        }
        info!(
            "event=session_run module=service status=ok applied={} rejected={}",
            applied, rejected
        );
    }

    fn emit(&mut self, packet: Packet) {
        let packet_kind = packet.kind();
        self.sink.send(packet);
        self.bus.publish(&SyncEvent::PacketSent { packet_kind });
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionService, SessionServiceError};
    use crate::extension::builtin::{builtin_registry, BuiltinExecutor};
    use crate::model::cell::Cell;
    use crate::model::project::Project;
    use crate::sync::packet::{Packet, PacketKind};
    use crate::sync::transport::PacketSink;
    use crate::tree::TreeError;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<Packet>>>,
    }

    impl PacketSink for RecordingSink {
        fn send(&self, packet: Packet) {
            self.sent.lock().unwrap().push(packet);
        }
    }

    fn session(cells: Vec<Cell>) -> (SessionService<RecordingSink>, RecordingSink) {
        let sink = RecordingSink::default();
        let service = SessionService::new(
            Project::new("test").with_cells(cells),
            builtin_registry().expect("builtin registry"),
            Box::new(BuiltinExecutor::new()),
            sink.clone(),
        );
        (service, sink)
    }

    #[tokio::test]
    async fn backspace_only_deletes_empty_cells() {
        let filled = Cell::note("keep");
        let empty = Cell::note("");
        let (mut service, sink) = session(vec![filled.clone(), empty.clone()]);

        assert!(!service.backspace(filled.id()).await.expect("backspace filled"));
        assert!(service.backspace(empty.id()).await.expect("backspace empty"));

        assert_eq!(service.project().cells.len(), 1);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), PacketKind::CellDelete);
    }

    #[tokio::test]
    async fn move_out_of_bounds_is_rejected_without_broadcast() {
        let first = Cell::equation("x=1");
        let (mut service, sink) = session(vec![first.clone(), Cell::equation("y=2")]);

        let err = service.move_cell(first.id(), 2).await.unwrap_err();
        assert_eq!(
            err,
            SessionServiceError::Tree(TreeError::IndexOutOfBounds { index: 2, len: 2 })
        );
        assert!(sink.sent.lock().unwrap().is_empty());
    }
}
