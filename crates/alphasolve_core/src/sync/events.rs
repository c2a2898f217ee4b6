//! Session event bus.
//!
//! # Responsibility
//! - Fan out sync notifications (applied packets, rejections, sends) to
//!   subscribers registered per event kind.
//!
//! # Invariants
//! - Delivery is synchronous and follows subscription order within one kind.
//! - A subscriber only sees events of the kind it subscribed to.

use crate::model::cell::CellId;
use crate::sync::packet::PacketKind;

/// Notification published by a sync session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ProjectSynced {
        cell_count: usize,
    },
    CellUpdated {
        cell_id: CellId,
    },
    CellMoved {
        cell_id: CellId,
        from_index: usize,
        to_index: usize,
    },
    CellCreated {
        cell_id: CellId,
        parent_cell_id: Option<CellId>,
        index: usize,
    },
    CellDeleted {
        cell_id: CellId,
    },
    /// An inbound message could not be applied.
    PacketRejected {
        packet_kind: Option<PacketKind>,
        code: &'static str,
        message: String,
    },
    /// An outbound packet was handed to the transport.
    PacketSent {
        packet_kind: PacketKind,
    },
}

/// Subscription key for [`SyncEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEventKind {
    ProjectSynced,
    CellUpdated,
    CellMoved,
    CellCreated,
    CellDeleted,
    PacketRejected,
    PacketSent,
}

impl SyncEvent {
    pub fn kind(&self) -> SyncEventKind {
        match self {
            Self::ProjectSynced { .. } => SyncEventKind::ProjectSynced,
            Self::CellUpdated { .. } => SyncEventKind::CellUpdated,
            Self::CellMoved { .. } => SyncEventKind::CellMoved,
            Self::CellCreated { .. } => SyncEventKind::CellCreated,
            Self::CellDeleted { .. } => SyncEventKind::CellDeleted,
            Self::PacketRejected { .. } => SyncEventKind::PacketRejected,
            Self::PacketSent { .. } => SyncEventKind::PacketSent,
        }
    }
}

type Subscriber = Box<dyn FnMut(&SyncEvent) + Send>;

/// Ordered, per-kind subscriber lists.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(SyncEventKind, Subscriber)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscriber` for every future event of `kind`.
    pub fn subscribe(
        &mut self,
        kind: SyncEventKind,
        subscriber: impl FnMut(&SyncEvent) + Send + 'static,
    ) {
        self.subscribers.push((kind, Box::new(subscriber)));
    }

    /// Delivers `event` to matching subscribers in subscription order.
    pub fn publish(&mut self, event: &SyncEvent) {
        let kind = event.kind();
        for (subscribed, subscriber) in &mut self.subscribers {
            if *subscribed == kind {
                subscriber(event);
            }
        }
    }

    pub fn subscriber_count(&self, kind: SyncEventKind) -> usize {
        self.subscribers
            .iter()
            .filter(|(subscribed, _)| *subscribed == kind)
            .count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
