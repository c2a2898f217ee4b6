//! Collaborative sync layer: wire packets, inbound application, echo
//! suppression, session events and the WebSocket transport.

pub mod echo;
pub mod events;
pub mod handler;
pub mod packet;
pub mod transport;

pub use echo::EchoCache;
pub use events::{EventBus, SyncEvent, SyncEventKind};
pub use handler::{PacketError, PacketHandler, SyncTarget};
pub use packet::{DecodeError, Packet, PacketKind};
pub use transport::{
    outbound_channel, run_transport, ChannelSink, ConnectionError, ConnectionParams, PacketSink,
    ReconnectPolicy,
};
