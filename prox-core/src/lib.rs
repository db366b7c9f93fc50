//! Per-peer radio proximity tracking.
//! Host-driven: the host delivers receive events and owns the radio; the core keeps the
//! peer table and answers signal-strength queries.

pub mod ffi;
pub mod packet;
pub mod proximity;
pub mod registry;
pub mod rescale;

pub use packet::{Packet, ReceivedData, UNIDENTIFIED_SENDER};
pub use proximity::{
    OutboundAction, Payload, Proximity, ProximityError, QueuedTransport, RadioTransport,
    SharedProximity, TransportError, MAX_STRING_LEN, MAX_TRANSMIT_POWER,
};
pub use registry::{
    PacketOutcome, PeerRegistry, RemotePeer, SignalHistory, NO_SAMPLE, SIGNAL_WINDOW,
};
pub use rescale::{map, try_map, InvalidRangeError};
