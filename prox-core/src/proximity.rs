//! Host-driven API: `Proximity` owns the peer registry and a radio transport.
//! The host delivers receive events; application logic calls queries and sends.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::packet::{Packet, ReceivedData};
use crate::registry::{PacketOutcome, PeerRegistry, RemotePeer};

/// Highest transmit power level the radio accepts.
pub const MAX_TRANSMIT_POWER: u8 = 7;

/// Longest string payload (bytes) that fits one radio packet.
pub const MAX_STRING_LEN: usize = 19;

/// Default radio group and power used until the host changes them.
pub const DEFAULT_GROUP: u8 = 0;
pub const DEFAULT_TRANSMIT_POWER: u8 = 6;

/// Outgoing payload handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Number(i32),
    Text(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProximityError {
    #[error("transmit power {0} out of range 0..=7")]
    InvalidPower(u8),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The external radio. Implementations do framing, modulation and delivery.
pub trait RadioTransport {
    fn set_group(&mut self, group: u8) -> Result<(), TransportError>;
    fn set_transmit_power(&mut self, level: u8) -> Result<(), TransportError>;
    /// Whether outgoing packets carry this device's serial. Peers can only tell
    /// senders apart when it is on.
    fn set_transmit_serial_number(&mut self, enabled: bool) -> Result<(), TransportError>;
    fn send(&mut self, payload: Payload) -> Result<(), TransportError>;
}

/// Action recorded by `QueuedTransport` for the host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    SetGroup(u8),
    SetTransmitPower(u8),
    TransmitSerialNumber(bool),
    Transmit(Payload),
}

/// Transport that queues actions instead of performing them. For hosts that drain
/// actions on their own schedule (the C ABI) and for tests.
#[derive(Debug, Default)]
pub struct QueuedTransport {
    pending: Vec<OutboundAction>,
}

impl QueuedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Vec<OutboundAction> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[OutboundAction] {
        &self.pending
    }
}

impl RadioTransport for QueuedTransport {
    fn set_group(&mut self, group: u8) -> Result<(), TransportError> {
        self.pending.push(OutboundAction::SetGroup(group));
        Ok(())
    }

    fn set_transmit_power(&mut self, level: u8) -> Result<(), TransportError> {
        self.pending.push(OutboundAction::SetTransmitPower(level));
        Ok(())
    }

    fn set_transmit_serial_number(&mut self, enabled: bool) -> Result<(), TransportError> {
        self.pending.push(OutboundAction::TransmitSerialNumber(enabled));
        Ok(())
    }

    fn send(&mut self, payload: Payload) -> Result<(), TransportError> {
        self.pending.push(OutboundAction::Transmit(payload));
        Ok(())
    }
}

/// Registry plus transport. One instance per radio; no global state.
pub struct Proximity<T: RadioTransport> {
    transport: T,
    registry: PeerRegistry,
    group: u8,
    transmit_power: u8,
}

/// A `Proximity` behind one mutex, for hosts where queries and receive events may
/// run on different threads.
pub type SharedProximity<T> = Arc<Mutex<Proximity<T>>>;

impl<T: RadioTransport> Proximity<T> {
    /// Take ownership of `transport` and switch on serial transmission.
    pub fn new(mut transport: T) -> Result<Self, ProximityError> {
        transport.set_transmit_serial_number(true)?;
        Ok(Self {
            transport,
            registry: PeerRegistry::new(),
            group: DEFAULT_GROUP,
            transmit_power: DEFAULT_TRANSMIT_POWER,
        })
    }

    pub fn into_shared(self) -> SharedProximity<T> {
        Arc::new(Mutex::new(self))
    }

    /// Receive-event handler: decode the transport's current packet and apply it.
    pub fn on_data_received<R: ReceivedData + ?Sized>(&mut self, rx: &R) -> PacketOutcome {
        self.registry.on_packet_received(Packet::decode(rx))
    }

    /// Apply an already decoded packet.
    pub fn on_packet_received(&mut self, packet: Packet) -> PacketOutcome {
        self.registry.on_packet_received(packet)
    }

    pub fn signal_strength(&self, peer_id: u32) -> Option<i32> {
        self.registry.signal_strength(peer_id)
    }

    pub fn averaged_signal_strength(&self, peer_id: u32) -> Option<f64> {
        self.registry.averaged_signal_strength(peer_id)
    }

    pub fn nearest_peer(&self) -> Option<(u32, f64)> {
        self.registry.nearest_peer()
    }

    pub fn peer(&self, peer_id: u32) -> Option<&RemotePeer> {
        self.registry.peer(peer_id)
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn set_group(&mut self, group: u8) -> Result<(), ProximityError> {
        self.transport.set_group(group)?;
        self.group = group;
        Ok(())
    }

    pub fn set_transmit_power(&mut self, level: u8) -> Result<(), ProximityError> {
        if level > MAX_TRANSMIT_POWER {
            return Err(ProximityError::InvalidPower(level));
        }
        self.transport.set_transmit_power(level)?;
        self.transmit_power = level;
        Ok(())
    }

    pub fn send_number(&mut self, n: i32) -> Result<(), ProximityError> {
        self.transport.send(Payload::Number(n))?;
        Ok(())
    }

    /// Send a string, truncated to `MAX_STRING_LEN` bytes on a char boundary.
    pub fn send_string(&mut self, s: &str) -> Result<(), ProximityError> {
        let text = truncate_to_packet(s);
        if text.len() < s.len() {
            log::warn!("string payload truncated to {} bytes", text.len());
        }
        self.transport.send(Payload::Text(text.to_owned()))?;
        Ok(())
    }

    pub fn group(&self) -> u8 {
        self.group
    }

    pub fn transmit_power(&self) -> u8 {
        self.transmit_power
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Forget every peer.
    pub fn reset(&mut self) {
        self.registry.clear();
    }
}

fn truncate_to_packet(s: &str) -> &str {
    if s.len() <= MAX_STRING_LEN {
        return s;
    }
    let mut end = MAX_STRING_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
