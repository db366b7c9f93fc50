//! Packet decoder: turns one radio receive event into a `Packet` record.

/// Sender id reported by the transport when the sender did not include its serial.
pub const UNIDENTIFIED_SENDER: u32 = 0;

/// Synchronous accessors the radio transport exposes after a "data received" event.
/// Values are only valid until the next event is dispatched.
pub trait ReceivedData {
    /// Number payload, or 0 if the packet carried none.
    fn received_number(&self) -> i32;
    /// String payload, or the empty string.
    fn received_string(&self) -> String;
    /// Buffer payload, or an empty buffer.
    fn received_buffer(&self) -> Vec<u8>;
    /// Sender's system time (ms) when the packet was sent.
    fn received_time(&self) -> u32;
    /// Sender serial, or 0 if it was not transmitted.
    fn received_serial(&self) -> u32;
    /// RSSI of the packet in dBm.
    fn received_signal_strength(&self) -> i32;
}

/// One received transmission. Built per event, consumed by the registry, then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    pub number: i32,
    pub text: String,
    pub buffer: Vec<u8>,
    /// Sender's local clock at transmission.
    pub send_time: u32,
    /// Sender serial; `UNIDENTIFIED_SENDER` when absent.
    pub sender_id: u32,
    /// Received signal strength (dBm, closer to 0 is stronger).
    pub signal: i32,
}

impl Packet {
    /// Materialize a packet from the transport's current receive state. Never fails;
    /// payload values are trusted as delivered.
    pub fn decode<R: ReceivedData + ?Sized>(rx: &R) -> Self {
        Self {
            number: rx.received_number(),
            text: rx.received_string(),
            buffer: rx.received_buffer(),
            send_time: rx.received_time(),
            sender_id: rx.received_serial(),
            signal: rx.received_signal_strength(),
        }
    }

    /// Empty-payload packet from `sender_id` heard at `signal`.
    pub fn from_sender(sender_id: u32, signal: i32) -> Self {
        Self {
            sender_id,
            signal,
            ..Self::default()
        }
    }

    pub fn with_number(mut self, number: i32) -> Self {
        self.number = number;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_buffer(mut self, buffer: Vec<u8>) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_send_time(mut self, send_time: u32) -> Self {
        self.send_time = send_time;
        self
    }

    /// True when the sender did not transmit its serial.
    pub fn is_unidentified(&self) -> bool {
        self.sender_id == UNIDENTIFIED_SENDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRx {
        serial: u32,
        signal: i32,
    }

    impl ReceivedData for FakeRx {
        fn received_number(&self) -> i32 {
            17
        }
        fn received_string(&self) -> String {
            "hi".into()
        }
        fn received_buffer(&self) -> Vec<u8> {
            vec![1, 2, 3]
        }
        fn received_time(&self) -> u32 {
            9000
        }
        fn received_serial(&self) -> u32 {
            self.serial
        }
        fn received_signal_strength(&self) -> i32 {
            self.signal
        }
    }

    #[test]
    fn decode_copies_every_field() {
        let p = Packet::decode(&FakeRx {
            serial: 42,
            signal: -63,
        });
        assert_eq!(p.number, 17);
        assert_eq!(p.text, "hi");
        assert_eq!(p.buffer, vec![1, 2, 3]);
        assert_eq!(p.send_time, 9000);
        assert_eq!(p.sender_id, 42);
        assert_eq!(p.signal, -63);
        assert!(!p.is_unidentified());
    }

    #[test]
    fn missing_serial_is_unidentified() {
        let p = Packet::decode(&FakeRx {
            serial: 0,
            signal: -70,
        });
        assert!(p.is_unidentified());
    }

    #[test]
    fn builder_defaults_are_transport_defaults() {
        let p = Packet::from_sender(5, -80);
        assert_eq!(p.number, 0);
        assert!(p.text.is_empty());
        assert!(p.buffer.is_empty());
        let p = p.with_number(3).with_text("x").with_send_time(12);
        assert_eq!((p.number, p.text.as_str(), p.send_time), (3, "x", 12));
    }
}
