//! UDP multicast stand-in for the radio: every host on the LAN segment is in range.
//! Frames from other groups are not heard; RSSI comes from a fixed path-loss model.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::Arc;
use std::time::Instant;

use prox_core::{
    Payload, Proximity, RadioTransport, ReceivedData, TransportError, MAX_TRANSMIT_POWER,
};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::wire::{decode_frame, encode_frame, RadioFrame};

const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 60, 61);

/// Output power in dBm for each transmit power level.
const TX_POWER_DBM: [i32; 8] = [-30, -20, -16, -12, -8, -4, 0, 4];

/// Range the receiver can report.
const RSSI_MIN: i32 = -128;
const RSSI_MAX: i32 = -42;

/// Per-radio transmit settings.
#[derive(Debug)]
struct RadioState {
    group: u8,
    transmit_power: u8,
    serial: u32,
    send_serial: bool,
    started: Instant,
}

impl RadioState {
    fn new(serial: u32) -> Self {
        Self {
            group: prox_core::proximity::DEFAULT_GROUP,
            transmit_power: prox_core::proximity::DEFAULT_TRANSMIT_POWER,
            serial,
            send_serial: false,
            started: Instant::now(),
        }
    }

    fn frame(&self, payload: Payload) -> RadioFrame {
        RadioFrame {
            group: self.group,
            transmit_power: self.transmit_power,
            send_time: self.started.elapsed().as_millis() as u32,
            serial: self.send_serial.then_some(self.serial),
            payload,
        }
    }
}

/// Transmit half of the emulated radio. The receive half is `run_receiver`.
pub struct UdpRadio {
    socket: StdUdpSocket,
    dest: SocketAddr,
    state: RadioState,
}

impl UdpRadio {
    /// Join the multicast channel on `port`. Returns the transmitter and a socket for
    /// `run_receiver`. Must be called inside a tokio runtime.
    pub fn open(port: u16, serial: u32) -> std::io::Result<(Self, UdpSocket)> {
        let std_sock = StdUdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        std_sock.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)?;
        std_sock.set_multicast_ttl_v4(1)?;
        std_sock.set_nonblocking(true)?;
        let rx = UdpSocket::from_std(std_sock.try_clone()?)?;
        let radio = Self {
            socket: std_sock,
            dest: SocketAddr::from((MULTICAST_GROUP, port)),
            state: RadioState::new(serial),
        };
        Ok((radio, rx))
    }

    pub fn serial(&self) -> u32 {
        self.state.serial
    }
}

impl RadioTransport for UdpRadio {
    fn set_group(&mut self, group: u8) -> Result<(), TransportError> {
        self.state.group = group;
        Ok(())
    }

    fn set_transmit_power(&mut self, level: u8) -> Result<(), TransportError> {
        self.state.transmit_power = level.min(MAX_TRANSMIT_POWER);
        Ok(())
    }

    fn set_transmit_serial_number(&mut self, enabled: bool) -> Result<(), TransportError> {
        self.state.send_serial = enabled;
        Ok(())
    }

    fn send(&mut self, payload: Payload) -> Result<(), TransportError> {
        let frame = self.state.frame(payload);
        let bytes = encode_frame(&frame).map_err(|e| TransportError::Encode(e.to_string()))?;
        send_result(self.socket.send_to(&bytes, self.dest))
    }
}

/// The send socket shares the receiver's non-blocking descriptor: a full send buffer
/// drops the frame instead of failing the send.
fn send_result(result: std::io::Result<usize>) -> Result<(), TransportError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            log::debug!("send buffer full, frame dropped");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Path-loss model used to give received frames an RSSI.
#[derive(Debug, Clone, Copy)]
pub struct LinkModel {
    pub path_loss_db: i32,
    pub jitter_db: i32,
}

impl LinkModel {
    pub fn rssi<R: Rng>(&self, transmit_power: u8, rng: &mut R) -> i32 {
        let dbm = TX_POWER_DBM[transmit_power.min(MAX_TRANSMIT_POWER) as usize];
        let noise = if self.jitter_db > 0 {
            rng.gen_range(-self.jitter_db..=self.jitter_db)
        } else {
            0
        };
        (dbm - self.path_loss_db + noise).clamp(RSSI_MIN, RSSI_MAX)
    }
}

/// A decoded frame plus the RSSI it was heard at; the receive state the core reads.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub frame: RadioFrame,
    pub signal: i32,
}

impl ReceivedData for ReceivedFrame {
    fn received_number(&self) -> i32 {
        match self.frame.payload {
            Payload::Number(n) => n,
            Payload::Text(_) => 0,
        }
    }

    fn received_string(&self) -> String {
        match &self.frame.payload {
            Payload::Text(s) => s.clone(),
            Payload::Number(_) => String::new(),
        }
    }

    fn received_buffer(&self) -> Vec<u8> {
        Vec::new()
    }

    fn received_time(&self) -> u32 {
        self.frame.send_time
    }

    fn received_serial(&self) -> u32 {
        self.frame.serial.unwrap_or(prox_core::UNIDENTIFIED_SENDER)
    }

    fn received_signal_strength(&self) -> i32 {
        self.signal
    }
}

/// Receive loop: decode datagrams, drop our own and other groups' frames, and hand the
/// rest to the core one at a time.
pub async fn run_receiver<T>(
    socket: UdpSocket,
    core: Arc<Mutex<Proximity<T>>>,
    own_serial: u32,
    link: LinkModel,
) -> std::io::Result<()>
where
    T: RadioTransport + Send + 'static,
{
    let mut buf = vec![0u8; 2048];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        let frame = match decode_frame(&buf[..n]) {
            Ok((frame, _)) => frame,
            Err(e) => {
                log::warn!("dropping datagram from {}: {}", from, e);
                continue;
            }
        };
        if frame.serial == Some(own_serial) {
            continue;
        }
        let mut p = core.lock().await;
        if frame.group != p.group() {
            log::trace!("ignoring frame for group {} from {}", frame.group, from);
            continue;
        }
        let signal = link.rssi(frame.transmit_power, &mut rand::thread_rng());
        let outcome = p.on_data_received(&ReceivedFrame { frame, signal });
        log::trace!("{:?} from {}", outcome, from);
    }
}
