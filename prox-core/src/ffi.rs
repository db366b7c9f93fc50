//! C ABI for linking prox-core as a static library into firmware or other C/C++ hosts.
//! Queries use the block-level sentinel convention: -1 for unknown peers.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::slice;

use crate::packet::Packet;
use crate::proximity::{OutboundAction, Payload, Proximity, QueuedTransport};
use crate::registry::{PacketOutcome, NO_SAMPLE};
use crate::rescale;

type Core = Proximity<QueuedTransport>;

const TAG_SET_GROUP: u8 = 0;
const TAG_SET_POWER: u8 = 1;
const TAG_SERIAL: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_TEXT: u8 = 4;

/// ABI version, bumped when any signature or the outbound layout changes.
#[no_mangle]
pub extern "C" fn prox_core_version() -> u8 {
    1
}

/// Create a new instance. Returns opaque handle or null on failure.
#[no_mangle]
pub extern "C" fn prox_core_create() -> *mut c_void {
    match Proximity::new(QueuedTransport::new()) {
        Ok(core) => Box::into_raw(Box::new(core)) as *mut c_void,
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroy instance. No-op if h is null.
#[no_mangle]
pub extern "C" fn prox_core_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(h as *mut Core) };
}

unsafe fn bytes<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    if len == 0 {
        return Some(&[]);
    }
    if ptr.is_null() {
        return None;
    }
    Some(slice::from_raw_parts(ptr, len))
}

/// Deliver one received packet. text is UTF-8 (invalid sequences replaced); text and buf
/// may be null when their length is 0.
/// Returns 0 = ignored (no serial), 1 = new peer, 2 = existing peer updated, -1 = error.
#[no_mangle]
pub extern "C" fn prox_core_on_packet(
    h: *mut c_void,
    number: i32,
    text: *const u8,
    text_len: usize,
    buf: *const u8,
    buf_len: usize,
    send_time: u32,
    serial: u32,
    signal: i32,
) -> c_int {
    if h.is_null() {
        return -1;
    }
    let core = unsafe { &mut *(h as *mut Core) };
    let Some(text) = (unsafe { bytes(text, text_len) }) else {
        return -1;
    };
    let Some(buf) = (unsafe { bytes(buf, buf_len) }) else {
        return -1;
    };
    let packet = Packet {
        number,
        text: String::from_utf8_lossy(text).into_owned(),
        buffer: buf.to_vec(),
        send_time,
        sender_id: serial,
        signal,
    };
    match core.on_packet_received(packet) {
        PacketOutcome::Ignored => 0,
        PacketOutcome::Created(_) => 1,
        PacketOutcome::Updated(_) => 2,
    }
}

/// Latest RSSI of a peer, or -1 if unknown (or h null).
#[no_mangle]
pub extern "C" fn prox_core_signal_strength(h: *mut c_void, peer_id: u32) -> i32 {
    if h.is_null() {
        return NO_SAMPLE;
    }
    let core = unsafe { &*(h as *const Core) };
    core.signal_strength(peer_id).unwrap_or(NO_SAMPLE)
}

/// Mean of the peer's recent RSSI samples, or -1.0 if unknown (or h null).
#[no_mangle]
pub extern "C" fn prox_core_averaged_signal_strength(h: *mut c_void, peer_id: u32) -> f64 {
    if h.is_null() {
        return NO_SAMPLE as f64;
    }
    let core = unsafe { &*(h as *const Core) };
    core.averaged_signal_strength(peer_id).unwrap_or(NO_SAMPLE as f64)
}

/// Number of known peers, or -1 if h is null.
#[no_mangle]
pub extern "C" fn prox_core_peer_count(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let core = unsafe { &*(h as *const Core) };
    core.registry().len() as c_int
}

/// Forget every peer. Returns 0, or -1 if h is null.
#[no_mangle]
pub extern "C" fn prox_core_reset(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let core = unsafe { &mut *(h as *mut Core) };
    core.reset();
    0
}

#[no_mangle]
pub extern "C" fn prox_core_set_group(h: *mut c_void, group: u8) -> c_int {
    if h.is_null() {
        return -1;
    }
    let core = unsafe { &mut *(h as *mut Core) };
    match core.set_group(group) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Returns -1 if power is outside 0..=7.
#[no_mangle]
pub extern "C" fn prox_core_set_transmit_power(h: *mut c_void, power: u8) -> c_int {
    if h.is_null() {
        return -1;
    }
    let core = unsafe { &mut *(h as *mut Core) };
    match core.set_transmit_power(power) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn prox_core_send_number(h: *mut c_void, n: i32) -> c_int {
    if h.is_null() {
        return -1;
    }
    let core = unsafe { &mut *(h as *mut Core) };
    match core.send_number(n) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Queue a string transmit; s must be UTF-8.
#[no_mangle]
pub extern "C" fn prox_core_send_string(h: *mut c_void, s: *const u8, len: usize) -> c_int {
    if h.is_null() {
        return -1;
    }
    let core = unsafe { &mut *(h as *mut Core) };
    let Some(raw) = (unsafe { bytes(s, len) }) else {
        return -1;
    };
    let Ok(text) = std::str::from_utf8(raw) else {
        return -1;
    };
    match core.send_string(text) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

fn encoded_len(action: &OutboundAction) -> usize {
    match action {
        OutboundAction::SetGroup(_)
        | OutboundAction::SetTransmitPower(_)
        | OutboundAction::TransmitSerialNumber(_) => 2,
        OutboundAction::Transmit(Payload::Number(_)) => 1 + 4,
        OutboundAction::Transmit(Payload::Text(t)) => 1 + 1 + t.len(),
    }
}

/// Drain pending radio actions into out_buf: 4 bytes count (LE), then per action a tag byte
/// (0 group, 1 power, 2 serial on/off, 3 number, 4 text) followed by u8 / u8 / u8 / i32 LE /
/// (u8 len, bytes). Returns bytes written, 0 if nothing pending, -1 if out_buf is too small
/// (nothing is drained in that case).
#[no_mangle]
pub extern "C" fn prox_core_drain_outbound(
    h: *mut c_void,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if h.is_null() || out_buf.is_null() {
        return -1;
    }
    let core = unsafe { &mut *(h as *mut Core) };
    let pending = core.transport().pending();
    if pending.is_empty() {
        return 0;
    }
    let need = 4 + pending.iter().map(encoded_len).sum::<usize>();
    if out_buf_len < need {
        return -1;
    }
    let actions = core.transport_mut().drain();
    let buf = unsafe { slice::from_raw_parts_mut(out_buf, out_buf_len) };
    buf[0..4].copy_from_slice(&(actions.len() as u32).to_le_bytes());
    let mut off = 4;
    for a in &actions {
        match a {
            OutboundAction::SetGroup(g) => {
                buf[off] = TAG_SET_GROUP;
                buf[off + 1] = *g;
                off += 2;
            }
            OutboundAction::SetTransmitPower(p) => {
                buf[off] = TAG_SET_POWER;
                buf[off + 1] = *p;
                off += 2;
            }
            OutboundAction::TransmitSerialNumber(on) => {
                buf[off] = TAG_SERIAL;
                buf[off + 1] = u8::from(*on);
                off += 2;
            }
            OutboundAction::Transmit(Payload::Number(n)) => {
                buf[off] = TAG_NUMBER;
                buf[off + 1..off + 5].copy_from_slice(&n.to_le_bytes());
                off += 5;
            }
            OutboundAction::Transmit(Payload::Text(t)) => {
                buf[off] = TAG_TEXT;
                buf[off + 1] = t.len() as u8;
                buf[off + 2..off + 2 + t.len()].copy_from_slice(t.as_bytes());
                off += 2 + t.len();
            }
        }
    }
    off as c_int
}

/// Linear rescale; an empty input range yields inf/NaN.
#[no_mangle]
pub extern "C" fn prox_core_map(
    value: f64,
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
) -> f64 {
    rescale::map(value, in_min, in_max, out_min, out_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packets_and_queries_through_handle() {
        let h = prox_core_create();
        assert!(!h.is_null());
        assert_eq!(
            prox_core_on_packet(h, 0, std::ptr::null(), 0, std::ptr::null(), 0, 0, 42, -60),
            1
        );
        assert_eq!(
            prox_core_on_packet(h, 0, std::ptr::null(), 0, std::ptr::null(), 0, 0, 42, -70),
            2
        );
        assert_eq!(
            prox_core_on_packet(h, 0, std::ptr::null(), 0, std::ptr::null(), 0, 0, 0, -70),
            0
        );
        assert_eq!(prox_core_signal_strength(h, 42), -70);
        assert_eq!(prox_core_averaged_signal_strength(h, 42), -65.0);
        assert_eq!(prox_core_signal_strength(h, 7), -1);
        assert_eq!(prox_core_averaged_signal_strength(h, 7), -1.0);
        assert_eq!(prox_core_peer_count(h), 1);
        assert_eq!(prox_core_reset(h), 0);
        assert_eq!(prox_core_peer_count(h), 0);
        prox_core_destroy(h);
    }

    #[test]
    fn null_handle_is_safe() {
        let h = std::ptr::null_mut();
        assert_eq!(prox_core_signal_strength(h, 1), -1);
        assert_eq!(prox_core_peer_count(h), -1);
        assert_eq!(prox_core_send_number(h, 1), -1);
        prox_core_destroy(h);
    }

    #[test]
    fn drain_outbound_layout() {
        let h = prox_core_create();
        let mut buf = [0u8; 64];
        // Setup action: serial transmission on.
        assert_eq!(prox_core_drain_outbound(h, buf.as_mut_ptr(), buf.len()), 6);
        assert_eq!(&buf[..6], &[1, 0, 0, 0, TAG_SERIAL, 1]);
        assert_eq!(prox_core_drain_outbound(h, buf.as_mut_ptr(), buf.len()), 0);

        assert_eq!(prox_core_set_transmit_power(h, 9), -1);
        assert_eq!(prox_core_send_number(h, -2), 0);
        assert_eq!(prox_core_send_string(h, b"hi".as_ptr(), 2), 0);
        let mut small = [0u8; 8];
        assert_eq!(prox_core_drain_outbound(h, small.as_mut_ptr(), small.len()), -1);
        assert_eq!(prox_core_drain_outbound(h, buf.as_mut_ptr(), buf.len()), 4 + 5 + 4);
        assert_eq!(&buf[..4], &[2, 0, 0, 0]);
        assert_eq!(buf[4], TAG_NUMBER);
        assert_eq!(&buf[5..9], &(-2i32).to_le_bytes());
        assert_eq!(&buf[9..13], &[TAG_TEXT, 2, b'h', b'i']);
        prox_core_destroy(h);
    }

    #[test]
    fn map_through_abi() {
        assert_eq!(prox_core_map(5.0, 0.0, 10.0, 0.0, 100.0), 50.0);
    }
}
