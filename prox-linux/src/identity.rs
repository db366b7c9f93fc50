//! Device serial: stable 32-bit id this host transmits with every radio frame.

use rand::RngCore;
use sha2::{Digest, Sha256};

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Derive a serial from stable host identity: machine-id, else hostname, else random.
/// Never returns 0 (reserved for "no serial").
pub fn device_serial() -> u32 {
    let seed = MACHINE_ID_PATHS
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty());
    match seed {
        Some(s) => serial_from_seed(s.as_bytes()),
        None => {
            log::warn!("no machine-id or hostname; using a random serial");
            nonzero(rand::thread_rng().next_u32())
        }
    }
}

/// First 4 bytes (LE) of SHA-256 over the seed.
pub fn serial_from_seed(seed: &[u8]) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(b"proximity-serial-v1");
    hasher.update(seed);
    let digest = hasher.finalize();
    nonzero(u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

fn nonzero(v: u32) -> u32 {
    if v == 0 {
        1
    } else {
        v
    }
}
