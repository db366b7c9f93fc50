//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;

/// Daemon configuration. File: ~/.config/proximity/config.toml or /etc/proximity/config.toml.
/// Env overrides: PROXIMITY_PORT, PROXIMITY_GROUP, PROXIMITY_POWER, PROXIMITY_SERIAL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Multicast UDP port standing in for the radio channel (default 45690).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Radio group; only frames from the same group are heard (default 0).
    #[serde(default)]
    pub group: u8,
    /// Transmit power level 0..=7 (default 6).
    #[serde(default = "default_transmit_power")]
    pub transmit_power: u8,
    /// Serial to transmit; 0 derives one from the machine id.
    #[serde(default)]
    pub serial: u32,
    #[serde(default = "default_beacon_interval_ms")]
    pub beacon_interval_ms: u64,
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    /// Fixed attenuation between any two hosts, in dB.
    #[serde(default = "default_path_loss_db")]
    pub path_loss_db: i32,
    /// Uniform noise added to every RSSI sample, +/- dB.
    #[serde(default = "default_jitter_db")]
    pub jitter_db: i32,
}

fn default_port() -> u16 {
    45690
}
fn default_transmit_power() -> u8 {
    prox_core::proximity::DEFAULT_TRANSMIT_POWER
}
fn default_beacon_interval_ms() -> u64 {
    1000
}
fn default_report_interval_ms() -> u64 {
    5000
}
fn default_path_loss_db() -> i32 {
    70
}
fn default_jitter_db() -> i32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            group: 0,
            transmit_power: default_transmit_power(),
            serial: 0,
            beacon_interval_ms: default_beacon_interval_ms(),
            report_interval_ms: default_report_interval_ms(),
            path_loss_db: default_path_loss_db(),
            jitter_db: default_jitter_db(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(p) = var("PROXIMITY_PORT").and_then(|s| s.parse().ok()) {
        c.port = p;
    }
    if let Some(g) = var("PROXIMITY_GROUP").and_then(|s| s.parse().ok()) {
        c.group = g;
    }
    if let Some(p) = var("PROXIMITY_POWER").and_then(|s| s.parse().ok()) {
        c.transmit_power = p;
    }
    if let Some(s) = var("PROXIMITY_SERIAL").and_then(|s| s.parse().ok()) {
        c.serial = s;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/proximity/config.toml"));
    }
    out.push(PathBuf::from("/etc/proximity/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            let s = match std::fs::read_to_string(&p) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("cannot read {}: {}", p.display(), e);
                    break;
                }
            };
            match toml::from_str::<Config>(&s) {
                Ok(c) => {
                    log::info!("loaded config from {}", p.display());
                    return Some(c);
                }
                Err(e) => log::warn!("ignoring invalid config {}: {}", p.display(), e),
            }
            break;
        }
    }
    None
}
