// Proximity daemon: emulated radio over UDP multicast, peer tracking, periodic signal reports.

mod config;
mod identity;
mod radio;
mod wire;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use prox_core::Proximity;
use tokio::sync::Mutex;

use radio::{LinkModel, UdpRadio};

const VERSION: &str = env!("CARGO_PKG_VERSION");

type SharedCore = Arc<Mutex<Proximity<UdpRadio>>>;

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("prox-linux {}", VERSION);
            return Ok(());
        }
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = config::load();
    let serial = if cfg.serial == 0 {
        identity::device_serial()
    } else {
        cfg.serial
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cfg, serial))
}

async fn run(cfg: config::Config, serial: u32) -> anyhow::Result<()> {
    let (radio, rx_socket) = UdpRadio::open(cfg.port, serial)
        .with_context(|| format!("open radio on port {}", cfg.port))?;
    log::info!(
        "radio up: serial {}, group {}, power {}, port {}",
        radio.serial(),
        cfg.group,
        cfg.transmit_power,
        cfg.port
    );

    let mut core = Proximity::new(radio)?;
    core.set_group(cfg.group)?;
    core.set_transmit_power(cfg.transmit_power)?;
    let core: SharedCore = Arc::new(Mutex::new(core));

    let link = LinkModel {
        path_loss_db: cfg.path_loss_db,
        jitter_db: cfg.jitter_db,
    };
    let rx_core = core.clone();
    tokio::spawn(async move {
        if let Err(e) = radio::run_receiver(rx_socket, rx_core, serial, link).await {
            log::error!("receiver stopped: {}", e);
        }
    });
    tokio::spawn(beacon_loop(
        core.clone(),
        Duration::from_millis(cfg.beacon_interval_ms),
    ));
    tokio::spawn(report_loop(
        core.clone(),
        Duration::from_millis(cfg.report_interval_ms),
    ));

    shutdown_signal().await?;
    log::info!("shutting down");
    Ok(())
}

/// Broadcast a sequence number so peers can hear us.
async fn beacon_loop(core: SharedCore, interval: Duration) {
    let mut seq: i32 = 0;
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = core.lock().await.send_number(seq) {
            log::warn!("beacon {} not sent: {}", seq, e);
        }
        seq = seq.wrapping_add(1);
    }
}

/// Log every known peer's instant and averaged signal, and the nearest peer.
async fn report_loop(core: SharedCore, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let p = core.lock().await;
        let reg = p.registry();
        if reg.is_empty() {
            log::info!("no peers in range");
            continue;
        }
        for peer in reg.peers() {
            log::info!(
                "peer {:>10}: rssi {:>4} avg {:>7.2} packets {}",
                peer.id(),
                peer.last_signal(),
                peer.averaged_signal().unwrap_or(f64::NAN),
                peer.packets_received()
            );
        }
        if let Some((id, avg)) = reg.nearest_peer() {
            log::info!("nearest peer {} ({:.2} dBm)", id, avg);
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
