// Discovery Module - UDP broadcast search for bridges on the local network
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info};

pub const DISCOVERY_PORT: u16 = 48899;
// v6 bridges answer the first probe, v5 bridges the second
pub const PROBES: [&[u8]; 2] = [b"HF-A11ASSISTHREAD", b"Link_Wi-Fi"];
const PROBE_ROUNDS: usize = 10;
const PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Extracts the bridge address from an `ip,mac,...` reply
pub fn parse_reply(data: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(data).ok()?;
    let (ip, _) = text.split_once(',')?;
    let ip = ip.trim();
    if ip.is_empty() {
        None
    } else {
        Some(ip.to_string())
    }
}

pub async fn discover_bridges(wait: Duration) -> Result<Vec<String>> {
    discover_at(SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVERY_PORT)), wait).await
}

/// Sends the probes to `target` and collects replies until `wait` has passed
/// after the last probe. Results are deduplicated and sorted.
pub async fn discover_at(target: SocketAddr, wait: Duration) -> Result<Vec<String>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .context("Failed to bind discovery socket")?;
    socket.set_broadcast(true).context("Failed to enable broadcast")?;

    for _ in 0..PROBE_ROUNDS {
        for probe in PROBES {
            socket
                .send_to(probe, target)
                .await
                .with_context(|| format!("Failed to send discovery probe to {}", target))?;
        }
        sleep(PROBE_INTERVAL).await;
    }

    let mut bridges = BTreeSet::new();
    let mut buf = [0u8; 64];
    let deadline = Instant::now() + wait;
    while let Ok(received) = timeout_at(deadline, socket.recv_from(&mut buf)).await {
        let (len, from) = received.context("Failed to receive discovery reply")?;
        match parse_reply(&buf[..len]) {
            Some(ip) => {
                debug!(%ip, %from, "bridge answered");
                bridges.insert(ip);
            }
            None => debug!(%from, "ignoring malformed discovery reply"),
        }
    }

    info!(count = bridges.len(), "bridge discovery finished");
    Ok(bridges.into_iter().collect())
}
