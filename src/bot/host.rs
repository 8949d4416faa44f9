//! Host facts and host control for the admin commands.
//!
//! The router only sees the [`HostControl`] trait so admin commands can be
//! exercised without touching the machine the tests run on.

use std::net::{IpAddr, UdpSocket};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use log::{debug, info};

/// Snapshot of the host for `.status`. Any fact that cannot be read is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostStatus {
    pub uptime_secs: Option<u64>,
    pub primary_ip: Option<IpAddr>,
    /// 1, 5 and 15 minute load averages
    pub load_average: Option<(f32, f32, f32)>,
    pub battery_percent: Option<u8>,
}

impl HostStatus {
    /// Reply lines, one fact per line.
    pub fn lines(&self) -> Vec<String> {
        let uptime = self
            .uptime_secs
            .map(format_uptime)
            .unwrap_or_else(|| "unknown".into());
        let ip = self
            .primary_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".into());
        let load = self
            .load_average
            .map(|(a, b, c)| format!("{a:.2} {b:.2} {c:.2}"))
            .unwrap_or_else(|| "unknown".into());
        let battery = self
            .battery_percent
            .map(|p| format!("{p}%"))
            .unwrap_or_else(|| "unknown".into());
        vec![
            format!("Up: {uptime}"),
            format!("IP: {ip}"),
            format!("Load: {load}"),
            format!("Batt: {battery}"),
        ]
    }
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let mins = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

pub trait HostControl: Send + Sync {
    fn status(&self) -> HostStatus;

    /// Start powering the host off. Must return without waiting for it.
    fn shutdown(&self) -> Result<()>;
}

/// The machine the bot runs on (Linux `/proc` and `/sys`).
#[derive(Debug, Clone)]
pub struct SystemHost {
    shutdown_command: Vec<String>,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self {
            shutdown_command: vec!["sudo".into(), "shutdown".into(), "-h".into(), "now".into()],
        }
    }
}

impl SystemHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shutdown_command(command: Vec<String>) -> Self {
        Self {
            shutdown_command: command,
        }
    }
}

impl HostControl for SystemHost {
    fn status(&self) -> HostStatus {
        HostStatus {
            uptime_secs: std::fs::read_to_string("/proc/uptime")
                .ok()
                .and_then(|s| parse_uptime(&s)),
            primary_ip: primary_ip(),
            load_average: std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|s| parse_loadavg(&s)),
            battery_percent: battery_percent(Path::new("/sys/class/power_supply")),
        }
    }

    fn shutdown(&self) -> Result<()> {
        let Some((program, args)) = self.shutdown_command.split_first() else {
            anyhow::bail!("no shutdown command configured");
        };
        info!("Starting host shutdown: {}", self.shutdown_command.join(" "));
        // Spawned and dropped: the child keeps running, nobody waits on it.
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        Ok(())
    }
}

fn parse_uptime(raw: &str) -> Option<u64> {
    let first = raw.split_whitespace().next()?;
    first.parse::<f64>().ok().map(|secs| secs as u64)
}

fn parse_loadavg(raw: &str) -> Option<(f32, f32, f32)> {
    let mut parts = raw.split_whitespace().map(|p| p.parse::<f32>().ok());
    Some((parts.next()??, parts.next()??, parts.next()??))
}

// The address the kernel would use for outbound traffic; no packet is sent.
fn primary_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("10.255.255.255:1").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_unspecified() {
        None
    } else {
        Some(ip)
    }
}

fn battery_percent(root: &Path) -> Option<u8> {
    let entries = std::fs::read_dir(root).ok()?;
    for entry in entries.flatten() {
        let capacity = entry.path().join("capacity");
        if let Ok(raw) = std::fs::read_to_string(&capacity) {
            if let Ok(pct) = raw.trim().parse::<u8>() {
                debug!("Battery capacity from {}", capacity.display());
                return Some(pct.min(100));
            }
        }
    }
    None
}
