//! Remote reachability probing
//!
//! Absence of network is an expected transient condition for a field
//! deployment, so the controller probes before querying and skips the cycle
//! when the remote host does not answer.

use std::process::{Command, Stdio};
use url::Url;

/// Host reachability probe
pub trait Reachability {
    /// One-shot boolean probe: does this host answer right now?
    fn is_reachable(&self, host: &str) -> bool;
}

/// Probe using the system `ping` binary, one packet, output suppressed
pub struct SystemPing;

impl Reachability for SystemPing {
    fn is_reachable(&self, host: &str) -> bool {
        Command::new("ping")
            .args(["-c", "1", host])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Reduce a configured endpoint to the bare host for pinging
///
/// Handles both full URLs (`http://192.168.1.20:8086`) and bare
/// `host:port` pairs (`192.168.1.20:8086`).
pub fn strip_port(endpoint: &str) -> String {
    if endpoint.contains("://") {
        if let Ok(url) = Url::parse(endpoint) {
            if let Some(host) = url.host_str() {
                return host.to_string();
            }
        }
    }
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            host.to_string()
        }
        _ => endpoint.to_string(),
    }
}
