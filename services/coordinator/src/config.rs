//! Coordinator configuration (env-driven).

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default port the coordinator listens on for requests.
pub const DEFAULT_REQUEST_PORT: u16 = 1234;

/// Default port grants are broadcast to.
pub const DEFAULT_GRANT_PORT: u16 = 1235;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The coordinator's own IPv4 address, used to discard reflected
    /// datagrams sourced from ourselves.
    pub own_addr: Ipv4Addr,

    /// Subnet broadcast address grants are sent to.
    pub broadcast_addr: Ipv4Addr,

    /// Total capacity budget in watts.
    pub capacity_watts: i32,

    /// Port to listen on for request datagrams.
    pub request_port: u16,

    /// Destination port for grant datagrams (must differ from the request
    /// port; clients listen here).
    pub grant_port: u16,

    /// Scheduling period.
    pub tick_interval: Duration,

    /// Pad grant frames to the full 1472 bytes with the 0x55 filler.
    pub pad_grants: bool,

    /// Retiring grants are inherited by the client's next queued request.
    pub inherit_grants: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let own_addr: Ipv4Addr = std::env::var("GRID_BIND_ADDR")
            .context("Missing coordinator address. Set GRID_BIND_ADDR.")?
            .parse()
            .context("GRID_BIND_ADDR must be an IPv4 address.")?;

        let broadcast_addr: Ipv4Addr = std::env::var("GRID_BROADCAST_ADDR")
            .context("Missing broadcast address. Set GRID_BROADCAST_ADDR.")?
            .parse()
            .context("GRID_BROADCAST_ADDR must be an IPv4 address.")?;

        let capacity_watts: i32 = std::env::var("GRID_CAPACITY_WATTS")
            .context("Missing capacity budget. Set GRID_CAPACITY_WATTS.")?
            .parse()
            .context("GRID_CAPACITY_WATTS must be an integer (watts).")?;
        anyhow::ensure!(capacity_watts > 0, "GRID_CAPACITY_WATTS must be positive.");

        let request_port: u16 = std::env::var("GRID_REQUEST_PORT")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GRID_REQUEST_PORT must be a port number.")?
            .unwrap_or(DEFAULT_REQUEST_PORT);

        let grant_port: u16 = std::env::var("GRID_GRANT_PORT")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GRID_GRANT_PORT must be a port number.")?
            .unwrap_or(DEFAULT_GRANT_PORT);
        anyhow::ensure!(
            request_port != grant_port,
            "GRID_REQUEST_PORT and GRID_GRANT_PORT must differ."
        );

        let tick_ms: u64 = std::env::var("GRID_TICK_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GRID_TICK_MS must be an integer (milliseconds).")?
            .unwrap_or(1000);
        let tick_interval = Duration::from_millis(tick_ms.max(50));

        let pad_grants = env_flag("GRID_PAD_GRANTS");
        let inherit_grants = env_flag("GRID_INHERIT_GRANTS");

        Ok(Self {
            own_addr,
            broadcast_addr,
            capacity_watts,
            request_port,
            grant_port,
            tick_interval,
            pad_grants,
            inherit_grants,
        })
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
