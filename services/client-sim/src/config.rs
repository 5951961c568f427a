//! Client simulator configuration (env-driven).

use std::net::Ipv4Addr;

use anyhow::{Context, Result};

/// Client simulator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// This client's own IPv4 address, used to pick our segment out of each
    /// grant frame.
    pub client_addr: Ipv4Addr,

    /// Coordinator address requests are sent to.
    pub server_addr: Ipv4Addr,

    /// Coordinator's request port.
    pub request_port: u16,

    /// Port to listen on for grant broadcasts.
    pub grant_port: u16,

    /// Target duty fraction of the demand process, in (0, 1).
    pub rho: f64,

    /// Mean demand cycle length in ticks.
    pub cycle_length: u32,

    /// Seed for reproducible runs; random otherwise.
    pub seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let client_addr: Ipv4Addr = std::env::var("GRID_CLIENT_ADDR")
            .context("Missing client address. Set GRID_CLIENT_ADDR.")?
            .parse()
            .context("GRID_CLIENT_ADDR must be an IPv4 address.")?;

        let server_addr: Ipv4Addr = std::env::var("GRID_SERVER_ADDR")
            .context("Missing coordinator address. Set GRID_SERVER_ADDR.")?
            .parse()
            .context("GRID_SERVER_ADDR must be an IPv4 address.")?;

        let request_port: u16 = std::env::var("GRID_REQUEST_PORT")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GRID_REQUEST_PORT must be a port number.")?
            .unwrap_or(1234);

        let grant_port: u16 = std::env::var("GRID_GRANT_PORT")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GRID_GRANT_PORT must be a port number.")?
            .unwrap_or(1235);

        let rho: f64 = std::env::var("GRID_RHO")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GRID_RHO must be a number in (0, 1).")?
            .unwrap_or(0.3);
        anyhow::ensure!(rho > 0.0 && rho < 1.0, "GRID_RHO must be in (0, 1).");

        let cycle_length: u32 = std::env::var("GRID_CYCLE_LENGTH")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GRID_CYCLE_LENGTH must be an integer (ticks).")?
            .unwrap_or(10);
        anyhow::ensure!(cycle_length > 0, "GRID_CYCLE_LENGTH must be positive.");

        let seed: Option<u64> = std::env::var("GRID_SEED")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GRID_SEED must be an integer.")?;

        Ok(Self {
            client_addr,
            server_addr,
            request_port,
            grant_port,
            rho,
            cycle_length,
            seed,
        })
    }
}
