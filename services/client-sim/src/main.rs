//! Smartgrid client simulator.
//!
//! Listens for grant broadcasts and runs a two-state Markov demand process:
//! each grant period the process may open a demand window, in which case the
//! client sends one request datagram ("tier T for L ticks") to the
//! coordinator, then rides the periodic grants until the window retires.

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use smartgrid_wire::{
    decode_grant, encode_request, PowerTier, RequestFrame, GRANT_FRAME_MAX,
};

mod config;
mod generator;

use config::Config;
use generator::{MarkovGenerator, Transition};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting smartgrid client simulator");

    let config = Config::from_env()?;
    info!(
        client_addr = %config.client_addr,
        server_addr = %config.server_addr,
        rho = config.rho,
        cycle_length = config.cycle_length,
        "Configuration loaded"
    );

    let grant_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.grant_port))
        .await
        .with_context(|| format!("failed to bind grant port {}", config.grant_port))?;
    let request_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .context("failed to bind request socket")?;

    let mut demand = MarkovGenerator::new(config.rho, config.cycle_length, config.seed);
    info!(
        p = demand.p(),
        q = demand.q(),
        "Demand process initialized"
    );
    let mut holding = PowerTier::Off;
    let mut buf = [0u8; GRANT_FRAME_MAX];

    loop {
        tokio::select! {
            received = grant_socket.recv_from(&mut buf) => {
                let (len, _src) = received.context("grant socket receive failed")?;
                let grant = match decode_grant(&buf[..len]) {
                    Ok(grant) => grant,
                    Err(err) => {
                        debug!(len, error = %err, "Ignoring undecodable grant frame");
                        continue;
                    }
                };
                let granted = grant
                    .entry_for(config.client_addr)
                    .map(|entry| entry.granted)
                    .unwrap_or_default();
                if granted != holding {
                    info!(granted = %granted, was = %holding, "Grant level changed");
                    holding = granted;
                }

                // One generator step per grant period.
                match demand.step() {
                    Transition::TurnOn { tier, ticks } => {
                        let request = RequestFrame {
                            timestamp_ms: chrono::Utc::now().timestamp_millis(),
                            tier_watts: tier.watts(),
                            ticks_requested: ticks as i32,
                        };
                        request_socket
                            .send_to(
                                &encode_request(&request),
                                (config.server_addr, config.request_port),
                            )
                            .await
                            .context("failed to send power request")?;
                        info!(requested = %tier, ticks, "Demand window opened, request sent");
                    }
                    Transition::TurnOff => {
                        if holding != PowerTier::Off {
                            warn!(holding = %holding, "Demand window closed with a live grant");
                        } else {
                            info!("Demand window closed");
                        }
                    }
                    Transition::StayOn | Transition::StayOff => {}
                }
                debug!(on = demand.is_on(), granted = %granted, "Grant period processed");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Client simulator shutting down");
                break;
            }
        }
    }
    Ok(())
}
