//! Smartgrid coordinator daemon.
//!
//! Listens for power requests on the request port and broadcasts one grant
//! datagram per scheduling tick. See the library docs for the architecture.

use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use smartgrid_coordinator::{
    config::Config, listener, GrantBroadcaster, ServerState, TickDriver, TieredRoundRobin,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting smartgrid coordinator");

    let config = Config::from_env()?;
    info!(
        own_addr = %config.own_addr,
        broadcast_addr = %config.broadcast_addr,
        capacity_watts = config.capacity_watts,
        tick_ms = config.tick_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let state = Arc::new(Mutex::new(ServerState::new(config.capacity_watts)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Inbound request socket
    let request_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.request_port))
        .await
        .with_context(|| format!("failed to bind request port {}", config.request_port))?;

    let listener_handle = tokio::spawn({
        let state = Arc::clone(&state);
        let own_addr = config.own_addr;
        let shutdown_rx = shutdown_rx.clone();
        async move { listener::run_listener(request_socket, state, own_addr, shutdown_rx).await }
    });

    // Tick driver: scheduler + grant broadcaster
    let broadcaster =
        GrantBroadcaster::bind(config.broadcast_addr, config.grant_port, config.pad_grants).await?;
    let driver = TickDriver::new(
        Arc::clone(&state),
        Box::new(TieredRoundRobin::new(config.inherit_grants)),
        broadcaster,
        config.tick_interval,
    );
    let driver_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { driver.run(shutdown_rx).await }
    });

    // A listener or driver error is unrecoverable: the protocol tolerates
    // datagram loss, so a local failure means the socket itself is broken.
    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
        result = listener_handle => {
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "Request listener failed");
                    Err(e)
                }
                Err(e) => {
                    error!(error = %e, "Listener task panicked");
                    Err(e.into())
                }
            }
        }
        result = driver_handle => {
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "Tick driver failed");
                    Err(e)
                }
                Err(e) => {
                    error!(error = %e, "Tick driver task panicked");
                    Err(e.into())
                }
            }
        }
    };

    let _ = shutdown_tx.send(true);
    info!("Coordinator shutdown complete");
    result
}
