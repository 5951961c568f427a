//! Request ingestion.
//!
//! Receives request datagrams, decodes them, and submits them to the shared
//! ledger. Runs continuously and independently of the tick driver; the two
//! only meet at the state mutex.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use smartgrid_wire::{decode_request, REQUEST_FRAME_LEN};

use crate::state::ServerState;

/// Receive buffer size; anything longer than a request frame is malformed
/// anyway, but reading the real length lets us log it.
const RECV_BUF_LEN: usize = 4 * REQUEST_FRAME_LEN;

/// Run the request listener until shutdown.
///
/// Malformed or invalid requests are dropped without a reply (there is no
/// negative acknowledgment in this protocol). Datagrams sourced from the
/// coordinator's own address are ignored so a broadcast reflection can never
/// be ingested as demand.
pub async fn run_listener(
    socket: UdpSocket,
    state: Arc<Mutex<ServerState>>,
    own_addr: Ipv4Addr,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listen = socket
        .local_addr()
        .context("request socket has no local address")?;
    info!(listen = %listen, "Listening for power requests");
    let mut buf = [0u8; RECV_BUF_LEN];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, src) = received.context("request socket receive failed")?;
                let SocketAddr::V4(src) = src else {
                    continue;
                };
                if *src.ip() == own_addr {
                    continue;
                }
                match decode_request(&buf[..len]) {
                    Ok(frame) => {
                        let mut state = state.lock().await;
                        state.submit(*src.ip(), frame.tier_watts, frame.ticks_requested);
                    }
                    Err(err) => {
                        debug!(src = %src, len, error = %err, "Dropping malformed request");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Request listener shutting down");
                    break;
                }
            }
        }
    }
    Ok(())
}
