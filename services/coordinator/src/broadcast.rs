//! Grant broadcasting.
//!
//! Once per tick, after the scheduler runs, the broadcaster serializes the
//! ledger's grant state into a single datagram and sends it to the subnet
//! broadcast address. It never mutates scheduler state; grants are reissued
//! every tick, so a lost frame is repaired by the next one.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use smartgrid_wire::{encode_grant, WireError};

use crate::state::ServerState;

/// Sends one grant datagram per tick to the broadcast address.
pub struct GrantBroadcaster {
    socket: UdpSocket,
    dest: SocketAddr,
    pad_frames: bool,
}

impl GrantBroadcaster {
    /// Bind an outbound socket (dynamic port) with broadcast permission.
    pub async fn bind(broadcast_addr: Ipv4Addr, grant_port: u16, pad_frames: bool) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("failed to bind grant socket")?;
        socket
            .set_broadcast(true)
            .context("failed to enable broadcast on grant socket")?;
        Ok(Self {
            socket,
            dest: SocketAddr::V4(SocketAddrV4::new(broadcast_addr, grant_port)),
            pad_frames,
        })
    }

    /// Broadcast the current grant state.
    ///
    /// A frame that cannot fit every client is a configuration-time bound
    /// being hit; the broadcast is skipped with a warning and the scheduling
    /// decisions stand to be re-sent next tick. Socket errors are propagated:
    /// the protocol already tolerates loss, so a local send failure means the
    /// socket itself is gone.
    pub async fn broadcast(&self, state: &ServerState) -> Result<()> {
        let entries = state.grant_entries();
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let frame = match encode_grant(timestamp_ms, &entries, self.pad_frames) {
            Ok(frame) => frame,
            Err(err @ WireError::CapacityExceeded { .. }) => {
                warn!(
                    clients = entries.len(),
                    error = %err,
                    "Too many clients for one grant frame, skipping this tick's broadcast"
                );
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        self.socket
            .send_to(&frame, self.dest)
            .await
            .context("failed to send grant broadcast")?;
        debug!(
            clients = entries.len(),
            bytes = frame.len(),
            dest = %self.dest,
            "Grant broadcast sent"
        );
        Ok(())
    }
}
