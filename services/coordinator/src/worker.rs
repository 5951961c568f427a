//! Periodic tick driver.
//!
//! Fires the scheduling pass on a fixed period: admission pass, grant
//! broadcast, then rotation settlement, all under one lock acquisition so
//! request ingestion never interleaves with a tick in progress.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};

use crate::broadcast::GrantBroadcaster;
use crate::scheduler::AdmissionPolicy;
use crate::state::ServerState;

/// Drives the scheduler and broadcaster once per tick.
pub struct TickDriver {
    state: Arc<Mutex<ServerState>>,
    policy: Box<dyn AdmissionPolicy>,
    broadcaster: GrantBroadcaster,
    period: Duration,
}

impl TickDriver {
    /// Create a new tick driver.
    pub fn new(
        state: Arc<Mutex<ServerState>>,
        policy: Box<dyn AdmissionPolicy>,
        broadcaster: GrantBroadcaster,
        period: Duration,
    ) -> Self {
        Self {
            state,
            policy,
            broadcaster,
            period,
        }
    }

    /// Run the tick loop until shutdown is signaled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            period_ms = self.period.as_millis() as u64,
            policy = self.policy.name(),
            "Starting tick driver"
        );

        let mut interval = tokio::time::interval(self.period);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_tick().await {
                        error!(error = %e, "Tick failed");
                        return Err(e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Tick driver shutting down");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Run a single tick: schedule, broadcast, settle rotation.
    pub async fn run_tick(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        let stats = self.policy.schedule(&mut state);
        self.broadcaster.broadcast(&state).await?;
        self.policy.finish_tick(&mut state);
        state.assert_consistent();

        if stats.any() {
            info!(
                admitted = stats.admitted,
                upgraded = stats.upgraded,
                retired = stats.retired,
                deferred = stats.deferred,
                load_watts = state.current_load_watts,
                capacity_watts = state.capacity_watts,
                "Tick complete"
            );
        }
        Ok(())
    }
}
