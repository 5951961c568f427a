//! Coordinator state shared between the listener and the tick driver.
//!
//! One explicit value behind a single `Arc<Mutex<..>>`; that mutex is the
//! entire mutual-exclusion domain for the coordinator (see the tick driver).

use std::net::Ipv4Addr;

use smartgrid_wire::GrantEntry;

use crate::ledger::RequestLedger;

/// All mutable coordinator state.
#[derive(Debug)]
pub struct ServerState {
    /// Total capacity budget in watts. Immutable after startup.
    pub capacity_watts: i32,

    /// Sum of all head requests' granted watts.
    ///
    /// Must equal [`RequestLedger::granted_sum`] at all times; the scheduler
    /// maintains this incrementally and [`ServerState::assert_consistent`]
    /// checks it after every tick.
    pub current_load_watts: i32,

    /// Per-client request queues.
    pub ledger: RequestLedger,

    /// Rotation offset into the ledger's client order; the client at this
    /// position is served first on the next tick.
    pub priority_index: usize,
}

impl ServerState {
    /// Create fresh state with the given capacity budget.
    pub fn new(capacity_watts: i32) -> Self {
        Self {
            capacity_watts,
            current_load_watts: 0,
            ledger: RequestLedger::default(),
            priority_index: 0,
        }
    }

    /// Submit an inbound request (listener path).
    pub fn submit(&mut self, addr: Ipv4Addr, tier_watts: i32, ticks_requested: i32) -> bool {
        self.ledger.submit(addr, tier_watts, ticks_requested)
    }

    /// Snapshot the grant state of every known client, in ledger order.
    ///
    /// Clients with nothing granted are included with an `Off` entry so
    /// receivers can distinguish "no grant" from "not heard from server".
    pub fn grant_entries(&self) -> Vec<GrantEntry> {
        self.ledger
            .clients()
            .iter()
            .map(|client| {
                let (granted, ticks_remaining) = client
                    .head()
                    .map(|head| (head.tier_granted, head.ticks_remaining))
                    .unwrap_or_default();
                GrantEntry {
                    addr: client.addr,
                    granted,
                    ticks_remaining,
                }
            })
            .collect()
    }

    /// Check the load-accounting invariants.
    ///
    /// A mismatch here is a scheduler bug, not a runtime condition; it can
    /// never be reached through the public API.
    pub fn assert_consistent(&self) {
        debug_assert!(
            self.current_load_watts >= 0,
            "negative load {}",
            self.current_load_watts
        );
        debug_assert!(
            self.current_load_watts <= self.capacity_watts,
            "load {} exceeds capacity {}",
            self.current_load_watts,
            self.capacity_watts
        );
        debug_assert_eq!(
            self.current_load_watts,
            self.ledger.granted_sum(),
            "load accounting diverged from ledger"
        );
    }
}
