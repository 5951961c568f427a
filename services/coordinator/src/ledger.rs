//! Per-client request bookkeeping.
//!
//! The ledger owns one queue of [`PowerRequest`]s per client, in arrival
//! order. Only the head of a queue is ever served or considered for
//! admission; everything behind it waits its turn (FIFO per client).
//! Client entries are created on first request and never removed, so the
//! ledger's iteration order is stable for the life of the process — the
//! scheduler's rotation offset indexes into that order.

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use tracing::{debug, info};

use smartgrid_wire::PowerTier;

/// One pending or active unit of demand from one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerRequest {
    /// Tier the client asked for.
    pub tier_requested: PowerTier,

    /// Tier actually allocated; `Off` until the scheduler admits it.
    pub tier_granted: PowerTier,

    /// Ticks of service still being asked for, before admission.
    pub ticks_requested: u32,

    /// Ticks of life left after admission; decremented once per tick.
    pub ticks_remaining: u32,
}

impl PowerRequest {
    /// A freshly submitted, not-yet-admitted request.
    pub fn pending(tier: PowerTier, ticks: u32) -> Self {
        Self {
            tier_requested: tier,
            tier_granted: PowerTier::Off,
            ticks_requested: ticks,
            ticks_remaining: 0,
        }
    }

    /// Waiting for admission.
    pub fn is_pending(&self) -> bool {
        self.ticks_requested > 0
    }

    /// Admitted and consuming ticks of life.
    pub fn is_active(&self) -> bool {
        self.ticks_remaining > 0
    }

    /// Fully served; eligible to be popped from its queue.
    pub fn is_retired(&self) -> bool {
        self.ticks_requested == 0 && self.ticks_remaining == 0
    }
}

/// A client's slot in the ledger: address plus its request queue.
#[derive(Debug)]
pub struct ClientEntry {
    /// Client network address (the key).
    pub addr: Ipv4Addr,

    /// Requests in arrival order; the front is the head request.
    pub queue: VecDeque<PowerRequest>,
}

impl ClientEntry {
    fn new(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            queue: VecDeque::new(),
        }
    }

    /// The head request, if any.
    pub fn head(&self) -> Option<&PowerRequest> {
        self.queue.front()
    }

    /// Watts currently attributed to this client in the capacity accounting.
    pub fn granted_watts(&self) -> i32 {
        self.head().map_or(0, |r| r.tier_granted.watts())
    }
}

/// Ordered map of clients to their request queues.
#[derive(Debug, Default)]
pub struct RequestLedger {
    clients: Vec<ClientEntry>,
}

impl RequestLedger {
    /// Submit an inbound request.
    ///
    /// Invalid requests (non-positive tick count, unrecognized or zero-watt
    /// tier) are dropped here with a log line; the protocol has no negative
    /// acknowledgment, so nothing is reported back to the sender. Returns
    /// whether the request was queued.
    pub fn submit(&mut self, addr: Ipv4Addr, tier_watts: i32, ticks_requested: i32) -> bool {
        let tier = match PowerTier::from_watts(tier_watts) {
            Some(PowerTier::Off) | None => {
                debug!(
                    client = %addr,
                    tier_watts,
                    "Dropping request with invalid tier"
                );
                return false;
            }
            Some(tier) => tier,
        };
        if ticks_requested <= 0 {
            debug!(
                client = %addr,
                ticks_requested,
                "Dropping request with non-positive tick count"
            );
            return false;
        }

        let index = match self.clients.iter().position(|c| c.addr == addr) {
            Some(index) => index,
            None => {
                self.clients.push(ClientEntry::new(addr));
                self.clients.len() - 1
            }
        };
        let entry = &mut self.clients[index];
        entry
            .queue
            .push_back(PowerRequest::pending(tier, ticks_requested as u32));
        info!(
            client = %addr,
            requested = %tier,
            ticks = ticks_requested,
            queue_depth = entry.queue.len(),
            "Request queued"
        );
        true
    }

    /// Number of known clients (including ones with empty queues).
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether any client has ever been seen.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// All clients, in insertion order.
    pub fn clients(&self) -> &[ClientEntry] {
        &self.clients
    }

    /// Mutable access to the client at a rotation position.
    pub fn client_at_mut(&mut self, index: usize) -> &mut ClientEntry {
        &mut self.clients[index]
    }

    /// True sum of per-client granted watts.
    pub fn granted_sum(&self) -> i32 {
        self.clients.iter().map(ClientEntry::granted_watts).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn test_submit_creates_entry_and_queues_fifo() {
        let mut ledger = RequestLedger::default();
        assert!(ledger.submit(addr(1), 60, 3));
        assert!(ledger.submit(addr(1), 40, 2));
        assert_eq!(ledger.len(), 1);

        let entry = &ledger.clients()[0];
        assert_eq!(entry.queue.len(), 2);
        assert_eq!(entry.head().unwrap().tier_requested, PowerTier::High);
        assert_eq!(entry.queue[1].tier_requested, PowerTier::Low);
    }

    #[test]
    fn test_submit_rejects_invalid_fields() {
        let mut ledger = RequestLedger::default();
        assert!(!ledger.submit(addr(1), 60, 0));
        assert!(!ledger.submit(addr(1), 60, -4));
        assert!(!ledger.submit(addr(1), 55, 3));
        assert!(!ledger.submit(addr(1), 0, 3));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_request_state_predicates() {
        let mut req = PowerRequest::pending(PowerTier::Low, 2);
        assert!(req.is_pending() && !req.is_active() && !req.is_retired());

        req.tier_granted = PowerTier::Low;
        req.ticks_remaining = req.ticks_requested;
        req.ticks_requested = 0;
        assert!(!req.is_pending() && req.is_active() && !req.is_retired());

        req.ticks_remaining = 0;
        assert!(req.is_retired());
    }

    #[test]
    fn test_granted_sum_tracks_heads_only() {
        let mut ledger = RequestLedger::default();
        ledger.submit(addr(1), 60, 3);
        ledger.submit(addr(1), 100, 1);
        ledger.submit(addr(2), 40, 2);
        assert_eq!(ledger.granted_sum(), 0);

        let head = ledger.client_at_mut(0).queue.front_mut().unwrap();
        head.tier_granted = PowerTier::High;
        assert_eq!(ledger.granted_sum(), 60);
    }
}
