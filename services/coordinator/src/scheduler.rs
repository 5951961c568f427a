//! Admission control and fair-share scheduling.
//!
//! Once per tick the policy decides, for every client with an outstanding
//! request, what tier it may draw, within the capacity budget. The scheduling
//! policy sits behind a trait so alternative strategies can be slotted in;
//! [`TieredRoundRobin`] is the canonical one: strict tier preference for
//! watts, with a rotating "first refusal" position for long-run fairness.

use tracing::trace;

use smartgrid_wire::PowerTier;

use crate::state::ServerState;

/// Counters summarizing one scheduling pass, for the tick log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Pending requests admitted at a non-Off tier.
    pub admitted: u32,

    /// Active requests bumped to a higher tier.
    pub upgraded: u32,

    /// Requests that completed their final tick.
    pub retired: u32,

    /// Pending requests left unmet this tick.
    pub deferred: u32,
}

impl TickStats {
    /// Whether anything worth logging happened.
    pub fn any(&self) -> bool {
        *self != TickStats::default()
    }
}

/// A scheduling strategy run by the tick driver.
pub trait AdmissionPolicy: Send {
    /// Policy name for logging.
    fn name(&self) -> &'static str;

    /// Run the admission pass for one tick: decide tiers, consume ticks of
    /// life, retire completed requests, and update the load accounting.
    fn schedule(&mut self, state: &mut ServerState) -> TickStats;

    /// Post-broadcast bookkeeping: settle the rotation position for the next
    /// tick.
    fn finish_tick(&mut self, state: &mut ServerState);
}

/// The canonical policy: tiered admission with round-robin fairness.
///
/// Each tick the client at the rotation offset is evaluated first and the
/// traversal wraps circularly through everyone else, so when capacity is
/// tight no client can be perpetually shadowed by earlier arrivals. A request
/// is never denied outright; it stays pending and is retried every tick until
/// capacity frees up.
#[derive(Debug)]
pub struct TieredRoundRobin {
    /// When a head request retires with another queued behind it, hand the
    /// retiring grant to the successor (which is then re-evaluated on the
    /// next admission pass) instead of releasing the watts.
    inherit_grants: bool,
}

impl TieredRoundRobin {
    pub fn new(inherit_grants: bool) -> Self {
        Self { inherit_grants }
    }
}

/// Pick the best admissible tier for a request, in strict preference order
/// `Both > High > Low > Off`, against the remaining budget.
///
/// `Low` is tried regardless of the requested tier: a client asking for
/// `High` or `Both` in a tight tick still gets a partial grant rather than
/// nothing.
fn best_tier(requested: PowerTier, load_without: i32, capacity: i32) -> PowerTier {
    let fits = |tier: PowerTier| load_without + tier.watts() <= capacity;
    if requested == PowerTier::Both && fits(PowerTier::Both) {
        PowerTier::Both
    } else if matches!(requested, PowerTier::High | PowerTier::Both) && fits(PowerTier::High) {
        PowerTier::High
    } else if fits(PowerTier::Low) {
        PowerTier::Low
    } else {
        PowerTier::Off
    }
}

impl AdmissionPolicy for TieredRoundRobin {
    fn name(&self) -> &'static str {
        "tiered-round-robin"
    }

    fn schedule(&mut self, state: &mut ServerState) -> TickStats {
        let mut stats = TickStats::default();
        let n = state.ledger.len();
        if n == 0 {
            return stats;
        }
        let capacity = state.capacity_watts;
        let mut load = state.current_load_watts;
        let mut priority_retired = false;

        for k in 0..n {
            let index = (state.priority_index + k) % n;
            let entry = state.ledger.client_at_mut(index);
            let Some(head) = entry.queue.front_mut() else {
                continue;
            };

            if head.is_active() {
                head.ticks_remaining -= 1;
                if head.is_retired() {
                    let granted = head.tier_granted;
                    entry.queue.pop_front();
                    // Watts free up immediately, so clients later in this
                    // same rotation can be admitted into the gap.
                    match entry.queue.front_mut() {
                        Some(next) if self.inherit_grants => {
                            next.tier_granted = granted;
                        }
                        _ => load -= granted.watts(),
                    }
                    stats.retired += 1;
                    if k == 0 {
                        priority_retired = true;
                    }
                    trace!(client = %entry.addr, released = %granted, "Request retired");
                } else if head.tier_requested != head.tier_granted {
                    // Room may have opened since admission; take it.
                    let without = load - head.tier_granted.watts();
                    let best = best_tier(head.tier_requested, without, capacity);
                    if best.watts() > head.tier_granted.watts() {
                        load = without + best.watts();
                        trace!(
                            client = %entry.addr,
                            from = %head.tier_granted,
                            to = %best,
                            "Opportunistic upgrade"
                        );
                        head.tier_granted = best;
                        stats.upgraded += 1;
                    }
                }
            } else if head.is_pending() {
                // The current grant is usually Off here; it can be non-Off
                // when the request inherited a retiring grant, in which case
                // this is its re-evaluation.
                let without = load - head.tier_granted.watts();
                let best = best_tier(head.tier_requested, without, capacity);
                head.tier_granted = best;
                if best != PowerTier::Off {
                    head.ticks_remaining = head.ticks_requested;
                    head.ticks_requested = 0;
                    stats.admitted += 1;
                    trace!(client = %entry.addr, granted = %best, "Request admitted");
                } else {
                    stats.deferred += 1;
                }
                load = without + best.watts();
            }
        }

        state.current_load_watts = load;
        // Once the priority client has been served to completion, first
        // refusal moves on; it is never priority for two consecutive ticks
        // after being satisfied.
        if priority_retired {
            state.priority_index = (state.priority_index + 1) % n;
        }
        stats
    }

    fn finish_tick(&mut self, state: &mut ServerState) {
        let n = state.ledger.len();
        if n == 0 {
            return;
        }
        // Skip the rotation position past clients with nothing queued, so
        // next tick's first refusal goes to real demand.
        for _ in 0..n {
            if state
                .ledger
                .clients()[state.priority_index]
                .queue
                .is_empty()
            {
                state.priority_index = (state.priority_index + 1) % n;
            } else {
                break;
            }
        }
    }
}
