//! Smartgrid coordinator library.
//!
//! The coordinator shares a finite electrical capacity budget among
//! competing clients over an unreliable broadcast network. Clients send
//! fixed-size request datagrams ("tier T for L ticks"); a fixed-period tick
//! loop decides who may draw what and broadcasts one grant datagram per tick.
//!
//! ## Architecture
//!
//! - `listener`: receives and validates inbound requests, feeds the ledger
//! - `ledger`: per-client FIFO queues of pending/active requests
//! - `scheduler`: tiered round-robin admission under the capacity budget
//! - `broadcast`: serializes grant state into one datagram per tick
//! - `worker`: the periodic tick driver gluing scheduler and broadcaster
//!
//! The listener task and the tick driver share one `ServerState` behind a
//! single mutex; that mutex is the entire concurrency story.

pub mod broadcast;
pub mod config;
pub mod ledger;
pub mod listener;
pub mod scheduler;
pub mod state;
pub mod worker;

// Re-export commonly used types
pub use broadcast::GrantBroadcaster;
pub use config::Config;
pub use ledger::{ClientEntry, PowerRequest, RequestLedger};
pub use scheduler::{AdmissionPolicy, TickStats, TieredRoundRobin};
pub use state::ServerState;
pub use worker::TickDriver;
