//! Garter Session Node
//!
//! One process, one node, one role at a time out of
//! {COORDINATOR, DEPUTY, NORMAL, VIEWER}. This crate owns everything between
//! the sockets and the simulation:
//!
//! - [`core`]: the sans-I/O protocol core. [`core::NodeCore`] consumes
//!   inbound datagrams and timer firings and returns [`core::Effect`]s
//!   (datagrams to send, events for the UI). Every protocol rule lives here,
//!   which is also what makes the whole state machine testable without a
//!   socket in sight.
//! - [`runtime`]: the threaded shell. [`runtime::Node`] binds the transport,
//!   wraps the core in the one per-node mutex, and runs the receive loops
//!   and periodic timers, none of which ever hold the lock across I/O.
//! - [`config`]: session/player option validation.
//!
//! The timer cadences below all derive from the session's `state_delay_ms`,
//! so one slow-ticking session does not burn bandwidth and a fast one fails
//! over quickly.

#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod runtime;

pub use self::config::{ConfigError, JoinOptions, SessionOptions};
pub use self::core::{Effect, NodeCore, NodeEvent};
pub use self::runtime::{Node, NodeError, discover};

use std::time::Duration;

use garter_sim::GameConfig;

/// Announcements go out on multicast once per second, independent of tick
/// rate.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// The tick period.
pub fn tick_interval(config: &GameConfig) -> Duration {
    Duration::from_millis(config.state_delay_ms as u64)
}

/// Retransmission sweep period, and the age at which an unacked message is
/// re-sent.
pub fn retransmit_interval(config: &GameConfig) -> Duration {
    Duration::from_millis((config.state_delay_ms as u64 / 10).max(1))
}

/// An endpoint idle for this long gets a Ping, so there is always reliable
/// traffic to infer liveness from.
pub fn ping_idle(config: &GameConfig) -> Duration {
    retransmit_interval(config)
}

/// A peer (or the coordinator) that has not been heard from for this long is
/// considered gone.
pub fn liveness_timeout(config: &GameConfig) -> Duration {
    Duration::from_millis(config.state_delay_ms as u64 * 8 / 10)
}
