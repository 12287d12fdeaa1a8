//! Garter Network Layer
//!
//! Everything between the wire codec and the node core:
//!
//! - [`transport`]: the two UDP sockets (ephemeral unicast + the well-known
//!   multicast group), background receive loops, loopback suppression.
//! - [`reliable`]: sequence allocation and the unacked table behind the
//!   at-least-once overlay.
//! - [`discovery`]: collecting announcements into a browsable session list.
//!
//! This crate moves datagrams and keeps books; protocol decisions (who is
//! coordinator, what to retransmit where) live in the node crate.

#![deny(unsafe_code)]

pub mod discovery;
pub mod reliable;
pub mod transport;

pub use discovery::{DiscoveredGame, GameBrowser};
pub use reliable::ReliableQueue;
pub use transport::{Inbound, Transport, Via};

use std::io;

/// Socket setup failures. Runtime send/receive problems are logged and
/// absorbed instead (the overlay retries, eviction bounds the damage).
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("failed to bind unicast socket: {0}")]
    BindUnicast(#[source] io::Error),
    #[error("failed to bind multicast socket: {0}")]
    BindMulticast(#[source] io::Error),
    #[error("failed to join multicast group 239.192.0.4: {0}")]
    JoinGroup(#[source] io::Error),
    #[error("failed to clone socket for receive loop: {0}")]
    CloneSocket(#[source] io::Error),
}
