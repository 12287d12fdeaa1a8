//! Bookkeeping for the at-least-once overlay: sequence allocation and the
//! table of sent-but-unacked messages.
//!
//! A message keeps its sequence number for life; retransmission re-sends the
//! original envelope and only refreshes the send timestamp. There is no
//! per-message retry cap: an entry leaves the table when the peer acks it,
//! or wholesale when the peer is evicted or retargeted.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use garter_wire::GameMessage;

struct Pending {
    msg: GameMessage,
    to: SocketAddr,
    last_sent: Instant,
}

/// Per-node reliable-overlay state.
pub struct ReliableQueue {
    next_seq: i64,
    pending: HashMap<i64, Pending>,
}

impl Default for ReliableQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliableQueue {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            pending: HashMap::new(),
        }
    }

    /// Hand out the next sequence number. Acks bypass this: they echo the
    /// sequence they acknowledge.
    pub fn allocate_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Register a reliable envelope for retransmission until acked.
    pub fn track(&mut self, msg: GameMessage, to: SocketAddr, now: Instant) {
        self.pending.insert(
            msg.msg_seq,
            Pending {
                msg,
                to,
                last_sent: now,
            },
        );
    }

    /// Process an inbound ack. Returns false for unknown (already-acked or
    /// never-tracked) sequences, which callers ignore.
    pub fn ack(&mut self, seq: i64) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Entries older than `age`: clones to re-send, timestamps reset to
    /// `now` so each entry is re-sent at most once per sweep.
    pub fn due(&mut self, now: Instant, age: Duration) -> Vec<(GameMessage, SocketAddr)> {
        let mut out = Vec::new();
        for pending in self.pending.values_mut() {
            if now.duration_since(pending.last_sent) >= age {
                pending.last_sent = now;
                out.push((pending.msg.clone(), pending.to));
            }
        }
        out
    }

    /// Drop everything addressed to an evicted peer. Returns how many
    /// entries died with it.
    pub fn drop_addressed_to(&mut self, addr: SocketAddr) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.to != addr);
        before - self.pending.len()
    }

    /// Re-address pending traffic from a lost coordinator to its successor.
    pub fn retarget(&mut self, old: SocketAddr, new: SocketAddr) -> usize {
        let mut moved = 0;
        for pending in self.pending.values_mut() {
            if pending.to == old {
                pending.to = new;
                moved += 1;
            }
        }
        moved
    }

    /// Keep only entries whose destination satisfies `keep`. Bounds the
    /// table when a reliable message went to an endpoint that never became
    /// a member (e.g. a refused joiner that vanished).
    pub fn retain_addresses<F: Fn(SocketAddr) -> bool>(&mut self, keep: F) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| keep(p.to));
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[cfg(test)]
    fn contains(&self, seq: i64) -> bool {
        self.pending.contains_key(&seq)
    }
}
