// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::broadcast::eager::{self, EagerReliableStack};
use crate::broadcast::{Layer, Layered, Output};
use crate::membership::Membership;
use crate::{Payload, ProcessId};

/// Waiting causal broadcast over eager reliable broadcast.
pub type WaitingCausalStack<P> = Layered<WaitingCausal<P>, EagerReliableStack<Stamped<P>>>;

/// Creates a [`WaitingCausalStack`] for the given membership.
pub fn stack<P: Payload>(membership: Arc<Membership>) -> WaitingCausalStack<P> {
    Layered::new(
        WaitingCausal::new(membership.clone()),
        eager::stack(membership),
    )
}

/// Vector of per-origin delivery counts, indexed by [`Membership::rank`].
///
/// The derived ordering is lexicographic and only used for bookkeeping.
/// Causal precedence is tested with [`VectorClock::dominated_by`].
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VectorClock(Vec<u64>);

impl VectorClock {
    /// Creates an all-zero vector clock with `len` entries.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self(vec![0; len])
    }

    /// Gives the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` iff the clock has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gives the entry at `rank`, or 0 if out of range.
    #[must_use]
    pub fn get(&self, rank: usize) -> u64 {
        self.0.get(rank).copied().unwrap_or(0)
    }

    /// Overwrites the entry at `rank`, if in range.
    pub fn set(&mut self, rank: usize, value: u64) {
        if let Some(entry) = self.0.get_mut(rank) {
            *entry = value;
        }
    }

    /// Increments the entry at `rank`, if in range.
    pub fn increment(&mut self, rank: usize) {
        if let Some(entry) = self.0.get_mut(rank) {
            *entry += 1;
        }
    }

    /// Returns `true` iff every entry is less than or equal to the one in `other`.
    ///
    /// Clocks of different lengths are incomparable.
    #[must_use]
    pub fn dominated_by(&self, other: &Self) -> bool {
        self.len() == other.len() && self.0.iter().zip(&other.0).all(|(a, b)| a <= b)
    }

    /// Gives all entries in rank order.
    #[must_use]
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

impl From<Vec<u64>> for VectorClock {
    fn from(entries: Vec<u64>) -> Self {
        Self(entries)
    }
}

/// Envelope carrying the vector clock of its origin at broadcast time.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamped<P> {
    pub origin: ProcessId,
    pub clock: VectorClock,
    pub payload: P,
}

/// Waiting causal broadcast.
///
/// Each message carries a snapshot of its origin's vector clock, with the
/// origin's own entry set to the number of its previous broadcasts.
/// A message is buffered until the local clock dominates its snapshot,
/// i.e. until all of its causal predecessors were delivered.
pub struct WaitingCausal<P> {
    membership: Arc<Membership>,
    /// Number of delivered messages per origin.
    clock: VectorClock,
    /// Number of own broadcasts so far.
    lsn: u64,
    /// Received messages waiting for their causal predecessors.
    pending: BTreeSet<Stamped<P>>,
}

impl<P: Payload> WaitingCausal<P> {
    /// Creates a new `WaitingCausal` instance with an all-zero clock.
    pub fn new(membership: Arc<Membership>) -> Self {
        let clock = VectorClock::new(membership.len());
        Self {
            membership,
            clock,
            lsn: 0,
            pending: BTreeSet::new(),
        }
    }

    /// Gives the current local vector clock.
    #[must_use]
    pub const fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Gives the number of messages buffered waiting for predecessors.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Removes and returns the first buffered message that is ready for delivery.
    fn take_ready(&mut self) -> Option<Stamped<P>> {
        let ready = self
            .pending
            .iter()
            .find(|m| m.clock.dominated_by(&self.clock))?
            .clone();
        self.pending.remove(&ready);
        Some(ready)
    }
}

impl<P: Payload> Layer for WaitingCausal<P> {
    type Payload = P;
    type Message = Stamped<P>;

    fn broadcast(&mut self, payload: P) -> Vec<Output<Stamped<P>, P>> {
        let mut clock = self.clock.clone();
        clock.set(self.membership.own_rank(), self.lsn);
        self.lsn += 1;
        vec![Output::Broadcast(Stamped {
            origin: self.membership.own_id(),
            clock,
            payload,
        })]
    }

    fn deliver(&mut self, sender: ProcessId, message: Stamped<P>) -> Vec<Output<Stamped<P>, P>> {
        let origin = message.origin;
        if origin != sender {
            warn!("dropping message claiming origin {origin} delivered from {sender}");
            return Vec::new();
        }
        let Some(rank) = self.membership.rank(origin) else {
            warn!("dropping message from non-member {origin}");
            return Vec::new();
        };
        if message.clock.len() != self.clock.len() {
            warn!(
                "dropping message from {origin} with clock of size {}",
                message.clock.len()
            );
            return Vec::new();
        }
        if message.clock.get(rank) < self.clock.get(rank) {
            trace!("ignoring already delivered message from {origin}");
            return Vec::new();
        }
        self.pending.insert(message);

        let mut outputs = Vec::new();
        while let Some(ready) = self.take_ready() {
            if let Some(rank) = self.membership.rank(ready.origin) {
                self.clock.increment(rank);
            }
            outputs.push(Output::Deliver {
                sender: ready.origin,
                payload: ready.payload,
            });
        }
        if outputs.is_empty() {
            debug!(
                "buffering message from {origin}, {} messages waiting",
                self.pending.len()
            );
        }
        outputs
    }
}
