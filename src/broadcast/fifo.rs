// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::membership::Membership;
use crate::{Payload, ProcessId};

use super::eager::{self, EagerReliableStack};
use super::{Layer, Layered, Output};

/// FIFO broadcast over eager reliable broadcast.
pub type FifoStack<P> = Layered<Fifo<P>, EagerReliableStack<Sequenced<P>>>;

/// Creates a [`FifoStack`] for the given membership.
pub fn stack<P: Payload>(membership: Arc<Membership>) -> FifoStack<P> {
    Layered::new(Fifo::new(membership.clone()), eager::stack(membership))
}

/// Envelope carrying a per-origin sequence number.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sequenced<P> {
    pub origin: ProcessId,
    /// Position of this message among its origin's broadcasts, starting at 1.
    pub seq: u64,
    pub payload: P,
}

/// Sequence-number FIFO broadcast.
///
/// Runs atop any reliable broadcast channel.
/// Messages from the same origin are delivered in the order they were broadcast.
/// Messages arriving early are buffered until all of their predecessors arrived.
/// No order is imposed across different origins.
pub struct Fifo<P> {
    membership: Arc<Membership>,
    /// Sequence number of the last own broadcast.
    lsn: u64,
    /// Received messages waiting for their predecessors, by `(origin, seq)`.
    pending: BTreeMap<(ProcessId, u64), P>,
    /// Next expected sequence number per origin.
    next: BTreeMap<ProcessId, u64>,
}

impl<P: Payload> Fifo<P> {
    /// Creates a new `Fifo` instance, expecting sequence number 1 from everyone.
    pub fn new(membership: Arc<Membership>) -> Self {
        let next = membership.iter().map(|p| (p, 1)).collect();
        Self {
            membership,
            lsn: 0,
            pending: BTreeMap::new(),
            next,
        }
    }

    /// Gives the next expected sequence number for the given origin.
    #[must_use]
    pub fn next_expected(&self, origin: ProcessId) -> Option<u64> {
        self.next.get(&origin).copied()
    }

    /// Gives the number of messages buffered waiting for predecessors.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

impl<P: Payload> Layer for Fifo<P> {
    type Payload = P;
    type Message = Sequenced<P>;

    fn broadcast(&mut self, payload: P) -> Vec<Output<Sequenced<P>, P>> {
        self.lsn += 1;
        vec![Output::Broadcast(Sequenced {
            origin: self.membership.own_id(),
            seq: self.lsn,
            payload,
        })]
    }

    fn deliver(
        &mut self,
        sender: ProcessId,
        message: Sequenced<P>,
    ) -> Vec<Output<Sequenced<P>, P>> {
        let Sequenced {
            origin,
            seq,
            payload,
        } = message;
        if origin != sender {
            warn!("dropping message claiming origin {origin} delivered from {sender}");
            return Vec::new();
        }
        let Some(next) = self.next.get_mut(&origin) else {
            warn!("dropping message from non-member {origin}");
            return Vec::new();
        };
        if seq < *next {
            trace!("ignoring stale message {seq} from {origin}, expecting {next}");
            return Vec::new();
        }
        self.pending.entry((origin, seq)).or_insert(payload);

        let mut outputs = Vec::new();
        while let Some(payload) = self.pending.remove(&(origin, *next)) {
            *next += 1;
            outputs.push(Output::Deliver {
                sender: origin,
                payload,
            });
        }
        if outputs.len() > 1 {
            debug!("drained {} buffered messages from {origin}", outputs.len() - 1);
        }
        outputs
    }
}
