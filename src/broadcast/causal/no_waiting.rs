// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::broadcast::eager::{self, EagerReliableStack};
use crate::broadcast::{Layer, Layered, Output};
use crate::membership::Membership;
use crate::{Payload, ProcessId};

/// No-waiting causal broadcast over eager reliable broadcast.
pub type NoWaitingCausalStack<P> =
    Layered<NoWaitingCausal<P>, EagerReliableStack<CausalMessage<P>>>;

/// Creates a [`NoWaitingCausalStack`] for the given membership.
pub fn stack<P: Payload>(membership: Arc<Membership>) -> NoWaitingCausalStack<P> {
    Layered::new(
        NoWaitingCausal::new(membership.clone()),
        eager::stack(membership),
    )
}

/// Envelope carrying the causal history of its payload.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CausalMessage<P> {
    pub origin: ProcessId,
    pub payload: P,
    /// Every message the origin broadcast or delivered before this one, in order.
    pub past: Vec<(ProcessId, P)>,
}

/// No-waiting causal broadcast.
///
/// Every message carries its origin's full history. On first receipt, all
/// not-yet-delivered messages of that history are delivered in history order,
/// followed by the message itself.
pub struct NoWaitingCausal<P> {
    membership: Arc<Membership>,
    delivered: BTreeSet<(ProcessId, P)>,
    /// Own causal history, append-only.
    past: Vec<(ProcessId, P)>,
    /// Entries of `past`, for membership checks.
    in_past: BTreeSet<(ProcessId, P)>,
}

impl<P: Payload> NoWaitingCausal<P> {
    /// Creates a new `NoWaitingCausal` instance with empty history.
    pub const fn new(membership: Arc<Membership>) -> Self {
        Self {
            membership,
            delivered: BTreeSet::new(),
            past: Vec::new(),
            in_past: BTreeSet::new(),
        }
    }

    /// Gives the local causal history, oldest first.
    #[must_use]
    pub fn past(&self) -> &[(ProcessId, P)] {
        &self.past
    }

    /// Appends `entry` to the history, unless it is already part of it.
    fn record(&mut self, entry: (ProcessId, P)) {
        if self.in_past.insert(entry.clone()) {
            self.past.push(entry);
        }
    }

    /// Marks `entry` as delivered.
    ///
    /// Returns the deliver indication, unless `entry` was delivered before.
    fn deliver_once(&mut self, entry: (ProcessId, P)) -> Option<Output<CausalMessage<P>, P>> {
        if !self.delivered.insert(entry.clone()) {
            return None;
        }
        self.record(entry.clone());
        let (sender, payload) = entry;
        Some(Output::Deliver { sender, payload })
    }
}

impl<P: Payload> Layer for NoWaitingCausal<P> {
    type Payload = P;
    type Message = CausalMessage<P>;

    fn broadcast(&mut self, payload: P) -> Vec<Output<CausalMessage<P>, P>> {
        let origin = self.membership.own_id();
        let message = CausalMessage {
            origin,
            payload: payload.clone(),
            past: self.past.clone(),
        };
        self.record((origin, payload));
        vec![Output::Broadcast(message)]
    }

    fn deliver(
        &mut self,
        sender: ProcessId,
        message: CausalMessage<P>,
    ) -> Vec<Output<CausalMessage<P>, P>> {
        let CausalMessage {
            origin,
            payload,
            past,
        } = message;
        if origin != sender {
            warn!("dropping message claiming origin {origin} delivered from {sender}");
            return Vec::new();
        }
        if let Some((p, _)) = past.iter().find(|(p, _)| !self.membership.contains(*p)) {
            warn!("dropping message from {origin} with non-member {p} in its history");
            return Vec::new();
        }
        let entry = (origin, payload);
        if self.delivered.contains(&entry) {
            trace!("ignoring duplicate from {origin}");
            return Vec::new();
        }

        let mut outputs: Vec<_> = past
            .into_iter()
            .filter_map(|entry| self.deliver_once(entry))
            .collect();
        if !outputs.is_empty() {
            trace!("delivered {} predecessors from history", outputs.len());
        }
        outputs.extend(self.deliver_once(entry));
        outputs
    }
}
