// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use log::trace;

use crate::membership::Membership;
use crate::{Payload, ProcessId};

use super::{BestEffort, Data, Layer, Layered, Output};

/// Eager reliable broadcast over best-effort broadcast.
pub type EagerReliableStack<P> = Layered<EagerReliable<P>, BestEffort<Data<P>>>;

/// Creates an [`EagerReliableStack`] for the given membership.
pub fn stack<P: Payload>(membership: Arc<Membership>) -> EagerReliableStack<P> {
    Layered::new(
        EagerReliable::new(membership.clone()),
        BestEffort::new(membership),
    )
}

/// Eager reliable broadcast.
///
/// Fail-silent: needs no failure detector.
/// Every process relays each message once to everyone the first time it sees it.
/// Hence, if any correct process delivers a message, all correct processes do,
/// because that process' relay reaches all of them.
///
/// Messages are deduplicated by `(origin, payload)`.
pub struct EagerReliable<P> {
    membership: Arc<Membership>,
    delivered: BTreeSet<(ProcessId, P)>,
}

impl<P: Payload> EagerReliable<P> {
    /// Creates a new `EagerReliable` instance with empty state.
    pub const fn new(membership: Arc<Membership>) -> Self {
        Self {
            membership,
            delivered: BTreeSet::new(),
        }
    }

    /// Returns `true` iff the given message was already delivered.
    #[must_use]
    pub fn has_delivered(&self, origin: ProcessId, payload: &P) -> bool {
        self.delivered.contains(&(origin, payload.clone()))
    }
}

impl<P: Payload> Layer for EagerReliable<P> {
    type Payload = P;
    type Message = Data<P>;

    fn broadcast(&mut self, payload: P) -> Vec<Output<Data<P>, P>> {
        vec![Output::Broadcast(Data::new(self.membership.own_id(), payload))]
    }

    fn deliver(&mut self, sender: ProcessId, message: Data<P>) -> Vec<Output<Data<P>, P>> {
        let Data { origin, payload } = message;
        if !self.delivered.insert((origin, payload.clone())) {
            trace!("ignoring duplicate from {origin} relayed by {sender}");
            return Vec::new();
        }
        vec![
            Output::Broadcast(Data::new(origin, payload.clone())),
            Output::Deliver {
                sender: origin,
                payload,
            },
        ]
    }
}
