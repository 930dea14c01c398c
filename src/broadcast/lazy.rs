// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::membership::Membership;
use crate::{Payload, ProcessId};

use super::{BestEffort, Data, Layer, Layered, Output};

/// Lazy reliable broadcast over best-effort broadcast.
pub type LazyReliableStack<P> = Layered<LazyReliable<P>, BestEffort<Data<P>>>;

/// Creates a [`LazyReliableStack`] for the given membership.
pub fn stack<P: Payload>(membership: Arc<Membership>) -> LazyReliableStack<P> {
    Layered::new(
        LazyReliable::new(membership.clone()),
        BestEffort::new(membership),
    )
}

/// Lazy reliable broadcast.
///
/// Fail-stop: requires a perfect failure detector feeding [`Layer::crash`].
/// Messages are delivered as soon as they are first seen and only retransmitted
/// once their origin is known to have crashed. As long as the origin is alive,
/// best-effort broadcast already guarantees every correct process gets a copy.
pub struct LazyReliable<P> {
    membership: Arc<Membership>,
    /// Processes not (yet) reported as crashed.
    correct: BTreeSet<ProcessId>,
    /// Messages delivered so far, by origin.
    from: BTreeMap<ProcessId, BTreeSet<P>>,
}

impl<P: Payload> LazyReliable<P> {
    /// Creates a new `LazyReliable` instance, considering all members correct.
    pub fn new(membership: Arc<Membership>) -> Self {
        let correct = membership.iter().collect();
        Self {
            membership,
            correct,
            from: BTreeMap::new(),
        }
    }

    /// Returns `true` iff `process` has not been reported as crashed.
    #[must_use]
    pub fn is_correct(&self, process: ProcessId) -> bool {
        self.correct.contains(&process)
    }
}

impl<P: Payload> Layer for LazyReliable<P> {
    type Payload = P;
    type Message = Data<P>;

    fn broadcast(&mut self, payload: P) -> Vec<Output<Data<P>, P>> {
        vec![Output::Broadcast(Data::new(self.membership.own_id(), payload))]
    }

    fn deliver(&mut self, sender: ProcessId, message: Data<P>) -> Vec<Output<Data<P>, P>> {
        let Data { origin, payload } = message;
        if !self.membership.contains(origin) {
            warn!("dropping message from non-member {origin} relayed by {sender}");
            return Vec::new();
        }
        if !self.from.entry(origin).or_default().insert(payload.clone()) {
            trace!("ignoring duplicate from {origin} relayed by {sender}");
            return Vec::new();
        }
        let mut outputs = vec![Output::Deliver {
            sender: origin,
            payload: payload.clone(),
        }];
        if !self.is_correct(origin) {
            outputs.push(Output::Broadcast(Data::new(origin, payload)));
        }
        outputs
    }

    fn crash(&mut self, process: ProcessId) -> Vec<Output<Data<P>, P>> {
        if !self.correct.remove(&process) {
            if !self.membership.contains(process) {
                warn!("ignoring crash of non-member {process}");
            }
            return Vec::new();
        }
        let relays: Vec<_> = self
            .from
            .get(&process)
            .into_iter()
            .flatten()
            .map(|payload| Output::Broadcast(Data::new(process, payload.clone())))
            .collect();
        debug!(
            "process {process} crashed, relaying {} of its messages",
            relays.len()
        );
        relays
    }
}
