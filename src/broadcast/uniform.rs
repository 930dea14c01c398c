// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Uniform reliable broadcast.
//!
//! Uniform agreement: if *any* process delivers a message, correct or not,
//! then every correct process eventually delivers it.
//! Both implementations here flood every message once, like eager reliable
//! broadcast, and treat each received copy as an acknowledgment by its relay.
//! A message is only delivered once enough processes have acknowledged it:
//! - [`AllAckUniform`] waits for every process not (yet) reported as crashed.
//!   Fail-stop: requires a perfect failure detector.
//! - [`MajorityAckUniform`] waits for a strict majority of all members.
//!   Fail-silent: requires that a majority of processes is correct.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::membership::Membership;
use crate::{Payload, ProcessId};

use super::{BestEffort, Data, Layer, Layered, Output};

/// All-ack uniform reliable broadcast over best-effort broadcast.
pub type AllAckUniformStack<P> = Layered<AllAckUniform<P>, BestEffort<Data<P>>>;

/// Majority-ack uniform reliable broadcast over best-effort broadcast.
pub type MajorityAckUniformStack<P> = Layered<MajorityAckUniform<P>, BestEffort<Data<P>>>;

/// Creates an [`AllAckUniformStack`] for the given membership.
pub fn all_ack_stack<P: Payload>(membership: Arc<Membership>) -> AllAckUniformStack<P> {
    Layered::new(
        AllAckUniform::new(membership.clone()),
        BestEffort::new(membership),
    )
}

/// Creates a [`MajorityAckUniformStack`] for the given membership.
pub fn majority_ack_stack<P: Payload>(membership: Arc<Membership>) -> MajorityAckUniformStack<P> {
    Layered::new(
        MajorityAckUniform::new(membership.clone()),
        BestEffort::new(membership),
    )
}

/// Bookkeeping shared by both uniform reliable broadcast variants.
struct AckTable<P> {
    /// Messages already delivered upwards.
    delivered: BTreeSet<Data<P>>,
    /// Messages seen (and relayed) so far, delivered or not.
    pending: BTreeSet<Data<P>>,
    /// Processes observed to have relayed each message.
    ack: BTreeMap<Data<P>, BTreeSet<ProcessId>>,
}

impl<P: Payload> AckTable<P> {
    const fn new() -> Self {
        Self {
            delivered: BTreeSet::new(),
            pending: BTreeSet::new(),
            ack: BTreeMap::new(),
        }
    }

    fn broadcast(&mut self, data: Data<P>) -> Output<Data<P>, P> {
        self.pending.insert(data.clone());
        Output::Broadcast(data)
    }

    /// Records `sender` as having relayed `data`.
    ///
    /// Returns the relay request, if this is the first time `data` is seen.
    fn ack(&mut self, sender: ProcessId, data: Data<P>) -> Option<Output<Data<P>, P>> {
        self.ack.entry(data.clone()).or_default().insert(sender);
        if self.pending.insert(data.clone()) {
            trace!("relaying message from {} first seen via {sender}", data.origin);
            Some(Output::Broadcast(data))
        } else {
            None
        }
    }

    /// Delivers every pending message whose acknowledgments satisfy `can_deliver`.
    fn deliver_ready(
        &mut self,
        can_deliver: impl Fn(&BTreeSet<ProcessId>) -> bool,
    ) -> Vec<Output<Data<P>, P>> {
        let ready: Vec<_> = self
            .pending
            .iter()
            .filter(|data| !self.delivered.contains(*data))
            .filter(|data| self.ack.get(*data).is_some_and(|acks| can_deliver(acks)))
            .cloned()
            .collect();
        let mut outputs = Vec::with_capacity(ready.len());
        for data in ready {
            self.delivered.insert(data.clone());
            outputs.push(Output::Deliver {
                sender: data.origin,
                payload: data.payload,
            });
        }
        outputs
    }

    fn has_delivered(&self, data: &Data<P>) -> bool {
        self.delivered.contains(data)
    }
}

/// All-ack uniform reliable broadcast.
///
/// Delivers a message once all processes not reported as crashed have relayed it.
/// Since the set of correct processes only shrinks, a delivery decision is never revoked.
pub struct AllAckUniform<P> {
    membership: Arc<Membership>,
    /// Processes not (yet) reported as crashed.
    correct: BTreeSet<ProcessId>,
    table: AckTable<P>,
}

impl<P: Payload> AllAckUniform<P> {
    /// Creates a new `AllAckUniform` instance, considering all members correct.
    pub fn new(membership: Arc<Membership>) -> Self {
        let correct = membership.iter().collect();
        Self {
            membership,
            correct,
            table: AckTable::new(),
        }
    }

    /// Returns `true` iff `process` has not been reported as crashed.
    #[must_use]
    pub fn is_correct(&self, process: ProcessId) -> bool {
        self.correct.contains(&process)
    }

    /// Returns `true` iff the given message was already delivered.
    #[must_use]
    pub fn has_delivered(&self, origin: ProcessId, payload: &P) -> bool {
        self.table.has_delivered(&Data::new(origin, payload.clone()))
    }

    fn deliver_ready(&mut self) -> Vec<Output<Data<P>, P>> {
        let correct = &self.correct;
        self.table.deliver_ready(|acks| correct.is_subset(acks))
    }
}

impl<P: Payload> Layer for AllAckUniform<P> {
    type Payload = P;
    type Message = Data<P>;

    fn broadcast(&mut self, payload: P) -> Vec<Output<Data<P>, P>> {
        let data = Data::new(self.membership.own_id(), payload);
        let mut outputs = vec![self.table.broadcast(data)];
        outputs.extend(self.deliver_ready());
        outputs
    }

    fn deliver(&mut self, sender: ProcessId, message: Data<P>) -> Vec<Output<Data<P>, P>> {
        if !self.membership.contains(message.origin) || !self.membership.contains(sender) {
            warn!(
                "dropping message from {} relayed by {sender}, not a member",
                message.origin
            );
            return Vec::new();
        }
        let mut outputs: Vec<_> = self.table.ack(sender, message).into_iter().collect();
        outputs.extend(self.deliver_ready());
        outputs
    }

    fn crash(&mut self, process: ProcessId) -> Vec<Output<Data<P>, P>> {
        if !self.correct.remove(&process) {
            if !self.membership.contains(process) {
                warn!("ignoring crash of non-member {process}");
            }
            return Vec::new();
        }
        debug!("process {process} crashed, no longer waiting for its acks");
        self.deliver_ready()
    }
}

/// Majority-ack uniform reliable broadcast.
///
/// Delivers a message once a strict majority of all members has relayed it.
/// Crash notifications are ignored, no failure detector is needed.
pub struct MajorityAckUniform<P> {
    membership: Arc<Membership>,
    table: AckTable<P>,
}

impl<P: Payload> MajorityAckUniform<P> {
    /// Creates a new `MajorityAckUniform` instance with empty state.
    pub const fn new(membership: Arc<Membership>) -> Self {
        Self {
            membership,
            table: AckTable::new(),
        }
    }

    /// Returns `true` iff the given message was already delivered.
    #[must_use]
    pub fn has_delivered(&self, origin: ProcessId, payload: &P) -> bool {
        self.table.has_delivered(&Data::new(origin, payload.clone()))
    }

    fn deliver_ready(&mut self) -> Vec<Output<Data<P>, P>> {
        let quorum = self.membership.majority();
        self.table.deliver_ready(|acks| acks.len() >= quorum)
    }
}

impl<P: Payload> Layer for MajorityAckUniform<P> {
    type Payload = P;
    type Message = Data<P>;

    fn broadcast(&mut self, payload: P) -> Vec<Output<Data<P>, P>> {
        let data = Data::new(self.membership.own_id(), payload);
        let mut outputs = vec![self.table.broadcast(data)];
        outputs.extend(self.deliver_ready());
        outputs
    }

    fn deliver(&mut self, sender: ProcessId, message: Data<P>) -> Vec<Output<Data<P>, P>> {
        if !self.membership.contains(message.origin) || !self.membership.contains(sender) {
            warn!(
                "dropping message from {} relayed by {sender}, not a member",
                message.origin
            );
            return Vec::new();
        }
        let mut outputs: Vec<_> = self.table.ack(sender, message).into_iter().collect();
        outputs.extend(self.deliver_ready());
        outputs
    }
}
