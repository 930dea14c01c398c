// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Utility types and functions for tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::ProcessId;
use crate::broadcast::{Effect, Stack};
use crate::membership::Membership;

/// Deterministic in-memory cluster of [`Stack`]s.
///
/// Link messages are queued instead of delivered, so tests decide the order
/// in which they arrive. Crashes are injected by hand and reported to every
/// surviving process, acting as a perfect failure detector.
pub struct LocalCluster<S: Stack> {
    stacks: Vec<S>,
    crashed: BTreeSet<ProcessId>,
    /// Queued link messages as `(from, to, message)`, oldest first.
    in_flight: VecDeque<(ProcessId, ProcessId, S::Wire)>,
    delivered: Vec<Vec<(ProcessId, S::Payload)>>,
    sent: usize,
}

impl<S: Stack> LocalCluster<S> {
    /// Creates a cluster of processes `0..n`, each running the stack built by `factory`.
    pub fn new(n: usize, factory: impl Fn(Arc<Membership>) -> S) -> Self {
        let ids = 0..n as ProcessId;
        let stacks = ids
            .clone()
            .map(|id| factory(Arc::new(Membership::new(id, ids.clone()).unwrap())))
            .collect();
        Self {
            stacks,
            crashed: BTreeSet::new(),
            in_flight: VecDeque::new(),
            delivered: vec![Vec::new(); n],
            sent: 0,
        }
    }

    /// Lets process `p` broadcast `payload`, unless it crashed.
    pub fn broadcast(&mut self, p: ProcessId, payload: S::Payload) {
        if self.crashed.contains(&p) {
            return;
        }
        let effects = self.stacks[p as usize].broadcast(payload);
        self.apply(p, effects);
    }

    /// Delivers the oldest queued message from `from` to `to`.
    ///
    /// Returns `false` if there is no such message.
    pub fn deliver_one(&mut self, from: ProcessId, to: ProcessId) -> bool {
        self.deliver_where(|f, t, _| f == from && t == to)
    }

    /// Delivers the oldest queued message matching `filter`.
    ///
    /// Returns `false` if there is no such message.
    pub fn deliver_where(
        &mut self,
        filter: impl Fn(ProcessId, ProcessId, &S::Wire) -> bool,
    ) -> bool {
        let Some(pos) = self
            .in_flight
            .iter()
            .position(|(from, to, msg)| filter(*from, *to, msg))
        else {
            return false;
        };
        let (from, to, msg) = self.in_flight.remove(pos).unwrap();
        self.receive(from, to, msg);
        true
    }

    /// Delivers queued messages in FIFO order until none are left.
    pub fn run(&mut self) {
        while let Some((from, to, msg)) = self.in_flight.pop_front() {
            self.receive(from, to, msg);
        }
    }

    /// Crashes process `p` and notifies all other correct processes.
    ///
    /// Messages queued from or to `p` are lost.
    pub fn crash(&mut self, p: ProcessId) {
        if !self.crashed.insert(p) {
            return;
        }
        self.in_flight.retain(|(from, to, _)| *from != p && *to != p);
        for q in 0..self.stacks.len() as ProcessId {
            if self.crashed.contains(&q) {
                continue;
            }
            let effects = self.stacks[q as usize].crash(p);
            self.apply(q, effects);
        }
    }

    /// Gives everything process `p` delivered so far, in delivery order.
    pub fn delivered(&self, p: ProcessId) -> &[(ProcessId, S::Payload)] {
        &self.delivered[p as usize]
    }

    /// Gives the stack of process `p`.
    pub fn stack(&self, p: ProcessId) -> &S {
        &self.stacks[p as usize]
    }

    /// Gives the number of queued link messages.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Gives the total number of link messages sent so far.
    pub const fn sent(&self) -> usize {
        self.sent
    }

    fn receive(&mut self, from: ProcessId, to: ProcessId, msg: S::Wire) {
        if self.crashed.contains(&to) {
            return;
        }
        let effects = self.stacks[to as usize].receive(from, msg);
        self.apply(to, effects);
    }

    fn apply(&mut self, p: ProcessId, effects: Vec<Effect<S::Wire, S::Payload>>) {
        for effect in effects {
            match effect {
                Effect::Send { to, message } => {
                    self.sent += 1;
                    self.in_flight.push_back((p, to, message));
                }
                Effect::Deliver { sender, payload } => {
                    self.delivered[p as usize].push((sender, payload));
                }
            }
        }
    }
}
