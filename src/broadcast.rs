// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Broadcast abstractions and how they are stacked.
//!
//! Every protocol in this module exposes the same request/indication pair to
//! the layer above: a *broadcast* request and a *deliver* indication.
//! Protocols come in two shapes:
//! - [`Stack`] is a complete tower whose bottom sits directly on the point-to-point link.
//!   It turns requests and link deliveries into [`Effect`]s (sends and deliveries).
//! - [`Layer`] is a single protocol running atop another broadcast channel.
//!   It turns requests and lower-layer deliveries into [`Output`]s.
//!
//! [`BestEffort`] is the base [`Stack`]. Putting a [`Layer`] on top of a [`Stack`]
//! via [`Layered`] yields a [`Stack`] again, so towers compose arbitrarily:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use layercast::broadcast::{Effect, Stack, fifo};
//! use layercast::membership::Membership;
//!
//! let membership = Arc::new(Membership::new(0, [0]).unwrap());
//! let mut stack = fifo::stack::<String>(membership);
//! let effects = stack.broadcast("hello".to_owned());
//! let Effect::Send { to, message } = effects[0].clone() else {
//!     panic!("expected a send");
//! };
//! // loop the message back through the link
//! let effects = stack.receive(to, message);
//! assert!(matches!(&effects[1], Effect::Deliver { sender: 0, payload } if payload == "hello"));
//! ```
//!
//! All handlers are synchronous and run to completion: one inbound event is
//! processed fully, including everything it triggers in the layers above and
//! below, before the handler returns.

pub mod best_effort;
pub mod causal;
pub mod eager;
pub mod fifo;
pub mod lazy;
pub mod uniform;

use std::collections::VecDeque;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

pub use self::best_effort::BestEffort;
pub use self::causal::{NoWaitingCausal, WaitingCausal};
pub use self::eager::EagerReliable;
pub use self::fifo::Fifo;
pub use self::lazy::LazyReliable;
pub use self::uniform::{AllAckUniform, MajorityAckUniform};
use crate::{Payload, ProcessId};

/// Something a [`Layer`] asks of its neighbours.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output<M, P> {
    /// Request to broadcast `M` over the layer below.
    Broadcast(M),
    /// Indication to the layer above that `payload` from `sender` is delivered.
    Deliver { sender: ProcessId, payload: P },
}

/// Something a [`Stack`] asks of the outside world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect<W, P> {
    /// Unicast `message` to process `to` over the point-to-point link.
    Send { to: ProcessId, message: W },
    /// Indication to the application that `payload` from `sender` is delivered.
    Deliver { sender: ProcessId, payload: P },
}

/// A broadcast protocol running atop another broadcast channel.
///
/// Each implementor should clearly document which guarantees it provides,
/// and which guarantees it requires from the channel below.
pub trait Layer {
    /// Payload type broadcast and delivered by the layer above.
    type Payload: Payload;
    /// Envelope type handed to the layer below.
    type Message: Payload;

    /// Handles a broadcast request from the layer above.
    fn broadcast(&mut self, payload: Self::Payload) -> Vec<Output<Self::Message, Self::Payload>>;

    /// Handles a deliver indication from the layer below.
    fn deliver(
        &mut self,
        sender: ProcessId,
        message: Self::Message,
    ) -> Vec<Output<Self::Message, Self::Payload>>;

    /// Handles a crash notification from the failure detector.
    ///
    /// Fail-silent protocols ignore these, which is the default.
    fn crash(&mut self, _process: ProcessId) -> Vec<Output<Self::Message, Self::Payload>> {
        Vec::new()
    }
}

/// A complete broadcast tower atop the point-to-point link.
pub trait Stack {
    /// Payload type broadcast and delivered by the application.
    type Payload: Payload;
    /// Message type carried by the point-to-point link.
    type Wire: Clone + Debug;

    /// Handles a broadcast request from the application.
    fn broadcast(&mut self, payload: Self::Payload) -> Vec<Effect<Self::Wire, Self::Payload>>;

    /// Handles a message delivered by the point-to-point link from process `from`.
    fn receive(
        &mut self,
        from: ProcessId,
        message: Self::Wire,
    ) -> Vec<Effect<Self::Wire, Self::Payload>>;

    /// Handles a crash notification from the failure detector.
    fn crash(&mut self, process: ProcessId) -> Vec<Effect<Self::Wire, Self::Payload>>;
}

/// Data envelope used by the reliable broadcast layers.
///
/// Carries the original broadcaster next to the payload, so relays can
/// retransmit on behalf of other processes without changing attribution.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Data<P> {
    pub origin: ProcessId,
    pub payload: P,
}

impl<P> Data<P> {
    /// Creates a new data envelope for `payload` broadcast by `origin`.
    pub const fn new(origin: ProcessId, payload: P) -> Self {
        Self { origin, payload }
    }
}

/// A [`Layer`] stacked on top of a [`Stack`], forming a taller [`Stack`].
///
/// Requests flow down from `upper` into `lower`, deliveries flow up from
/// `lower` into `upper`. Crash notifications reach `lower` first.
#[derive(Clone, Debug)]
pub struct Layered<U, S> {
    upper: U,
    lower: S,
}

impl<U, S> Layered<U, S> {
    /// Puts `upper` on top of `lower`.
    pub const fn new(upper: U, lower: S) -> Self {
        Self { upper, lower }
    }

    /// Gives access to the top layer.
    pub const fn upper(&self) -> &U {
        &self.upper
    }

    /// Gives access to the stack below the top layer.
    pub const fn lower(&self) -> &S {
        &self.lower
    }
}

impl<U, S> Layered<U, S>
where
    U: Layer,
    S: Stack<Payload = U::Message>,
{
    /// Drives `queue` and `lower` effects until nothing is left to route.
    fn drive(
        &mut self,
        mut queue: VecDeque<Output<U::Message, U::Payload>>,
        lower: Vec<Effect<S::Wire, U::Message>>,
        effects: &mut Vec<Effect<S::Wire, U::Payload>>,
    ) {
        self.route(lower, &mut queue, effects);
        while let Some(output) = queue.pop_front() {
            match output {
                Output::Broadcast(message) => {
                    let lower = self.lower.broadcast(message);
                    self.route(lower, &mut queue, effects);
                }
                Output::Deliver { sender, payload } => {
                    effects.push(Effect::Deliver { sender, payload });
                }
            }
        }
    }

    fn route(
        &mut self,
        lower: Vec<Effect<S::Wire, U::Message>>,
        queue: &mut VecDeque<Output<U::Message, U::Payload>>,
        effects: &mut Vec<Effect<S::Wire, U::Payload>>,
    ) {
        for effect in lower {
            match effect {
                Effect::Send { to, message } => effects.push(Effect::Send { to, message }),
                Effect::Deliver { sender, payload } => {
                    queue.extend(self.upper.deliver(sender, payload));
                }
            }
        }
    }
}

impl<U, S> Stack for Layered<U, S>
where
    U: Layer,
    S: Stack<Payload = U::Message>,
{
    type Payload = U::Payload;
    type Wire = S::Wire;

    fn broadcast(&mut self, payload: U::Payload) -> Vec<Effect<S::Wire, U::Payload>> {
        let queue = self.upper.broadcast(payload).into();
        let mut effects = Vec::new();
        self.drive(queue, Vec::new(), &mut effects);
        effects
    }

    fn receive(&mut self, from: ProcessId, message: S::Wire) -> Vec<Effect<S::Wire, U::Payload>> {
        let lower = self.lower.receive(from, message);
        let mut effects = Vec::new();
        self.drive(VecDeque::new(), lower, &mut effects);
        effects
    }

    fn crash(&mut self, process: ProcessId) -> Vec<Effect<S::Wire, U::Payload>> {
        let mut effects = Vec::new();
        let lower = self.lower.crash(process);
        self.drive(VecDeque::new(), lower, &mut effects);
        let queue = self.upper.crash(process).into();
        self.drive(queue, Vec::new(), &mut effects);
        effects
    }
}

/// Splits effects into link sends and application deliveries.
pub fn partition<W, P>(effects: Vec<Effect<W, P>>) -> (Vec<(ProcessId, W)>, Vec<(ProcessId, P)>) {
    let mut sends = Vec::new();
    let mut deliveries = Vec::new();
    for effect in effects {
        match effect {
            Effect::Send { to, message } => sends.push((to, message)),
            Effect::Deliver { sender, payload } => deliveries.push((sender, payload)),
        }
    }
    (sends, deliveries)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::membership::Membership;

    /// Layer that delivers everything twice and tags it.
    struct Echo;

    impl Layer for Echo {
        type Payload = u32;
        type Message = (u32, bool);

        fn broadcast(&mut self, payload: u32) -> Vec<Output<(u32, bool), u32>> {
            vec![Output::Broadcast((payload, false))]
        }

        fn deliver(
            &mut self,
            sender: ProcessId,
            message: (u32, bool),
        ) -> Vec<Output<(u32, bool), u32>> {
            let (payload, relayed) = message;
            let mut outputs = vec![Output::Deliver { sender, payload }];
            if !relayed {
                outputs.push(Output::Broadcast((payload, true)));
            }
            outputs
        }
    }

    #[test]
    fn requests_flow_down() {
        let membership = Arc::new(Membership::new(0, [0, 1]).unwrap());
        let mut stack = Layered::new(Echo, BestEffort::new(membership));
        let (sends, deliveries) = partition(stack.broadcast(7));
        assert_eq!(sends, vec![(0, (7, false)), (1, (7, false))]);
        assert!(deliveries.is_empty());
    }

    #[test]
    fn indications_flow_up() {
        let membership = Arc::new(Membership::new(0, [0, 1]).unwrap());
        let mut stack = Layered::new(Echo, BestEffort::new(membership));
        let (sends, deliveries) = partition(stack.receive(1, (7, false)));
        assert_eq!(deliveries, vec![(1, 7)]);
        assert_eq!(sends, vec![(0, (7, true)), (1, (7, true))]);

        let (sends, deliveries) = partition(stack.receive(1, (7, true)));
        assert_eq!(deliveries, vec![(1, 7)]);
        assert!(sends.is_empty());
    }
}
