// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::marker::PhantomData;
use std::sync::Arc;

use log::trace;

use crate::membership::Membership;
use crate::{Payload, ProcessId};

use super::{Effect, Stack};

/// A best-effort broadcast protocol.
///
/// Sends each message once to every member over the point-to-point link.
/// Everything the link delivers is handed up immediately, without filtering.
/// There is no retransmission, no deduplication and no ordering.
/// A message reaches every correct member only if the sender does not crash.
pub struct BestEffort<P> {
    membership: Arc<Membership>,
    _payload: PhantomData<P>,
}

impl<P: Payload> BestEffort<P> {
    /// Creates a new `BestEffort` instance.
    /// Messages will be broadcast to all members of `membership`.
    pub const fn new(membership: Arc<Membership>) -> Self {
        Self {
            membership,
            _payload: PhantomData,
        }
    }

    /// Broadcasts `payload` to an explicit list of recipients.
    pub fn broadcast_to(
        &self,
        payload: P,
        recipients: impl IntoIterator<Item = ProcessId>,
    ) -> Vec<Effect<P, P>> {
        recipients
            .into_iter()
            .map(|to| Effect::Send {
                to,
                message: payload.clone(),
            })
            .collect()
    }
}

impl<P: Payload> Stack for BestEffort<P> {
    type Payload = P;
    type Wire = P;

    fn broadcast(&mut self, payload: P) -> Vec<Effect<P, P>> {
        trace!("beb broadcast from {}", self.membership.own_id());
        self.broadcast_to(payload, self.membership.iter())
    }

    fn receive(&mut self, from: ProcessId, message: P) -> Vec<Effect<P, P>> {
        vec![Effect::Deliver {
            sender: from,
            payload: message,
        }]
    }

    fn crash(&mut self, _process: ProcessId) -> Vec<Effect<P, P>> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sends_to_all() {
        let membership = Arc::new(Membership::new(1, 0..4).unwrap());
        let mut beb = BestEffort::new(membership);
        let effects = beb.broadcast("m");
        let recipients: Vec<_> = effects
            .iter()
            .map(|e| match e {
                Effect::Send { to, message } => {
                    assert_eq!(*message, "m");
                    *to
                }
                Effect::Deliver { .. } => panic!("beb must not deliver on broadcast"),
            })
            .collect();
        assert_eq!(recipients, vec![0, 1, 2, 3]);
    }

    #[test]
    fn explicit_recipients() {
        let membership = Arc::new(Membership::new(0, 0..4).unwrap());
        let beb = BestEffort::new(membership);
        let effects = beb.broadcast_to(5_u8, [3, 1]);
        assert_eq!(
            effects,
            vec![
                Effect::Send { to: 3, message: 5 },
                Effect::Send { to: 1, message: 5 },
            ]
        );
    }

    #[test]
    fn no_filtering() {
        let membership = Arc::new(Membership::new(0, 0..2).unwrap());
        let mut beb = BestEffort::new(membership);
        // duplicates are passed through, deduplication is up to higher layers
        for _ in 0..2 {
            let effects = beb.receive(1, 9_u8);
            assert_eq!(
                effects,
                vec![Effect::Deliver {
                    sender: 1,
                    payload: 9
                }]
            );
        }
        assert!(beb.crash(1).is_empty());
    }
}
