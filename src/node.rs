// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Async driver running one broadcast [`Stack`] on one [`Network`].
//!
//! A [`Node`] owns the stack and serializes all events into a single loop:
//! application requests arriving through a [`NodeHandle`], and messages
//! arriving from the network. Each event is handled to completion, i.e. all
//! resulting sends are handed to the network and all resulting deliveries are
//! emitted, before the next event is taken.
//!
//! Deliveries are emitted on an [`mpsc`] channel as [`Delivery`] values.

use log::{debug, trace};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ProcessId;
use crate::broadcast::{Effect, Stack};
use crate::network::{Network, NetworkError};

/// Request submitted to a [`Node`] through its [`NodeHandle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request<P> {
    /// Broadcast the payload to the group.
    Broadcast(P),
    /// Failure detector reports the process as crashed.
    Crash(ProcessId),
}

/// Payload delivered by the stack, along with its original broadcaster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery<P> {
    pub sender: ProcessId,
    pub payload: P,
}

/// Handle to submit requests to a running [`Node`].
#[derive(Clone, Debug)]
pub struct NodeHandle<P> {
    requests: mpsc::Sender<Request<P>>,
    cancel_token: CancellationToken,
}

impl<P> NodeHandle<P> {
    /// Asks the node to broadcast `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ChannelClosed`] if the node stopped.
    pub async fn broadcast(&self, payload: P) -> Result<(), NetworkError> {
        self.request(Request::Broadcast(payload)).await
    }

    /// Notifies the node that `process` crashed.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ChannelClosed`] if the node stopped.
    pub async fn crash(&self, process: ProcessId) -> Result<(), NetworkError> {
        self.request(Request::Crash(process)).await
    }

    /// Submits an arbitrary request to the node.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ChannelClosed`] if the node stopped.
    pub async fn request(&self, request: Request<P>) -> Result<(), NetworkError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| NetworkError::ChannelClosed)
    }

    /// Stops the node's event loop.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Gives a token that is cancelled once the node is asked to stop.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// A single process running a broadcast [`Stack`] over a [`Network`].
pub struct Node<S: Stack, N> {
    stack: S,
    network: N,
    requests: mpsc::Receiver<Request<S::Payload>>,
    deliveries: mpsc::Sender<Delivery<S::Payload>>,
    cancel_token: CancellationToken,
}

impl<S, N> Node<S, N>
where
    S: Stack,
    N: Network<Message = S::Wire>,
{
    /// Creates a new node for the given stack and network.
    ///
    /// Returns the node itself, a handle to submit requests, and the receiving
    /// end of the delivery channel. Both channels buffer up to `capacity` items.
    pub fn new(
        stack: S,
        network: N,
        capacity: usize,
    ) -> (Self, NodeHandle<S::Payload>, mpsc::Receiver<Delivery<S::Payload>>) {
        let (req_tx, req_rx) = mpsc::channel(capacity.max(1));
        let (del_tx, del_rx) = mpsc::channel(capacity.max(1));
        let cancel_token = CancellationToken::new();
        let handle = NodeHandle {
            requests: req_tx,
            cancel_token: cancel_token.clone(),
        };
        let node = Self {
            stack,
            network,
            requests: req_rx,
            deliveries: del_tx,
            cancel_token,
        };
        (node, handle, del_rx)
    }

    /// Runs the event loop until cancelled or all handles are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the network fails to send or receive.
    pub async fn run(self) -> Result<(), NetworkError> {
        let Self {
            mut stack,
            network,
            mut requests,
            deliveries,
            cancel_token,
        } = self;
        loop {
            let effects = tokio::select! {
                () = cancel_token.cancelled() => return Ok(()),
                req = requests.recv() => match req {
                    Some(Request::Broadcast(payload)) => stack.broadcast(payload),
                    Some(Request::Crash(process)) => {
                        debug!("failure detector reports {process} as crashed");
                        stack.crash(process)
                    }
                    None => return Ok(()),
                },
                res = network.receive() => {
                    let (from, msg) = res?;
                    trace!("received message from {from}");
                    stack.receive(from, msg)
                }
            };
            apply(&network, &deliveries, effects).await?;
        }
    }
}

/// Hands sends to the network and emits deliveries, in order.
async fn apply<N: Network, P>(
    network: &N,
    deliveries: &mpsc::Sender<Delivery<P>>,
    effects: Vec<Effect<N::Message, P>>,
) -> Result<(), NetworkError> {
    for effect in effects {
        match effect {
            Effect::Send { to, message } => network.send(&message, to).await?,
            Effect::Deliver { sender, payload } => {
                let delivery = Delivery { sender, payload };
                if deliveries.send(delivery).await.is_err() {
                    trace!("dropping delivery, receiver is gone");
                }
            }
        }
    }
    Ok(())
}
