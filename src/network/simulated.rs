// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Simulated network interface.
//!
//! This module provides an implementation of a simulated point-to-point link,
//! which may be used for local testing.
//! It works by having [`SimulatedNetwork`] instances communicate with each other
//! via an underlying [`SimulatedNetworkCore`], which links them together.
//! The core delays delivery of packets, simulating network latency, and
//! supports jitter as well as crashing processes.

mod core;

use std::marker::PhantomData;
use std::sync::Arc;

use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, mpsc};

pub use self::core::SimulatedNetworkCore;
use self::core::Packet;
use super::{Network, NetworkError, decode, encode};
use crate::ProcessId;

/// A simulated network interface for local testing.
pub struct SimulatedNetwork<M> {
    /// ID of the process this network interface belongs to.
    id: ProcessId,
    /// Reference to the simulated network core this interface is attached to.
    network_core: Arc<SimulatedNetworkCore>,
    /// Receiver for incoming packets.
    receiver: Mutex<mpsc::Receiver<Packet>>,
    _msg_type: PhantomData<fn() -> M>,
}

impl<M> SimulatedNetwork<M> {
    /// Gives the ID of the process this interface belongs to.
    #[must_use]
    pub const fn id(&self) -> ProcessId {
        self.id
    }
}

impl<M> Network for SimulatedNetwork<M>
where
    M: Serialize + DeserializeOwned + Send + Sync,
{
    type Message = M;

    async fn send(&self, message: &M, to: ProcessId) -> Result<(), NetworkError> {
        let bytes = encode(message)?;
        self.network_core.send(bytes, self.id, to).await
    }

    async fn receive(&self) -> Result<(ProcessId, M), NetworkError> {
        loop {
            let Some((from, bytes)) = self.receiver.lock().await.recv().await else {
                return Err(NetworkError::ChannelClosed);
            };
            match decode(&bytes) {
                Ok(msg) => return Ok((from, msg)),
                Err(err) => warn!("deserializing packet from {from} failed with {err:?}"),
            }
        }
    }
}
