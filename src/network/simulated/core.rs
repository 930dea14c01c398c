// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use rand::Rng;
use tokio::sync::{Mutex, RwLock, mpsc};

use super::SimulatedNetwork;
use crate::ProcessId;
use crate::network::NetworkError;

/// Packet as handed to the receiving endpoint, `(from, bytes)`.
pub(super) type Packet = (ProcessId, Vec<u8>);

/// Simulated network core, where packets are routed between processes.
///
/// It stores virtual latencies for all links between any pair of processes.
/// Packets sent into the core are delayed accordingly, plus random jitter,
/// so packets on the same link may overtake each other.
/// Packets are never lost between correct processes.
///
/// Crashed processes neither send nor receive, including packets still in transit.
pub struct SimulatedNetworkCore {
    /// Map from process ID to channel for delivering packets.
    nodes: RwLock<HashMap<ProcessId, mpsc::Sender<Packet>>>,
    /// Latency between each pair of processes.
    latencies: RwLock<HashMap<(ProcessId, ProcessId), Duration>>,
    /// Processes that crashed.
    crashed: RwLock<HashSet<ProcessId>>,
    /// Fallback latency to use for any link that is not configured.
    default_latency: Duration,
    /// Maximum jitter to apply to each packet in milliseconds.
    per_packet_jitter_ms: f64,
}

impl Default for SimulatedNetworkCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNetworkCore {
    /// Creates a new simulated network core without any processes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            latencies: RwLock::new(HashMap::new()),
            crashed: RwLock::new(HashSet::new()),
            default_latency: Duration::from_millis(10),
            per_packet_jitter_ms: 5.0,
        }
    }

    /// Turns this instance into a new instance with a different default latency.
    #[must_use]
    pub const fn with_default_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Turns this instance into a new instance with a different latency jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter_ms: f64) -> Self {
        self.per_packet_jitter_ms = jitter_ms;
        self
    }

    /// Adds process `id` to the simulated network.
    ///
    /// Returns a [`SimulatedNetwork`] interface for the process, buffering up
    /// to `capacity` received packets.
    pub async fn join<M>(self: &Arc<Self>, id: ProcessId, capacity: usize) -> SimulatedNetwork<M> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.nodes.write().await.insert(id, tx);
        SimulatedNetwork {
            id,
            network_core: Arc::clone(self),
            receiver: Mutex::new(rx),
            _msg_type: PhantomData,
        }
    }

    /// Sets the latency between two processes.
    ///
    /// The latency is symmetric in both directions.
    /// For asymmetric links, use [`Self::set_asymmetric_latency`] instead.
    pub async fn set_latency(&self, p1: ProcessId, p2: ProcessId, latency: Duration) {
        let mut guard = self.latencies.write().await;
        guard.insert((p1, p2), latency);
        guard.insert((p2, p1), latency);
    }

    /// Sets the latency from one process to the other.
    ///
    /// The latency is set only in one direction, `from` -> `to`.
    /// For symmetric links, use [`Self::set_latency`] instead.
    pub async fn set_asymmetric_latency(&self, from: ProcessId, to: ProcessId, latency: Duration) {
        self.latencies.write().await.insert((from, to), latency);
    }

    /// Crashes process `id`.
    ///
    /// From now on, all packets from and to `id` are silently dropped.
    pub async fn crash(&self, id: ProcessId) {
        if self.crashed.write().await.insert(id) {
            debug!("simulated crash of process {id}");
        }
    }

    /// Returns `true` iff process `id` was crashed via [`Self::crash`].
    pub async fn is_crashed(&self, id: ProcessId) -> bool {
        self.crashed.read().await.contains(&id)
    }

    /// Sends a simulated packet from one process to another.
    ///
    /// This schedules delivery for the packet after the link's latency plus jitter.
    /// Packets to self are delivered without delay.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::UnknownDestination`] if `to` never joined.
    pub async fn send(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        from: ProcessId,
        to: ProcessId,
    ) -> Result<(), NetworkError> {
        let Some(channel) = self.nodes.read().await.get(&to).cloned() else {
            return Err(NetworkError::UnknownDestination(to));
        };
        if self.is_crashed(from).await || self.is_crashed(to).await {
            trace!("dropping packet {from} -> {to} of crashed process");
            return Ok(());
        }

        let mut latency = self
            .latencies
            .read()
            .await
            .get(&(from, to))
            .copied()
            .unwrap_or(self.default_latency);
        if self.per_packet_jitter_ms > 0.0 {
            let jitter = rand::rng().random_range(0.0..self.per_packet_jitter_ms);
            latency += Duration::from_secs_f64(jitter / 1000.0);
        }
        if from == to {
            latency = Duration::ZERO;
        }

        let core = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            if core.is_crashed(to).await {
                trace!("dropping packet {from} -> {to} of crashed process");
                return;
            }
            if channel.send((from, bytes)).await.is_err() {
                debug!("process {to} stopped receiving");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::time::timeout;

    use super::*;
    use crate::network::Network;

    // test simulated latency accuracy to within +/-5%
    const ACCURACY: f64 = 0.05;

    #[tokio::test]
    #[ignore]
    async fn asymmetric() {
        let core = Arc::new(SimulatedNetworkCore::new().with_jitter(0.0));
        let net1: SimulatedNetwork<u32> = core.join(0, 16).await;
        let net2: SimulatedNetwork<u32> = core.join(1, 16).await;
        core.set_asymmetric_latency(0, 1, Duration::from_millis(10))
            .await;
        core.set_asymmetric_latency(1, 0, Duration::from_millis(100))
            .await;

        // one direction
        let now = Instant::now();
        net1.send(&1, 1).await.unwrap();
        let _ = net2.receive().await.unwrap();
        let latency = now.elapsed().as_micros();
        let min = (10_000.0 * (1.0 - ACCURACY)) as u128;
        let max = (10_000.0 * (1.0 + ACCURACY)) as u128;
        assert!(
            latency > min,
            "latency {latency} should be greater than {min}"
        );
        assert!(
            latency < max,
            "latency {latency} should be less than max {max}"
        );

        // other direction
        let now = Instant::now();
        net2.send(&2, 0).await.unwrap();
        let _ = net1.receive().await.unwrap();
        let latency = now.elapsed().as_micros();
        let min = (100_000.0 * (1.0 - ACCURACY)) as u128;
        let max = (100_000.0 * (1.0 + ACCURACY)) as u128;
        assert!(latency > min);
        assert!(latency < max);
    }

    #[tokio::test]
    async fn latency_order() {
        let core = Arc::new(SimulatedNetworkCore::new().with_jitter(0.0));
        let net1: SimulatedNetwork<u32> = core.join(0, 16).await;
        let net2: SimulatedNetwork<u32> = core.join(1, 16).await;
        let net3: SimulatedNetwork<u32> = core.join(2, 16).await;
        core.set_latency(0, 1, Duration::from_millis(10)).await;
        core.set_latency(0, 2, Duration::from_millis(50)).await;

        // send on the slower link first
        net3.send(&2, 0).await.unwrap();
        net2.send(&1, 0).await.unwrap();

        // faster link should still arrive first
        assert_eq!(net1.receive().await.unwrap(), (1, 1));
        assert_eq!(net1.receive().await.unwrap(), (2, 2));
    }

    #[tokio::test]
    async fn crash() {
        let core = Arc::new(
            SimulatedNetworkCore::new()
                .with_default_latency(Duration::from_millis(20))
                .with_jitter(0.0),
        );
        let net1: SimulatedNetwork<u32> = core.join(0, 16).await;
        let net2: SimulatedNetwork<u32> = core.join(1, 16).await;

        // in transit while the receiver crashes
        net1.send(&1, 1).await.unwrap();
        core.crash(1).await;
        assert!(core.is_crashed(1).await);
        net1.send(&2, 1).await.unwrap();
        net2.send(&3, 0).await.unwrap();

        let res = timeout(Duration::from_millis(100), net2.receive()).await;
        assert!(res.is_err());
        let res = timeout(Duration::from_millis(100), net1.receive()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn unknown_destination() {
        let core = Arc::new(SimulatedNetworkCore::new());
        let net: SimulatedNetwork<u32> = core.join(0, 16).await;
        let res = net.send(&1, 5).await;
        assert!(matches!(res, Err(NetworkError::UnknownDestination(5))));
    }
}
