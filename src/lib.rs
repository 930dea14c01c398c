// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Layercast: classic fault-tolerant broadcast abstractions.
//!
//! A static set of crash-prone processes talks over unreliable point-to-point links.
//! On top of that, this crate layers increasingly strong delivery guarantees:
//! best-effort, reliable (eager and lazy), uniform reliable (all-ack and majority-ack),
//! FIFO-ordered and causally-ordered (no-waiting and waiting) broadcast.
//!
//! Every protocol is a synchronous, run-to-completion state machine.
//! See [`broadcast`] for the cross-layer contract and how layers compose.

#![deny(rustdoc::broken_intra_doc_links)]

pub mod broadcast;
pub mod config;
pub mod logging;
pub mod membership;
pub mod network;
pub mod node;
#[cfg(test)]
pub mod test_utils;

use std::fmt::Debug;

pub use self::broadcast::{Effect, Layer, Layered, Output, Stack};
pub use self::config::NodeConfig;
pub use self::membership::Membership;
pub use self::node::{Delivery, Node, NodeHandle};

/// Process ID number type.
///
/// Totally ordered; used for tie-breaking, ranking and as map key.
pub type ProcessId = u64;

/// Application-opaque unit of data broadcast as one logical message.
///
/// Payloads are deduplicated by structural equality together with their origin.
/// The ordering is only used for deterministic bookkeeping in ordered collections.
pub trait Payload: Clone + Debug + Ord {}

impl<T: Clone + Debug + Ord> Payload for T {}
