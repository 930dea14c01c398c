// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Causal-order broadcast.
//!
//! Causal order extends FIFO order to *happened-before*: if a process delivers
//! (or broadcasts) `m1` before it broadcasts `m2`, then no process delivers `m2`
//! before `m1`. Both implementations run atop any reliable broadcast channel:
//! - [`NoWaitingCausal`] piggybacks the full causal history on every message and
//!   delivers missing predecessors straight from it. It never stalls, but its
//!   metadata grows without bound.
//! - [`WaitingCausal`] piggybacks a [`VectorClock`] and buffers messages until
//!   all of their causal predecessors were delivered. Metadata stays fixed-size,
//!   at the cost of delivery latency.

pub mod no_waiting;
pub mod waiting;

pub use self::no_waiting::{CausalMessage, NoWaitingCausal, NoWaitingCausalStack};
pub use self::waiting::{Stamped, VectorClock, WaitingCausal, WaitingCausalStack};
