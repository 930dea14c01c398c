// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! An abstraction layer for the point-to-point link.
//!
//! The [`Network`] trait provides a common interface for sending a message to
//! one process and receiving messages from any process. Broadcast stacks only
//! ever see this interface, via [`crate::Node`].
//!
//! Messages are serialized with [`bincode`] through [`encode`] and [`decode`].
//! [`SimulatedNetwork`] provides an in-memory implementation for local testing.
//!
//! # Examples
//!
//! ```
//! use layercast::network::{Network, NetworkError};
//!
//! async fn echo(network: impl Network<Message = String>) -> Result<(), NetworkError> {
//!     let (from, msg) = network.receive().await?;
//!     network.send(&msg, from).await
//! }
//! ```

pub mod simulated;

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use self::simulated::SimulatedNetwork;
use crate::ProcessId;

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

/// Error type for network operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("serialization error")]
    Serialization(#[from] bincode::error::EncodeError),
    #[error("deserialization error")]
    Deserialization(#[from] bincode::error::DecodeError),
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    #[error("unknown destination {0}")]
    UnknownDestination(ProcessId),
    #[error("network channel closed")]
    ChannelClosed,
}

/// Serializes `message` into owned bytes using [`bincode`].
///
/// # Errors
///
/// Returns [`NetworkError::Serialization`] if bincode encoding fails.
pub fn encode<M: Serialize>(message: &M) -> Result<Vec<u8>, NetworkError> {
    Ok(bincode::serde::encode_to_vec(message, BINCODE_CONFIG)?)
}

/// Deserializes a message from `bytes` using [`bincode`].
///
/// # Errors
///
/// Returns [`NetworkError::Deserialization`] if bincode decoding fails and
/// [`NetworkError::TrailingBytes`] if `bytes` holds more than one message.
pub fn decode<M: DeserializeOwned>(bytes: &[u8]) -> Result<M, NetworkError> {
    let (msg, read) = bincode::serde::decode_from_slice(bytes, BINCODE_CONFIG)?;
    if read != bytes.len() {
        return Err(NetworkError::TrailingBytes(bytes.len() - read));
    }
    Ok(msg)
}

/// Abstraction of a point-to-point link endpoint.
///
/// Implementations are expected to behave like perfect links: no message is
/// lost, duplicated or fabricated while both endpoints are correct.
/// Messages need not arrive in the order they were sent.
pub trait Network: Send + Sync {
    type Message: Send + Sync;

    /// Sends `message` to process `to`.
    fn send(
        &self,
        message: &Self::Message,
        to: ProcessId,
    ) -> impl Future<Output = Result<(), NetworkError>> + Send;

    /// Waits for the next message, returning it along with its sender.
    fn receive(
        &self,
    ) -> impl Future<Output = Result<(ProcessId, Self::Message), NetworkError>> + Send;
}
