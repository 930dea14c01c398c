// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node configuration, stored as TOML.
//!
//! # Examples
//!
//! ```
//! use layercast::NodeConfig;
//!
//! let config = NodeConfig::from_toml_str("id = 1\nmembers = [0, 1, 2]").unwrap();
//! let membership = config.membership().unwrap();
//! assert_eq!(membership.rank(1), Some(1));
//! assert_eq!(config.channel_capacity, 1024);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ProcessId;
use crate::membership::{Membership, MembershipError};

/// Default capacity for request, delivery and network channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Errors that can occur when loading or using a [`NodeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file failed")]
    Io(#[from] std::io::Error),
    #[error("parsing config failed")]
    Parse(#[from] toml::de::Error),
    #[error("serializing config failed")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid membership")]
    Membership(#[from] MembershipError),
}

/// Configuration of a single process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// ID of this process.
    pub id: ProcessId,
    /// IDs of all processes in the group, including this one.
    pub members: Vec<ProcessId>,
    /// Capacity of the request, delivery and network channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl NodeConfig {
    /// Creates configs for a cluster of processes `0..n`, one per process.
    #[must_use]
    pub fn cluster(n: u64) -> Vec<Self> {
        (0..n)
            .map(|id| Self {
                id,
                members: (0..n).collect(),
                channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            })
            .collect()
    }

    /// Parses a config from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `s` is not a valid config.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Serializes this config into a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if TOML serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Loads a config from the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it does not hold a valid config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Builds the [`Membership`] described by this config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Membership`] if `members` is empty or lacks `id`.
    pub fn membership(&self) -> Result<Membership, ConfigError> {
        Ok(Membership::new(self.id, self.members.iter().copied())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let config = NodeConfig::from_toml_str(
            r"
            id = 2
            members = [0, 1, 2, 3]
            channel_capacity = 64
            ",
        )
        .unwrap();
        assert_eq!(config.id, 2);
        assert_eq!(config.channel_capacity, 64);
        let membership = config.membership().unwrap();
        assert_eq!(membership.own_id(), 2);
        assert_eq!(membership.len(), 4);
    }

    #[test]
    fn cluster() {
        let configs = NodeConfig::cluster(3);
        assert_eq!(configs.len(), 3);
        for (i, config) in configs.iter().enumerate() {
            assert_eq!(config.id, i as u64);
            let s = config.to_toml_string().unwrap();
            assert_eq!(&NodeConfig::from_toml_str(&s).unwrap(), config);
        }
    }

    #[test]
    fn invalid() {
        let res = NodeConfig::from_toml_str("members = [0, 1]");
        assert!(matches!(res, Err(ConfigError::Parse(_))));

        let config = NodeConfig::from_toml_str("id = 5\nmembers = [0, 1]").unwrap();
        assert!(matches!(
            config.membership(),
            Err(ConfigError::Membership(MembershipError::NotAMember(5)))
        ));

        let config = NodeConfig::from_toml_str("id = 0\nmembers = []").unwrap();
        assert!(matches!(
            config.membership(),
            Err(ConfigError::Membership(MembershipError::Empty))
        ));
    }

    #[test]
    fn load() {
        let path = std::env::temp_dir().join(format!("layercast_{}.toml", std::process::id()));
        let config = NodeConfig::cluster(2).remove(1);
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(NodeConfig::load(&path).unwrap(), config);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(NodeConfig::load(&path), Err(ConfigError::Io(_))));
    }
}
