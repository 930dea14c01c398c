// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Static membership of a broadcast group.
//!
//! The process set is fixed at construction and never mutated.
//! Members are kept in ascending order, which doubles as the rank table
//! used to index vector clocks.

use thiserror::Error;

use crate::ProcessId;

/// Errors that can occur when constructing a [`Membership`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MembershipError {
    #[error("membership must contain at least one process")]
    Empty,
    #[error("own process {0} is not a member")]
    NotAMember(ProcessId),
}

/// Group-specific process information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    own_id: ProcessId,
    own_rank: usize,
    /// All members, sorted ascending and deduplicated.
    members: Vec<ProcessId>,
}

impl Membership {
    /// Creates a new `Membership` for process `own_id` with the given members.
    ///
    /// Duplicate IDs collapse into one member.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError::Empty`] if `members` is empty and
    /// [`MembershipError::NotAMember`] if `own_id` is not among `members`.
    pub fn new(
        own_id: ProcessId,
        members: impl IntoIterator<Item = ProcessId>,
    ) -> Result<Self, MembershipError> {
        let mut members: Vec<_> = members.into_iter().collect();
        members.sort_unstable();
        members.dedup();
        if members.is_empty() {
            return Err(MembershipError::Empty);
        }
        let Ok(own_rank) = members.binary_search(&own_id) else {
            return Err(MembershipError::NotAMember(own_id));
        };
        Ok(Self {
            own_id,
            own_rank,
            members,
        })
    }

    /// Gives the ID of the process this membership belongs to.
    #[must_use]
    pub const fn own_id(&self) -> ProcessId {
        self.own_id
    }

    /// Gives the static rank of the process this membership belongs to.
    #[must_use]
    pub const fn own_rank(&self) -> usize {
        self.own_rank
    }

    /// Gives the static rank of the given process, if it is a member.
    ///
    /// Ranks are dense, starting at 0 for the smallest ID.
    #[must_use]
    pub fn rank(&self, id: ProcessId) -> Option<usize> {
        self.members.binary_search(&id).ok()
    }

    /// Returns `true` iff the given process is a member.
    #[must_use]
    pub fn contains(&self, id: ProcessId) -> bool {
        self.rank(id).is_some()
    }

    /// Gives the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`, construction rejects empty memberships.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Smallest number of members strictly greater than half.
    #[must_use]
    pub fn majority(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Iterates over all members in rank order.
    pub fn iter(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.members.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let membership = Membership::new(2, [3, 1, 2]).unwrap();
        assert_eq!(membership.own_id(), 2);
        assert_eq!(membership.own_rank(), 1);
        assert_eq!(membership.len(), 3);
        assert_eq!(membership.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(membership.rank(1), Some(0));
        assert_eq!(membership.rank(3), Some(2));
        assert_eq!(membership.rank(4), None);
        assert!(!membership.contains(0));
    }

    #[test]
    fn duplicates() {
        let membership = Membership::new(0, [0, 1, 1, 0]).unwrap();
        assert_eq!(membership.len(), 2);
        assert_eq!(membership.majority(), 2);
    }

    #[test]
    fn invalid() {
        assert_eq!(Membership::new(0, []), Err(MembershipError::Empty));
        assert_eq!(
            Membership::new(5, [0, 1, 2]),
            Err(MembershipError::NotAMember(5))
        );
    }

    #[test]
    fn majority() {
        assert_eq!(Membership::new(0, 0..1).unwrap().majority(), 1);
        assert_eq!(Membership::new(0, 0..4).unwrap().majority(), 3);
        assert_eq!(Membership::new(0, 0..5).unwrap().majority(), 3);
    }
}
