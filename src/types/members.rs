/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [Members] type and its associated methods.

use std::{collections::HashSet, slice};

use super::basic::{MemberId, ViewNumber};

/// The fixed, ordered list of replicas taking part in consensus.
///
/// The order is agreed out of band and is significant: it determines which member leads which view
/// (see [`Members::leader_for_view`]). Neither the order nor the size changes during a term.
///
/// # Fault tolerance
///
/// With `n` members, up to `f = ⌊(n - 1) / 3⌋` of them may be arbitrarily faulty. Quorums are sets of
/// `2f + 1` distinct members.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Members {
    members: Vec<MemberId>,
}

impl Members {
    /// Create a membership list. Fails if the list is empty or contains the same member twice.
    pub fn new(members: Vec<MemberId>) -> Result<Members, ConfigurationError> {
        if members.is_empty() {
            return Err(ConfigurationError::EmptyMembership);
        }

        let mut seen = HashSet::new();
        for member in &members {
            if !seen.insert(*member) {
                return Err(ConfigurationError::DuplicateMember { member: *member });
            }
        }

        Ok(Members { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    pub fn position(&self, member: &MemberId) -> Option<usize> {
        self.members.iter().position(|m| m == member)
    }

    /// Get an iterator through the members in their agreed order.
    pub fn iter(&self) -> slice::Iter<MemberId> {
        self.members.iter()
    }

    /// All members except `me`, in order.
    pub fn others(&self, me: &MemberId) -> Vec<MemberId> {
        self.members.iter().filter(|m| *m != me).copied().collect()
    }

    /// Maximum number of faulty members tolerated.
    pub fn f(&self) -> usize {
        (self.members.len() - 1) / 3
    }

    /// Number of distinct members that make up a quorum: `2f + 1`.
    pub fn quorum(&self) -> usize {
        2 * self.f() + 1
    }

    /// Round-robin leader selection: `members[view mod n]`.
    pub fn leader_for_view(&self, view: ViewNumber) -> MemberId {
        let index = view.int() % self.members.len() as u64;
        self.members[index as usize]
    }
}

/// Ways in which the replica's static configuration can be unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The membership list has no members.
    EmptyMembership,

    /// The membership list names the same member more than once.
    DuplicateMember { member: MemberId },

    /// The local replica is not part of the membership list.
    NotAMember { me: MemberId },
}
