/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! In-memory storage of the protocol messages a consensus term has accepted.
//!
//! The [`QuorumStore`] keeps, per term:
//! - at most one [`PrePrepare`] per `(term, view)`; the first one stored wins,
//! - [`Prepare`] and [`Commit`] votes per `(term, view, block_hash)`, at most one per signer,
//! - [`ViewChange`] votes per `(term, view)`, at most one per signer.
//!
//! Votes are kept in arrival order. No operation fails: storing a duplicate returns `false`, and
//! querying a key that has nothing stored returns an empty result.
//!
//! Every successful store publishes a storage [event](crate::events) so that the contents of the store
//! can be audited from the outside.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::events::*;
use crate::messages::{Commit, PrePrepare, Prepare, PreparedProof, SignedMessage, ViewChange};
use crate::types::{
    basic::{BlockHeight, CryptoHash, MemberId, ViewNumber},
    block::Block,
};

/// Key of everything stored per view: pre-prepares and view changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub term: BlockHeight,
    pub view: ViewNumber,
}

/// Key of votes on a specific block: prepares and commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoteKey {
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub block_hash: CryptoHash,
}

impl ViewKey {
    pub fn new(term: BlockHeight, view: ViewNumber) -> ViewKey {
        ViewKey { term, view }
    }
}

impl VoteKey {
    pub fn new(term: BlockHeight, view: ViewNumber, block_hash: CryptoHash) -> VoteKey {
        VoteKey {
            term,
            view,
            block_hash,
        }
    }
}

pub struct QuorumStore {
    pre_prepares: HashMap<ViewKey, PrePrepare>,
    prepares: HashMap<VoteKey, Vec<Prepare>>,
    commits: HashMap<VoteKey, Vec<Commit>>,
    view_changes: HashMap<ViewKey, Vec<ViewChange>>,
    event_publisher: Option<Sender<Event>>,
}

impl QuorumStore {
    pub fn new(event_publisher: Option<Sender<Event>>) -> QuorumStore {
        QuorumStore {
            pre_prepares: HashMap::new(),
            prepares: HashMap::new(),
            commits: HashMap::new(),
            view_changes: HashMap::new(),
            event_publisher,
        }
    }

    /// Store `pre_prepare` as the proposal for its `(term, view)`. Returns `false` if a pre-prepare is
    /// already stored for that `(term, view)`, whatever block it is for.
    pub fn store_pre_prepare(&mut self, pre_prepare: PrePrepare) -> bool {
        let header = pre_prepare.signed_header;
        let key = ViewKey::new(header.term, header.view);
        if self.pre_prepares.contains_key(&key) {
            return false;
        }
        self.pre_prepares.insert(key, pre_prepare);

        Event::publish(
            &self.event_publisher,
            Event::StorePrePrepare(StorePrePrepareEvent {
                timestamp: SystemTime::now(),
                term: header.term,
                view: header.view,
                block_hash: header.block_hash,
            }),
        );
        true
    }

    pub fn pre_prepare(&self, term: BlockHeight, view: ViewNumber) -> Option<&PrePrepare> {
        self.pre_prepares.get(&ViewKey::new(term, view))
    }

    /// Get the block proposed for `(term, view)`, if a pre-prepare was stored for it.
    pub fn pre_prepared_block(&self, term: BlockHeight, view: ViewNumber) -> Option<&Block> {
        self.pre_prepare(term, view).map(|pp| &pp.block)
    }

    /// Store a prepare vote. Returns `false` if its signer already has a prepare stored for the same
    /// `(term, view, block_hash)`.
    pub fn store_prepare(&mut self, prepare: Prepare) -> bool {
        let header = prepare.signed_header;
        let signer = prepare.sender.member;
        let key = VoteKey::new(header.term, header.view, header.block_hash);
        let votes = self.prepares.entry(key).or_default();
        if votes.iter().any(|vote| vote.sender.member == signer) {
            return false;
        }
        votes.push(prepare);
        let count = votes.len();

        Event::publish(
            &self.event_publisher,
            Event::StorePrepare(StorePrepareEvent {
                timestamp: SystemTime::now(),
                term: header.term,
                view: header.view,
                block_hash: header.block_hash,
                signer,
                count,
            }),
        );
        true
    }

    pub fn prepares(
        &self,
        term: BlockHeight,
        view: ViewNumber,
        block_hash: CryptoHash,
    ) -> &[Prepare] {
        self.prepares
            .get(&VoteKey::new(term, view, block_hash))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn prepare_signers(
        &self,
        term: BlockHeight,
        view: ViewNumber,
        block_hash: CryptoHash,
    ) -> Vec<MemberId> {
        signers(self.prepares(term, view, block_hash))
    }

    /// Store a commit vote. Returns `false` if its signer already has a commit stored for the same
    /// `(term, view, block_hash)`.
    pub fn store_commit(&mut self, commit: Commit) -> bool {
        let header = commit.signed_header;
        let signer = commit.sender.member;
        let key = VoteKey::new(header.term, header.view, header.block_hash);
        let votes = self.commits.entry(key).or_default();
        if votes.iter().any(|vote| vote.sender.member == signer) {
            return false;
        }
        votes.push(commit);
        let count = votes.len();

        Event::publish(
            &self.event_publisher,
            Event::StoreCommit(StoreCommitEvent {
                timestamp: SystemTime::now(),
                term: header.term,
                view: header.view,
                block_hash: header.block_hash,
                signer,
                count,
            }),
        );
        true
    }

    pub fn commits(
        &self,
        term: BlockHeight,
        view: ViewNumber,
        block_hash: CryptoHash,
    ) -> &[Commit] {
        self.commits
            .get(&VoteKey::new(term, view, block_hash))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn commit_signers(
        &self,
        term: BlockHeight,
        view: ViewNumber,
        block_hash: CryptoHash,
    ) -> Vec<MemberId> {
        signers(self.commits(term, view, block_hash))
    }

    /// Store a view change vote. Returns `false` if its signer already has a view change stored for the
    /// same `(term, view)`.
    pub fn store_view_change(&mut self, view_change: ViewChange) -> bool {
        let term = view_change.signed_header.term;
        let view = view_change.signed_header.view;
        let signer = view_change.sender.member;
        let votes = self.view_changes.entry(ViewKey::new(term, view)).or_default();
        if votes.iter().any(|vote| vote.sender.member == signer) {
            return false;
        }
        votes.push(view_change);
        let count = votes.len();

        Event::publish(
            &self.event_publisher,
            Event::StoreViewChange(StoreViewChangeEvent {
                timestamp: SystemTime::now(),
                term,
                view,
                signer,
                count,
            }),
        );
        true
    }

    pub fn view_changes(&self, term: BlockHeight, view: ViewNumber) -> &[ViewChange] {
        self.view_changes
            .get(&ViewKey::new(term, view))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct signers that asked to move to `view` in `term`.
    pub fn count_view_changes(&self, term: BlockHeight, view: ViewNumber) -> usize {
        self.view_changes(term, view).len()
    }

    /// Package the highest-viewed pre-prepare of `term` from a view below `before_view` that has at
    /// least `min_prepares` matching prepares from members other than its leader into a
    /// [`PreparedProof`]. Returns the empty proof if no such view of `term` qualifies.
    ///
    /// Pre-prepares buffered for `before_view` or later are never packaged: a view change to
    /// `before_view` may only carry a proof from an earlier view.
    pub fn latest_prepared_proof(
        &self,
        term: BlockHeight,
        before_view: ViewNumber,
        min_prepares: usize,
    ) -> PreparedProof {
        let mut best: Option<(&PrePrepare, Vec<Prepare>)> = None;
        let candidates = self
            .pre_prepares
            .iter()
            .filter(|(key, _)| key.term == term && key.view < before_view);
        for (key, pre_prepare) in candidates {
            if let Some((current, _)) = &best {
                if current.signed_header.view >= key.view {
                    continue;
                }
            }

            let leader = pre_prepare.sender.member;
            let prepares: Vec<Prepare> = self
                .prepares(term, key.view, pre_prepare.signed_header.block_hash)
                .iter()
                .filter(|prepare| prepare.sender.member != leader)
                .cloned()
                .collect();
            if prepares.len() >= min_prepares {
                best = Some((pre_prepare, prepares));
            }
        }

        match best {
            Some((pre_prepare, prepares)) => PreparedProof::new(pre_prepare.clone(), prepares),
            None => PreparedProof::empty(),
        }
    }

    /// Discard everything stored for `term`.
    pub fn clear_term(&mut self, term: BlockHeight) {
        self.pre_prepares.retain(|key, _| key.term != term);
        self.prepares.retain(|key, _| key.term != term);
        self.commits.retain(|key, _| key.term != term);
        self.view_changes.retain(|key, _| key.term != term);

        Event::publish(
            &self.event_publisher,
            Event::ClearTerm(ClearTermEvent {
                timestamp: SystemTime::now(),
                term,
            }),
        );
    }
}

fn signers<M: SignedMessage>(votes: &[M]) -> Vec<MemberId> {
    votes.iter().map(|vote| vote.sender().member).collect()
}
