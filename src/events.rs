/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events a replica emits, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events fall into three
//! groups:
//! 1. **Storage events**, emitted by the [quorum store](crate::quorum_store) every time it records a
//!    message or discards a term.
//! 2. **Flow events**, emitted by the [consensus term](crate::pbft::term) as it moves through the
//!    protocol: proposing, voting, getting prepared, finalizing, timing out, and changing views.
//! 3. **Audit events**: [`RejectMessageEvent`], emitted whenever an inbound message is dropped, with
//!    the reason it was dropped. Rejections are never errors; this is the only trace they leave.
//!
//! Events are published on an optional [`Sender`]. If the receiving end has gone away, the event is
//! silently discarded.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::messages::{Commit, MessageKind, Prepare, ViewChange};
use crate::types::basic::{BlockHeight, CryptoHash, MemberId, ViewNumber};
use crate::types::block::Block;

pub enum Event {
    // Events emitted by the quorum store.
    StorePrePrepare(StorePrePrepareEvent),
    StorePrepare(StorePrepareEvent),
    StoreCommit(StoreCommitEvent),
    StoreViewChange(StoreViewChangeEvent),
    ClearTerm(ClearTermEvent),
    // Events that involve sending a protocol message.
    Propose(ProposeEvent),
    SendPrepare(SendPrepareEvent),
    SendCommit(SendCommitEvent),
    SendViewChange(SendViewChangeEvent),
    SendNewView(SendNewViewEvent),
    // Progress events.
    Prepared(PreparedEvent),
    FinalizeBlock(FinalizeBlockEvent),
    Elected(ElectedEvent),
    EnterView(EnterViewEvent),
    ViewTimeout(ViewTimeoutEvent),
    // Audit events.
    RejectMessage(RejectMessageEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

/// A pre-prepare was stored for `(term, view)`. Emitted at most once per `(term, view)`.
pub struct StorePrePrepareEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub block_hash: CryptoHash,
}

/// A new prepare vote was stored. `count` is the number of distinct signers for the same
/// `(term, view, block_hash)` after storing it.
pub struct StorePrepareEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub block_hash: CryptoHash,
    pub signer: MemberId,
    pub count: usize,
}

pub struct StoreCommitEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub block_hash: CryptoHash,
    pub signer: MemberId,
    pub count: usize,
}

pub struct StoreViewChangeEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub signer: MemberId,
    pub count: usize,
}

/// Everything stored for `term` was discarded.
pub struct ClearTermEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
}

/// The local replica, as leader of `view`, multicast a pre-prepare for `block`.
pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub block: Block,
}

pub struct SendPrepareEvent {
    pub timestamp: SystemTime,
    pub prepare: Prepare,
}

pub struct SendCommitEvent {
    pub timestamp: SystemTime,
    pub commit: Commit,
}

/// The local replica sent `view_change` to `leader`, the prospective leader of the view it asks for.
pub struct SendViewChangeEvent {
    pub timestamp: SystemTime,
    pub leader: MemberId,
    pub view_change: ViewChange,
}

pub struct SendNewViewEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub block_hash: CryptoHash,
    pub confirmations: usize,
}

/// The local replica became prepared on `block_hash` in `view`.
pub struct PreparedEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub block_hash: CryptoHash,
}

/// `block` was finalized. Emitted exactly once per term.
pub struct FinalizeBlockEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub block: Block,
}

/// The local replica collected a quorum of view changes and became leader of `view`.
pub struct ElectedEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
}

pub struct EnterViewEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub leader: MemberId,
}

/// The election trigger fired while the replica was in `view`.
pub struct ViewTimeoutEvent {
    pub timestamp: SystemTime,
    pub term: BlockHeight,
    pub view: ViewNumber,
}

/// An inbound message was dropped.
pub struct RejectMessageEvent {
    pub timestamp: SystemTime,
    pub kind: MessageKind,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub sender: MemberId,
    pub reason: RejectReason,
}

/// Why an inbound message was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The message was signed by the local replica.
    SelfOriginated,
    /// The message is not about the active term.
    WrongTerm,
    /// The signer is not a member.
    UnknownMember,
    /// The signed header claims a different message kind than the message it arrived as.
    MalformedHeader,
    /// The message is for a view older than the current one.
    StaleView,
    /// The sender is not the leader for the message's view, or the local replica is not the
    /// prospective leader a view change is addressed to.
    NotLeader,
    /// A prepare signed by the leader of its view.
    LeaderPrepare,
    /// The signature does not verify against the claimed signer.
    BadSignature,
    /// A second, different pre-prepare for a `(term, view)` that already has one.
    Equivocation,
    /// The block's contents do not hash to the claimed block hash.
    BadBlockHash,
    /// The block's height is not the term.
    BadBlockHeight,
    /// The block does not extend the last finalized block.
    BadPredecessor,
    /// An embedded prepared proof failed validation.
    InvalidProof,
    /// A new view whose justification set is too small, has duplicate signers, or has confirmations
    /// for a different term or view.
    InvalidConfirmations,
    /// A new view whose pre-prepare is for another term or view, or is signed by someone other than
    /// the new view's sender.
    PrePrepareMismatch,
    /// A new view whose pre-prepare does not honor the highest prepared proof in its justification.
    IgnoresPreparedProof,
    /// A new view for the view the local replica has already established.
    ViewAlreadyEstablished,
    /// The application rejected the proposed block.
    BlockRejected,
}
