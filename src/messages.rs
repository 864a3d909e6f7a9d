/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas.
//!
//! The protocol uses exactly five message kinds, modelled as the closed enum [`PbftMessage`]. Every
//! message consists of:
//! 1. A **signed header**: the part of the message that the sender signs over. It always starts with
//!    the [`MessageKind`], the term (height of the block being agreed on), and the view.
//! 2. A [`SenderSignature`]: who signed the header, and the signature itself.
//! 3. For [`PrePrepare`] and [`NewView`], an unsigned payload (the proposed block, or the attached
//!    pre-prepare). The payload is bound to the header through the block hash.
//!
//! Signed headers are serialized canonically with borsh before signing, so any recipient holding the
//! signer's public key can verify a message independently.

use std::io;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    basic::{BlockHeight, CryptoHash, MemberId, SignatureBytes, ViewNumber},
    block::Block,
    crypto_primitives::{canonical_bytes, KeyManager},
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum PbftMessage {
    PrePrepare(PrePrepare),
    Prepare(Prepare),
    Commit(Commit),
    ViewChange(ViewChange),
    NewView(NewView),
}

impl PbftMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            PbftMessage::PrePrepare(_) => MessageKind::PrePrepare,
            PbftMessage::Prepare(_) => MessageKind::Prepare,
            PbftMessage::Commit(_) => MessageKind::Commit,
            PbftMessage::ViewChange(_) => MessageKind::ViewChange,
            PbftMessage::NewView(_) => MessageKind::NewView,
        }
    }

    /// The kind the sender wrote into the signed header. For well-formed messages this equals
    /// [`kind`](Self::kind).
    pub fn header_kind(&self) -> MessageKind {
        match self {
            PbftMessage::PrePrepare(msg) => msg.signed_header.kind,
            PbftMessage::Prepare(msg) => msg.signed_header.kind,
            PbftMessage::Commit(msg) => msg.signed_header.kind,
            PbftMessage::ViewChange(msg) => msg.signed_header.kind,
            PbftMessage::NewView(msg) => msg.signed_header.kind,
        }
    }

    /// Returns the term (block height) a given [PbftMessage] is about.
    pub fn term(&self) -> BlockHeight {
        match self {
            PbftMessage::PrePrepare(msg) => msg.signed_header.term,
            PbftMessage::Prepare(msg) => msg.signed_header.term,
            PbftMessage::Commit(msg) => msg.signed_header.term,
            PbftMessage::ViewChange(msg) => msg.signed_header.term,
            PbftMessage::NewView(msg) => msg.signed_header.term,
        }
    }

    /// Returns the view number associated with a given [PbftMessage].
    pub fn view(&self) -> ViewNumber {
        match self {
            PbftMessage::PrePrepare(msg) => msg.signed_header.view,
            PbftMessage::Prepare(msg) => msg.signed_header.view,
            PbftMessage::Commit(msg) => msg.signed_header.view,
            PbftMessage::ViewChange(msg) => msg.signed_header.view,
            PbftMessage::NewView(msg) => msg.signed_header.view,
        }
    }

    pub fn sender(&self) -> &SenderSignature {
        match self {
            PbftMessage::PrePrepare(msg) => &msg.sender,
            PbftMessage::Prepare(msg) => &msg.sender,
            PbftMessage::Commit(msg) => &msg.sender,
            PbftMessage::ViewChange(msg) => &msg.sender,
            PbftMessage::NewView(msg) => &msg.sender,
        }
    }

    /// Serialize the message into the byte blob handed to the transport.
    pub fn encode(&self) -> Vec<u8> {
        canonical_bytes(self)
    }

    /// Parse a byte blob received from the transport.
    pub fn decode(bytes: &[u8]) -> Result<PbftMessage, DecodeError> {
        PbftMessage::try_from_slice(bytes).map_err(DecodeError::from)
    }
}

/// Returned when a byte blob received from the transport is not a well-formed [`PbftMessage`].
#[derive(Debug)]
pub enum DecodeError {
    Malformed(io::Error),
}

impl From<io::Error> for DecodeError {
    fn from(value: io::Error) -> Self {
        DecodeError::Malformed(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum MessageKind {
    PrePrepare,
    Prepare,
    Commit,
    ViewChange,
    NewView,
}

/// Identity of the signer of a message, and its signature over the message's signed header.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SenderSignature {
    pub member: MemberId,
    pub signature: SignatureBytes,
}

/// Signed header of the three messages that refer to a block: [`PrePrepare`], [`Prepare`], and
/// [`Commit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockRef {
    pub kind: MessageKind,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub block_hash: CryptoHash,
}

/// A leader's proposal of `block` for its view.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PrePrepare {
    pub signed_header: BlockRef,
    pub sender: SenderSignature,
    pub block: Block,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Prepare {
    pub signed_header: BlockRef,
    pub sender: SenderSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Commit {
    pub signed_header: BlockRef,
    pub sender: SenderSignature,
}

/// Signed header of a [`ViewChange`]. The prepared proof is part of what is signed.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ViewChangeHeader {
    pub kind: MessageKind,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub prepared_proof: PreparedProof,
}

/// A vote to move to `view`, sent to the prospective leader of that view.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ViewChange {
    pub signed_header: ViewChangeHeader,
    pub sender: SenderSignature,
}

/// Signed header of a [`NewView`]: the view-change votes that justify the new view.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewViewHeader {
    pub kind: MessageKind,
    pub term: BlockHeight,
    pub view: ViewNumber,
    pub view_change_confirmations: Vec<ViewChange>,
}

/// Announcement by the leader of `view` that it has been elected, together with its proposal for the
/// view.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewView {
    pub signed_header: NewViewHeader,
    pub sender: SenderSignature,
    pub pre_prepare: PrePrepare,
}

/// Evidence that a replica was prepared on a block in some view: the leader's [`PrePrepare`] and at
/// least `2f` matching [`Prepare`]s from other members.
///
/// Both parts are optional on the wire. A proof with neither part is the *empty* proof ("not prepared
/// on anything"); a proof with only one of the two parts is malformed and never validates.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PreparedProof {
    pub pre_prepare: Option<PrePrepare>,
    pub prepares: Option<Vec<Prepare>>,
}

impl PreparedProof {
    pub fn new(pre_prepare: PrePrepare, prepares: Vec<Prepare>) -> PreparedProof {
        PreparedProof {
            pre_prepare: Some(pre_prepare),
            prepares: Some(prepares),
        }
    }

    pub fn empty() -> PreparedProof {
        PreparedProof::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pre_prepare.is_none() && self.prepares.is_none()
    }

    /// The view the proof's pre-prepare was proposed in, if it carries one.
    pub fn view(&self) -> Option<ViewNumber> {
        self.pre_prepare.as_ref().map(|pp| pp.signed_header.view)
    }

    /// The block the proof is about, if it carries one.
    pub fn block(&self) -> Option<&Block> {
        self.pre_prepare.as_ref().map(|pp| &pp.block)
    }
}

/// Data types that contain: 1. A signed header, and 2. A digital signature over said header whose
/// correctness can be verified through a [`KeyManager`].
pub trait SignedMessage {
    /// Get the bytes that are passed as input into the signing function to form the signature
    /// of the `SignedMessage`.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signer and signature of the `SignedMessage`.
    fn sender(&self) -> &SenderSignature;

    /// Verify that the signature was created by the claimed signer over `message_bytes`.
    fn is_correct(&self, key_manager: &dyn KeyManager) -> bool {
        let sender = self.sender();
        key_manager.verify(&self.message_bytes(), &sender.signature, &sender.member)
    }
}

impl SignedMessage for PrePrepare {
    fn message_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.signed_header)
    }

    fn sender(&self) -> &SenderSignature {
        &self.sender
    }
}

impl SignedMessage for Prepare {
    fn message_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.signed_header)
    }

    fn sender(&self) -> &SenderSignature {
        &self.sender
    }
}

impl SignedMessage for Commit {
    fn message_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.signed_header)
    }

    fn sender(&self) -> &SenderSignature {
        &self.sender
    }
}

impl SignedMessage for ViewChange {
    fn message_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.signed_header)
    }

    fn sender(&self) -> &SenderSignature {
        &self.sender
    }
}

impl SignedMessage for NewView {
    fn message_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.signed_header)
    }

    fn sender(&self) -> &SenderSignature {
        &self.sender
    }
}

impl From<PrePrepare> for PbftMessage {
    fn from(value: PrePrepare) -> Self {
        PbftMessage::PrePrepare(value)
    }
}

impl From<Prepare> for PbftMessage {
    fn from(value: Prepare) -> Self {
        PbftMessage::Prepare(value)
    }
}

impl From<Commit> for PbftMessage {
    fn from(value: Commit) -> Self {
        PbftMessage::Commit(value)
    }
}

impl From<ViewChange> for PbftMessage {
    fn from(value: ViewChange) -> Self {
        PbftMessage::ViewChange(value)
    }
}

impl From<NewView> for PbftMessage {
    fn from(value: NewView) -> Self {
        PbftMessage::NewView(value)
    }
}
