/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`App`] trait: the application that produces and validates the blocks replicas agree on.
//!
//! ## Producing blocks
//!
//! When the local replica leads a view and has no prepared block it must re-propose, it calls
//! [`App::produce_block`]. The app returns the block's [`Data`]; the replica builds the [`Block`]
//! itself, so the block's height, predecessor, and hash are always well-formed.
//!
//! ## Validating blocks
//!
//! Validation may take arbitrary time, so [`App::validate_block`] does not return a verdict. Instead,
//! the [`ValidateBlockRequest`] carries a [`ValidationResponder`] that the app calls
//! [`respond`](ValidationResponder::respond) on whenever it has decided, from any thread. Until then,
//! the replica keeps processing other messages.
//!
//! Verdicts that arrive after the term or view they were requested for has ended are ignored.

use std::sync::mpsc::Sender;

use crate::types::{
    basic::{BlockHeight, CryptoHash, Data, ViewNumber},
    block::Block,
};

pub trait App: Send {
    /// Called when the local replica has to propose a fresh block for `request.term()`.
    fn produce_block(&mut self, request: ProduceBlockRequest) -> ProduceBlockResponse;

    /// Called when a block proposed by a leader has to be validated before the local replica votes
    /// for it. The app must eventually call [`ValidateBlockRequest::respond`] (or respond through the
    /// [responder](ValidateBlockRequest::into_responder)); a request that is never responded to is
    /// treated as a rejection.
    fn validate_block(&mut self, request: ValidateBlockRequest);
}

pub struct ProduceBlockRequest {
    term: BlockHeight,
    view: ViewNumber,
    previous_hash: CryptoHash,
}

impl ProduceBlockRequest {
    pub(crate) fn new(term: BlockHeight, view: ViewNumber, previous_hash: CryptoHash) -> Self {
        Self {
            term,
            view,
            previous_hash,
        }
    }

    /// Height of the block to produce.
    pub fn term(&self) -> BlockHeight {
        self.term
    }

    pub fn view(&self) -> ViewNumber {
        self.view
    }

    /// Hash of the last finalized block, which the new block extends.
    pub fn previous_hash(&self) -> CryptoHash {
        self.previous_hash
    }
}

pub struct ProduceBlockResponse {
    pub data: Data,
}

pub struct ValidateBlockRequest {
    block: Block,
    responder: ValidationResponder,
}

impl ValidateBlockRequest {
    pub(crate) fn new(block: Block, responder: ValidationResponder) -> Self {
        Self { block, responder }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    /// The view the block was proposed in.
    pub fn view(&self) -> ViewNumber {
        self.responder.key.view
    }

    /// Deliver the verdict right away.
    pub fn respond(self, valid: bool) {
        self.responder.respond(valid)
    }

    /// Split off the responder, e.g. to deliver the verdict from another thread later.
    pub fn into_responder(self) -> ValidationResponder {
        self.responder
    }
}

/// Identifies a pending block validation: the term, view, and hash of the block being validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PendingValidationKey {
    pub(crate) term: BlockHeight,
    pub(crate) view: ViewNumber,
    pub(crate) block_hash: CryptoHash,
}

/// A verdict on a pending validation, on its way back to the replica.
pub(crate) struct ValidationOutcome {
    pub(crate) key: PendingValidationKey,
    pub(crate) valid: bool,
}

/// One-shot handle for delivering the verdict of a [`ValidateBlockRequest`].
pub struct ValidationResponder {
    key: PendingValidationKey,
    outcomes: Sender<ValidationOutcome>,
}

impl ValidationResponder {
    pub(crate) fn new(key: PendingValidationKey, outcomes: Sender<ValidationOutcome>) -> Self {
        Self { key, outcomes }
    }

    pub fn block_hash(&self) -> CryptoHash {
        self.key.block_hash
    }

    pub fn respond(self, valid: bool) {
        // The replica may have shut down in the meantime, in which case nobody is waiting.
        let _ = self.outcomes.send(ValidationOutcome {
            key: self.key,
            valid,
        });
    }
}
