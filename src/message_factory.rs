/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Construction and signing of the five [protocol messages](crate::messages).

use std::sync::Arc;

use crate::messages::*;
use crate::types::{
    basic::{BlockHeight, CryptoHash, MemberId, ViewNumber},
    block::Block,
    crypto_primitives::{canonical_bytes, KeyManager},
};

/// Builds protocol messages and signs them with the local replica's key.
///
/// Every `create_*` method builds the signed header for its message kind, serializes it canonically,
/// and signs the result through the [`KeyManager`]. The output can be verified by any replica that
/// knows the local replica's [`MemberId`].
#[derive(Clone)]
pub struct MessageFactory {
    key_manager: Arc<dyn KeyManager>,
}

impl MessageFactory {
    pub fn new(key_manager: Arc<dyn KeyManager>) -> MessageFactory {
        MessageFactory { key_manager }
    }

    pub fn my_id(&self) -> MemberId {
        self.key_manager.my_id()
    }

    pub fn key_manager(&self) -> &dyn KeyManager {
        self.key_manager.as_ref()
    }

    pub fn create_pre_prepare(
        &self,
        term: BlockHeight,
        view: ViewNumber,
        block: Block,
    ) -> PrePrepare {
        let signed_header = self.block_ref(MessageKind::PrePrepare, term, view, block.hash);
        PrePrepare {
            sender: self.sign(&signed_header),
            signed_header,
            block,
        }
    }

    pub fn create_prepare(
        &self,
        term: BlockHeight,
        view: ViewNumber,
        block_hash: CryptoHash,
    ) -> Prepare {
        let signed_header = self.block_ref(MessageKind::Prepare, term, view, block_hash);
        Prepare {
            sender: self.sign(&signed_header),
            signed_header,
        }
    }

    pub fn create_commit(
        &self,
        term: BlockHeight,
        view: ViewNumber,
        block_hash: CryptoHash,
    ) -> Commit {
        let signed_header = self.block_ref(MessageKind::Commit, term, view, block_hash);
        Commit {
            sender: self.sign(&signed_header),
            signed_header,
        }
    }

    pub fn create_view_change(
        &self,
        term: BlockHeight,
        view: ViewNumber,
        prepared_proof: PreparedProof,
    ) -> ViewChange {
        let signed_header = ViewChangeHeader {
            kind: MessageKind::ViewChange,
            term,
            view,
            prepared_proof,
        };
        ViewChange {
            sender: self.sign(&signed_header),
            signed_header,
        }
    }

    pub fn create_new_view(
        &self,
        term: BlockHeight,
        view: ViewNumber,
        view_change_confirmations: Vec<ViewChange>,
        pre_prepare: PrePrepare,
    ) -> NewView {
        let signed_header = NewViewHeader {
            kind: MessageKind::NewView,
            term,
            view,
            view_change_confirmations,
        };
        NewView {
            sender: self.sign(&signed_header),
            signed_header,
            pre_prepare,
        }
    }

    fn block_ref(
        &self,
        kind: MessageKind,
        term: BlockHeight,
        view: ViewNumber,
        block_hash: CryptoHash,
    ) -> BlockRef {
        BlockRef {
            kind,
            term,
            view,
            block_hash,
        }
    }

    fn sign<H: borsh::BorshSerialize>(&self, signed_header: &H) -> SenderSignature {
        SenderSignature {
            member: self.key_manager.my_id(),
            signature: self.key_manager.sign(&canonical_bytes(signed_header)),
        }
    }
}
