/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use pbft_rs::{
    message_factory::MessageFactory,
    messages::PreparedProof,
    types::{
        basic::{BlockHeight, Data, Datum, MemberId, ViewNumber},
        block::Block,
        crypto_primitives::Ed25519KeyManager,
    },
};
use rand_core::OsRng;

/// The term every test starts in: the height right after genesis.
pub(crate) const TERM: BlockHeight = BlockHeight::new(1);

pub(crate) fn signing_keys(n: usize) -> Vec<SigningKey> {
    let mut csprg = OsRng {};
    (0..n).map(|_| SigningKey::generate(&mut csprg)).collect()
}

pub(crate) fn member_id(key: &SigningKey) -> MemberId {
    MemberId::from(key.verifying_key())
}

pub(crate) fn factory(key: &SigningKey) -> MessageFactory {
    MessageFactory::new(Arc::new(Ed25519KeyManager::new(key.clone())))
}

/// A block extending `parent` whose only datum is `tag`.
pub(crate) fn child_of(parent: &Block, tag: u8) -> Block {
    Block::new(parent.height + 1, parent.hash, Data::new(vec![Datum::new(vec![tag])]))
}

/// A prepared proof for `block` in `view`: the leader's pre-prepare and a prepare from every one of
/// `preparers`.
pub(crate) fn prepared_proof(
    leader: &MessageFactory,
    preparers: &[&MessageFactory],
    term: BlockHeight,
    view: ViewNumber,
    block: &Block,
) -> PreparedProof {
    let pre_prepare = leader.create_pre_prepare(term, view, block.clone());
    let prepares = preparers
        .iter()
        .map(|preparer| preparer.create_prepare(term, view, block.hash))
        .collect();
    PreparedProof::new(pre_prepare, prepares)
}
