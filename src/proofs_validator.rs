/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Validation of [prepared proofs](PreparedProof).
//!
//! A prepared proof is only ever received embedded in a [`ViewChange`](crate::messages::ViewChange),
//! possibly itself embedded in a [`NewView`](crate::messages::NewView). Both functions in this module
//! are pure: they look only at the proof and the arguments they are given.

use crate::messages::{MessageKind, PreparedProof, SignedMessage};
use crate::types::{
    basic::{BlockHeight, MemberId, ViewNumber},
    crypto_primitives::KeyManager,
    members::Members,
};

/// Check that `proof` proves that its pre-prepare was prepared.
///
/// The rules are applied in order, and the first one that fails decides the result:
/// 1. A proof with neither a pre-prepare nor prepares is valid. It proves nothing.
/// 2. A proof with only one of the two is invalid.
/// 3. There must be at least `2f` prepares.
/// 4. The pre-prepare must be signed by the leader of its view, and its signature must verify.
/// 5. The prepare signers must be pairwise distinct members, none of them the leader.
/// 6. Every prepare's signature must verify.
/// 7. Every prepare must be for the pre-prepare's term, view, and block hash.
/// 8. The pre-prepared block must hash to the claimed block hash.
pub fn validate_prepared(
    proof: &PreparedProof,
    f: usize,
    key_manager: &dyn KeyManager,
    members: &Members,
    leader_for_view: impl Fn(ViewNumber) -> MemberId,
) -> bool {
    let (pre_prepare, prepares) = match (&proof.pre_prepare, &proof.prepares) {
        (None, None) => return true,
        (Some(pre_prepare), Some(prepares)) => (pre_prepare, prepares),
        _ => return false,
    };

    if prepares.len() < 2 * f {
        return false;
    }

    let header = &pre_prepare.signed_header;
    let leader = pre_prepare.sender.member;
    if header.kind != MessageKind::PrePrepare
        || leader != leader_for_view(header.view)
        || !pre_prepare.is_correct(key_manager)
    {
        return false;
    }

    let mut signers: Vec<MemberId> = Vec::with_capacity(prepares.len());
    for prepare in prepares {
        let signer = prepare.sender.member;
        if signer == leader || !members.contains(&signer) || signers.contains(&signer) {
            return false;
        }
        signers.push(signer);
    }

    if !prepares.iter().all(|prepare| prepare.is_correct(key_manager)) {
        return false;
    }

    let matches_pre_prepare = prepares.iter().all(|prepare| {
        let vote = &prepare.signed_header;
        vote.kind == MessageKind::Prepare
            && vote.term == header.term
            && vote.view == header.view
            && vote.block_hash == header.block_hash
    });
    if !matches_pre_prepare {
        return false;
    }

    pre_prepare.block.content_hash() == header.block_hash
}

/// Check a prepared proof carried by a view change that asks to move to `target_view` in
/// `target_term`.
///
/// On top of [`validate_prepared`], a non-empty proof must be from an earlier view than the one being
/// asked for, and from the same term.
pub fn validate_prepared_proof(
    target_term: BlockHeight,
    target_view: ViewNumber,
    proof: &PreparedProof,
    f: usize,
    key_manager: &dyn KeyManager,
    members: &Members,
    leader_for_view: impl Fn(ViewNumber) -> MemberId,
) -> bool {
    if !validate_prepared(proof, f, key_manager, members, leader_for_view) {
        return false;
    }

    match &proof.pre_prepare {
        Some(pre_prepare) => {
            pre_prepare.signed_header.view < target_view
                && pre_prepare.signed_header.term == target_term
        }
        None => true,
    }
}
