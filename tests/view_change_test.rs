/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests of the view change protocol from the point of view of a single replica out of four. Member
//! `i` leads view `i`.

mod common;

use common::{
    builders::{prepared_proof, TERM},
    harness::Harness,
    network::Destination,
};
use pbft_rs::{
    events::{Event, RejectReason},
    messages::{MessageKind, NewView, PbftMessage, PreparedProof, ViewChange},
    types::{basic::ViewNumber, block::Block},
};

const V0: ViewNumber = ViewNumber::new(0);
const V1: ViewNumber = ViewNumber::new(1);
const V2: ViewNumber = ViewNumber::new(2);
const V3: ViewNumber = ViewNumber::new(3);

fn only_new_view(sent: Vec<(Destination, PbftMessage)>) -> NewView {
    assert_eq!(sent.len(), 1);
    match sent.into_iter().next() {
        Some((Destination::Broadcast, PbftMessage::NewView(new_view))) => new_view,
        _ => panic!("expected a single broadcast new view"),
    }
}

/// View changes to `view` from each of `members`, none of them prepared on anything.
fn empty_view_changes(h: &Harness, view: ViewNumber, members: &[usize]) -> Vec<ViewChange> {
    members
        .iter()
        .map(|&member| h.peer(member).create_view_change(TERM, view, PreparedProof::empty()))
        .collect()
}

#[test]
fn timeout_sends_a_view_change_to_the_next_leader_only() {
    let mut h = Harness::new(4, 2);
    h.time_out();

    assert_eq!(h.current_view(), V1);
    assert_eq!(h.trigger.started(), vec![V0, V1]);

    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    let (destination, PbftMessage::ViewChange(view_change)) = &sent[0] else {
        panic!("expected a view change")
    };
    assert_eq!(*destination, Destination::Peer(h.id(1)));
    assert_eq!(view_change.signed_header.view, V1);
    assert!(view_change.signed_header.prepared_proof.is_empty());
}

#[test]
fn view_change_carries_the_latest_prepared_proof() {
    let mut h = Harness::new(4, 2);
    let block = h.block(1);
    h.deliver(h.peer(0).create_pre_prepare(TERM, V0, block.clone()));
    h.deliver(h.peer(3).create_prepare(TERM, V0, block.hash));
    h.take_sent();

    h.time_out();
    let sent = h.take_sent();
    let (_, PbftMessage::ViewChange(view_change)) = &sent[0] else {
        panic!("expected a view change")
    };
    let proof = &view_change.signed_header.prepared_proof;
    assert_eq!(proof.view(), Some(V0));
    assert_eq!(proof.block(), Some(&block));
    assert_eq!(proof.prepares.as_ref().map(Vec::len), Some(2));
}

/// Record a pre-prepare for view 3 (led by member 3) that `voters` have already prepared on, while
/// the harness replica is still in view 0.
fn prepare_ahead_in_view_3(h: &mut Harness, voters: [usize; 2]) -> Block {
    let ahead = h.block(3);
    h.deliver(h.peer(3).create_pre_prepare(TERM, V3, ahead.clone()));
    for member in voters {
        h.deliver(h.peer(member).create_prepare(TERM, V3, ahead.hash));
    }
    h.take_sent();
    ahead
}

#[test]
fn view_change_leaves_out_proofs_from_views_it_has_not_reached() {
    let mut h = Harness::new(4, 2);
    prepare_ahead_in_view_3(&mut h, [0, 1]);

    h.time_out();
    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    let (destination, PbftMessage::ViewChange(view_change)) = &sent[0] else {
        panic!("expected a view change")
    };
    assert_eq!(*destination, Destination::Peer(h.id(1)));
    assert_eq!(view_change.signed_header.view, V1);
    assert!(view_change.signed_header.prepared_proof.is_empty());
}

#[test]
fn next_leader_does_not_repropose_a_block_from_a_later_view() {
    let mut h = Harness::new(4, 1);
    let ahead = prepare_ahead_in_view_3(&mut h, [0, 2]);

    h.time_out();
    assert!(h.take_sent().is_empty());
    for view_change in empty_view_changes(&h, V1, &[2, 3]) {
        h.deliver(view_change);
    }

    let new_view = only_new_view(h.take_sent());
    assert_eq!(new_view.signed_header.view, V1);
    assert_ne!(new_view.pre_prepare.block.hash, ahead.hash);
    assert_eq!(h.app.produced_count(), 1);
    assert!(new_view
        .signed_header
        .view_change_confirmations
        .iter()
        .all(|confirmation| confirmation.signed_header.prepared_proof.is_empty()));
    assert!(h.rejections().is_empty());
}

#[test]
fn next_leader_is_elected_by_a_quorum_of_view_changes() {
    let mut h = Harness::new(4, 1);
    h.time_out();
    // The next leader keeps its own view change.
    assert!(h.take_sent().is_empty());

    h.deliver(h.peer(2).create_view_change(TERM, V1, PreparedProof::empty()));
    assert!(h.take_sent().is_empty());
    h.deliver(h.peer(3).create_view_change(TERM, V1, PreparedProof::empty()));

    let new_view = only_new_view(h.take_sent());
    assert_eq!(new_view.signed_header.view, V1);
    assert_eq!(new_view.signed_header.view_change_confirmations.len(), 3);
    assert_eq!(new_view.pre_prepare.signed_header.view, V1);
    assert_eq!(new_view.pre_prepare.block.height, TERM);
    assert_eq!(h.app.produced_count(), 1);
    assert!(h.pbft.is_leader());

    let elected = h
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, Event::Elected(_)))
        .count();
    assert_eq!(elected, 1);

    // Late view changes do not cause a second election.
    h.deliver(h.peer(0).create_view_change(TERM, V1, PreparedProof::empty()));
    assert!(h.take_sent().is_empty());

    // The new view's pre-prepare is voted on as usual.
    let block_hash = new_view.pre_prepare.block.hash;
    h.deliver(h.peer(2).create_prepare(TERM, V1, block_hash));
    h.deliver(h.peer(3).create_prepare(TERM, V1, block_hash));
    assert_eq!(
        h.take_sent().iter().map(|(_, msg)| msg.kind()).collect::<Vec<_>>(),
        vec![MessageKind::Commit; 3]
    );
}

#[test]
fn new_leader_reproposes_the_block_of_the_highest_prepared_proof() {
    let mut h = Harness::new(4, 2);
    let older = h.block(1);
    let newer = h.block(2);
    let older_proof = prepared_proof(h.peer(0), &[h.peer(1), h.peer(3)], TERM, V0, &older);
    let newer_proof = prepared_proof(h.peer(1), &[h.peer(0), h.peer(3)], TERM, V1, &newer);

    h.time_out();
    h.time_out();
    assert_eq!(h.current_view(), V2);
    h.take_sent();

    h.deliver(h.peer(0).create_view_change(TERM, V2, older_proof));
    h.deliver(h.peer(3).create_view_change(TERM, V2, newer_proof));
    assert!(h.rejections().is_empty());

    let new_view = only_new_view(h.take_sent());
    assert_eq!(new_view.pre_prepare.block, newer);
    assert_eq!(h.app.produced_count(), 0);
}

#[test]
fn view_changes_with_invalid_proofs_are_rejected() {
    let mut h = Harness::new(4, 1);
    let block = h.block(1);
    h.time_out();

    // One prepare is short of 2f.
    let short = prepared_proof(h.peer(0), &[h.peer(2)], TERM, V0, &block);
    h.deliver(h.peer(2).create_view_change(TERM, V1, short));

    // A prepare from the proof's own leader does not count.
    let with_leader = prepared_proof(h.peer(0), &[h.peer(0), h.peer(2)], TERM, V0, &block);
    h.deliver(h.peer(2).create_view_change(TERM, V1, with_leader));

    // A proof must be from an earlier view than the one asked for.
    let too_late = prepared_proof(h.peer(1), &[h.peer(2), h.peer(3)], TERM, V1, &block);
    h.deliver(h.peer(3).create_view_change(TERM, V1, too_late));

    assert_eq!(
        h.rejections(),
        vec![
            RejectReason::InvalidProof,
            RejectReason::InvalidProof,
            RejectReason::InvalidProof
        ]
    );
    assert!(h.take_sent().is_empty());
}

#[test]
fn view_changes_addressed_to_someone_else_are_rejected() {
    let mut h = Harness::new(4, 2);
    h.deliver(h.peer(3).create_view_change(TERM, V1, PreparedProof::empty()));
    assert_eq!(h.rejections(), vec![RejectReason::NotLeader]);
}

#[test]
fn new_view_is_adopted_once_its_pre_prepare_is_validated() {
    let mut h = Harness::new(4, 2);
    h.time_out();
    h.take_sent();

    let block = h.block(1);
    let confirmations = empty_view_changes(&h, V1, &[0, 2, 3]);
    let pre_prepare = h.peer(1).create_pre_prepare(TERM, V1, block.clone());
    h.deliver(h.peer(1).create_new_view(TERM, V1, confirmations, pre_prepare));

    assert!(h.rejections().is_empty());
    assert_eq!(h.current_view(), V1);
    let sent = h.take_sent();
    assert_eq!(sent.len(), 3);
    for (_, msg) in &sent {
        assert_eq!(msg.kind(), MessageKind::Prepare);
        assert_eq!(msg.view(), V1);
    }

    // A second new view for the same view is redundant.
    let confirmations = empty_view_changes(&h, V1, &[0, 2, 3]);
    let pre_prepare = h.peer(1).create_pre_prepare(TERM, V1, block);
    h.deliver(h.peer(1).create_new_view(TERM, V1, confirmations, pre_prepare));
    assert_eq!(h.rejections(), vec![RejectReason::ViewAlreadyEstablished]);
}

#[test]
fn new_view_can_skip_ahead_of_the_local_view() {
    let mut h = Harness::new(4, 3);

    let confirmations = empty_view_changes(&h, V2, &[0, 1, 2]);
    let pre_prepare = h.peer(2).create_pre_prepare(TERM, V2, h.block(1));
    h.deliver(h.peer(2).create_new_view(TERM, V2, confirmations, pre_prepare));

    assert!(h.rejections().is_empty());
    assert_eq!(h.current_view(), V2);
    assert_eq!(h.trigger.started(), vec![V0, V2]);
}

#[test]
fn new_views_with_unsound_justifications_are_rejected() {
    let mut h = Harness::new(4, 2);
    h.time_out();
    let block = h.block(1);
    let pre_prepare = h.peer(1).create_pre_prepare(TERM, V1, block.clone());

    // Too few confirmations.
    let too_few = empty_view_changes(&h, V1, &[0, 3]);
    h.deliver(h.peer(1).create_new_view(TERM, V1, too_few, pre_prepare.clone()));

    // Enough confirmations, but not from distinct members.
    let duplicated = empty_view_changes(&h, V1, &[0, 3, 3]);
    h.deliver(h.peer(1).create_new_view(TERM, V1, duplicated, pre_prepare.clone()));

    // Confirmations asking for another view.
    let wrong_view = empty_view_changes(&h, V2, &[0, 2, 3]);
    h.deliver(h.peer(1).create_new_view(TERM, V1, wrong_view, pre_prepare.clone()));

    // A confirmation carrying an invalid proof.
    let mut with_bad_proof = empty_view_changes(&h, V1, &[0, 2]);
    let short = prepared_proof(h.peer(0), &[h.peer(3)], TERM, V0, &block);
    with_bad_proof.push(h.peer(3).create_view_change(TERM, V1, short));
    h.deliver(h.peer(1).create_new_view(TERM, V1, with_bad_proof, pre_prepare.clone()));

    // A confirmation whose signature does not verify.
    let mut forged = empty_view_changes(&h, V1, &[0, 2, 3]);
    forged[2].sender.signature = forged[1].sender.signature;
    h.deliver(h.peer(1).create_new_view(TERM, V1, forged, pre_prepare.clone()));

    // A pre-prepare for another view.
    let confirmations = empty_view_changes(&h, V1, &[0, 2, 3]);
    let stale_pre_prepare = h.peer(1).create_pre_prepare(TERM, V0, block.clone());
    h.deliver(h.peer(1).create_new_view(TERM, V1, confirmations.clone(), stale_pre_prepare));

    // Sent by someone who does not lead the view.
    let pre_prepare_by_other = h.peer(3).create_pre_prepare(TERM, V1, block);
    h.deliver(h.peer(3).create_new_view(TERM, V1, confirmations, pre_prepare_by_other));

    assert_eq!(
        h.rejections(),
        vec![
            RejectReason::InvalidConfirmations,
            RejectReason::InvalidConfirmations,
            RejectReason::InvalidConfirmations,
            RejectReason::InvalidProof,
            RejectReason::BadSignature,
            RejectReason::PrePrepareMismatch,
            RejectReason::NotLeader
        ]
    );
    assert_eq!(h.current_view(), V1);
    assert!(h.app.validated().is_empty());
}

#[test]
fn new_view_that_ignores_the_highest_prepared_proof_is_rejected() {
    let mut h = Harness::new(4, 2);
    h.time_out();
    let prepared = h.block(1);
    let other = h.block(2);

    let mut confirmations = empty_view_changes(&h, V1, &[2, 3]);
    let proof = prepared_proof(h.peer(0), &[h.peer(2), h.peer(3)], TERM, V0, &prepared);
    confirmations.push(h.peer(0).create_view_change(TERM, V1, proof));

    let pre_prepare = h.peer(1).create_pre_prepare(TERM, V1, other);
    h.deliver(h.peer(1).create_new_view(TERM, V1, confirmations.clone(), pre_prepare));
    assert_eq!(h.rejections(), vec![RejectReason::IgnoresPreparedProof]);

    let pre_prepare = h.peer(1).create_pre_prepare(TERM, V1, prepared.clone());
    h.deliver(h.peer(1).create_new_view(TERM, V1, confirmations, pre_prepare));
    assert!(h.rejections().is_empty());
    assert_eq!(h.app.validated(), vec![prepared.hash]);
}

#[test]
fn buffered_pre_prepare_for_a_future_view_waits_for_the_new_view() {
    let mut h = Harness::new(4, 3);
    let block = h.block(1);
    let pre_prepare = h.peer(1).create_pre_prepare(TERM, V1, block.clone());

    h.deliver(pre_prepare.clone());
    assert!(h.rejections().is_empty());
    assert!(h.app.validated().is_empty());
    assert!(h.take_sent().is_empty());

    let confirmations = empty_view_changes(&h, V1, &[0, 2, 3]);
    h.deliver(h.peer(1).create_new_view(TERM, V1, confirmations, pre_prepare));
    assert_eq!(h.app.validated(), vec![block.hash]);
    assert_eq!(h.current_view(), V1);
    assert_eq!(h.take_sent().len(), 3);
}

#[test]
fn equivocating_leader_cannot_get_its_other_block_finalized() {
    // The leader of view 0 sent one block to us and another to everyone else.
    let mut h = Harness::new(4, 1);
    let ours = h.block(1);
    let theirs = h.block(2);
    h.deliver(h.peer(0).create_pre_prepare(TERM, V0, ours));
    h.take_sent();

    for member in [2, 3] {
        h.deliver(h.peer(member).create_prepare(TERM, V0, theirs.hash));
    }
    for member in [0, 2, 3] {
        h.deliver(h.peer(member).create_commit(TERM, V0, theirs.hash));
    }
    assert!(h.finalized().is_empty());
    assert!(h.take_sent().is_empty());

    // We never got prepared, so we ask for a view change with an empty proof.
    h.time_out();
    let sent = h.take_sent();
    assert!(sent.is_empty(), "member 1 leads view 1 and keeps its own view change");
    h.deliver(h.peer(2).create_view_change(TERM, V1, PreparedProof::empty()));
    h.deliver(h.peer(3).create_view_change(TERM, V1, PreparedProof::empty()));

    let new_view = only_new_view(h.take_sent());
    assert_ne!(new_view.pre_prepare.block.hash, theirs.hash);
}
