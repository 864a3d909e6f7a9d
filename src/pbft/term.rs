/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state machine that agrees on the block at a single height.
//!
//! A [`ConsensusTerm`] is created for a height (its *term*) and lives until a block is finalized for
//! that height, or until it is disposed. It starts in view 0 and only ever moves to higher views.
//!
//! ## Normal case
//!
//! 1. The leader of the view multicasts a [`PrePrepare`] carrying its proposed block.
//! 2. Every other member checks the pre-prepare, claims the view's pre-prepare slot for it, and asks
//!    the [`App`] to validate the block. Once the app accepts it, the member multicasts a [`Prepare`].
//! 3. A member that has a validated pre-prepare and `2f` matching prepares from members other than the
//!    leader is *prepared*, and multicasts a [`Commit`].
//! 4. A member that has a validated pre-prepare and `2f + 1` matching commits *finalizes* the block.
//!
//! ## View change
//!
//! When the [`ElectionTrigger`] fires, the member moves to the next view and sends a [`ViewChange`],
//! carrying the best [`PreparedProof`] it has, to that view's leader only. A leader that collects view
//! changes from `2f + 1` distinct members is elected: it re-proposes the block of the highest-viewed
//! prepared proof among them (or a fresh block if none of them is prepared on anything) and broadcasts
//! a [`NewView`] that carries the view changes as justification. Members accept the new view only if
//! the justification is sound and the leader honored the highest prepared proof in it.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::app::{
    App, PendingValidationKey, ProduceBlockRequest, ValidateBlockRequest, ValidationOutcome,
    ValidationResponder,
};
use crate::election_trigger::ElectionTrigger;
use crate::events::*;
use crate::message_factory::MessageFactory;
use crate::message_router::PbftMessagesHandler;
use crate::messages::*;
use crate::networking::{Network, SenderHandle};
use crate::proofs_validator::validate_prepared_proof;
use crate::quorum_store::QuorumStore;
use crate::types::{
    basic::{BlockHeight, CryptoHash, MemberId, ViewNumber},
    block::Block,
    members::Members,
};

use super::roles;

/// Everything a [`ConsensusTerm`] needs that outlives it. The driver keeps one and clones it into
/// every term it creates.
#[derive(Clone)]
pub(crate) struct TermConfig<N: Network, T: ElectionTrigger + Clone> {
    pub(crate) members: Members,
    pub(crate) factory: MessageFactory,
    pub(crate) network: N,
    pub(crate) election_trigger: T,
    pub(crate) validation_outcomes: Sender<ValidationOutcome>,
    pub(crate) event_publisher: Option<Sender<Event>>,
}

/// What a pending validation was requested for. Decides what happens when the verdict arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValidationSource {
    /// A pre-prepare for the current view.
    PrePrepare,
    /// The pre-prepare attached to a new view that has not been adopted yet.
    NewView,
}

/// Outcome of trying to store a pre-prepare in the view's single slot.
enum Slot {
    Claimed,
    AlreadyHeld,
    Equivocation,
}

pub struct ConsensusTerm<N: Network, T: ElectionTrigger> {
    term: BlockHeight,
    view: ViewNumber,
    // Whether the current view was entered with a leader in place (view 0, or through a new view),
    // as opposed to by timing out of the previous view.
    view_established: bool,
    last_committed_hash: CryptoHash,
    me: MemberId,
    members: Members,
    store: QuorumStore,
    factory: MessageFactory,
    sender: SenderHandle<N>,
    election_trigger: T,
    validated_views: HashSet<ViewNumber>,
    prepared_views: HashSet<ViewNumber>,
    elected_views: HashSet<ViewNumber>,
    pending_validations: HashMap<PendingValidationKey, ValidationSource>,
    validation_outcomes: Sender<ValidationOutcome>,
    finalized: Option<Block>,
    disposed: bool,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network, T: ElectionTrigger + Clone> ConsensusTerm<N, T> {
    pub(crate) fn new(
        term: BlockHeight,
        last_committed_hash: CryptoHash,
        config: TermConfig<N, T>,
    ) -> Self {
        Self {
            term,
            view: ViewNumber::init(),
            view_established: true,
            last_committed_hash,
            me: config.factory.my_id(),
            members: config.members,
            store: QuorumStore::new(config.event_publisher.clone()),
            factory: config.factory,
            sender: SenderHandle::new(config.network),
            election_trigger: config.election_trigger,
            validated_views: HashSet::new(),
            prepared_views: HashSet::new(),
            elected_views: HashSet::new(),
            pending_validations: HashMap::new(),
            validation_outcomes: config.validation_outcomes,
            finalized: None,
            disposed: false,
            event_publisher: config.event_publisher,
        }
    }
}

impl<N: Network, T: ElectionTrigger> ConsensusTerm<N, T> {
    /// Enter view 0 and, if the local replica leads it, propose a fresh block.
    pub(crate) fn start(&mut self, app: &mut impl App) {
        if self.disposed {
            return;
        }
        self.enter_view(ViewNumber::init(), true);
        if self.is_leader() {
            let block = self.produce_block(self.view, app);
            self.propose(block);
        }
    }

    pub fn term(&self) -> BlockHeight {
        self.term
    }

    pub fn view(&self) -> ViewNumber {
        self.view
    }

    /// Whether the local replica leads the current view.
    pub fn is_leader(&self) -> bool {
        roles::is_leader(&self.me, self.view, &self.members)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Take the block finalized by this term, if any. Returns `Some` at most once.
    pub(crate) fn take_finalized(&mut self) -> Option<Block> {
        self.finalized.take()
    }

    /// Propose `block` for the current view. Only has an effect if the local replica leads the current
    /// view, has not proposed in it yet, and `block` extends the last finalized block at the right
    /// height. Returns whether the block was proposed.
    pub fn suggest_block(&mut self, block: Block) -> bool {
        if self.disposed
            || !self.is_leader()
            || !self.view_established
            || self.store.pre_prepare(self.term, self.view).is_some()
        {
            return false;
        }
        if !block.is_correct()
            || block.height != self.term
            || block.previous_hash != self.last_committed_hash
        {
            return false;
        }
        self.propose(block);
        true
    }

    /// Discard everything stored for this term and stop the election trigger. Calling it again does
    /// nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.election_trigger.stop();
        self.pending_validations.clear();
        self.store.clear_term(self.term);
    }

    /// Move to the next view if the election trigger has fired.
    pub(crate) fn poll_election_trigger(&mut self, app: &mut impl App) {
        if !self.disposed && self.election_trigger.has_timed_out() {
            self.on_election_timeout(app);
        }
    }

    pub fn on_receive_pre_prepare(&mut self, msg: PrePrepare, app: &mut impl App) {
        if self.disposed {
            return;
        }
        let header = msg.signed_header;
        if let Some(reason) = self.pre_prepare_rejection(&msg) {
            self.reject(
                MessageKind::PrePrepare,
                header.term,
                header.view,
                msg.sender.member,
                reason,
            );
            return;
        }

        let sender = msg.sender.member;
        let block = msg.block.clone();
        match self.claim_slot(msg) {
            Slot::Claimed => (),
            Slot::AlreadyHeld => return,
            Slot::Equivocation => {
                self.reject(
                    MessageKind::PrePrepare,
                    header.term,
                    header.view,
                    sender,
                    RejectReason::Equivocation,
                );
                return;
            }
        }

        // Pre-prepares for views the replica has not entered yet, or has entered without a leader in
        // place, are only recorded. They are acted upon when the view is entered through a new view.
        if header.view > self.view || !self.view_established {
            return;
        }
        self.request_validation(block, header.view, ValidationSource::PrePrepare, app);
    }

    pub fn on_receive_prepare(&mut self, msg: Prepare) {
        if self.disposed {
            return;
        }
        let header = msg.signed_header;
        let sender = msg.sender.member;
        let rejection = if sender == self.me {
            Some(RejectReason::SelfOriginated)
        } else if header.term != self.term {
            Some(RejectReason::WrongTerm)
        } else if roles::is_leader(&sender, header.view, &self.members) {
            Some(RejectReason::LeaderPrepare)
        } else if header.view < self.view {
            Some(RejectReason::StaleView)
        } else if !msg.is_correct(self.factory.key_manager()) {
            Some(RejectReason::BadSignature)
        } else {
            None
        };
        if let Some(reason) = rejection {
            self.reject(MessageKind::Prepare, header.term, header.view, sender, reason);
            return;
        }

        if self.store.store_prepare(msg) {
            self.check_prepared(header.view, header.block_hash);
        }
    }

    pub fn on_receive_commit(&mut self, msg: Commit) {
        if self.disposed {
            return;
        }
        let header = msg.signed_header;
        let sender = msg.sender.member;
        let rejection = if sender == self.me {
            Some(RejectReason::SelfOriginated)
        } else if header.term != self.term {
            Some(RejectReason::WrongTerm)
        } else if !msg.is_correct(self.factory.key_manager()) {
            Some(RejectReason::BadSignature)
        } else {
            None
        };
        if let Some(reason) = rejection {
            self.reject(MessageKind::Commit, header.term, header.view, sender, reason);
            return;
        }

        if self.store.store_commit(msg) {
            self.check_committed(header.view, header.block_hash);
        }
    }

    pub fn on_receive_view_change(&mut self, msg: ViewChange, app: &mut impl App) {
        if self.disposed {
            return;
        }
        let term = msg.signed_header.term;
        let view = msg.signed_header.view;
        let sender = msg.sender.member;
        let rejection = if sender == self.me {
            Some(RejectReason::SelfOriginated)
        } else if term != self.term {
            Some(RejectReason::WrongTerm)
        } else if view < self.view {
            Some(RejectReason::StaleView)
        } else if !roles::is_leader(&self.me, view, &self.members) {
            Some(RejectReason::NotLeader)
        } else if !msg.is_correct(self.factory.key_manager()) {
            Some(RejectReason::BadSignature)
        } else if !self.proof_is_valid(view, &msg.signed_header.prepared_proof) {
            Some(RejectReason::InvalidProof)
        } else {
            None
        };
        if let Some(reason) = rejection {
            self.reject(MessageKind::ViewChange, term, view, sender, reason);
            return;
        }

        if self.store.store_view_change(msg) {
            self.check_elected(view, app);
        }
    }

    pub fn on_receive_new_view(&mut self, msg: NewView, app: &mut impl App) {
        if self.disposed {
            return;
        }
        let term = msg.signed_header.term;
        let view = msg.signed_header.view;
        let sender = msg.sender.member;
        if let Some(reason) = self.new_view_rejection(&msg) {
            self.reject(MessageKind::NewView, term, view, sender, reason);
            return;
        }

        let block = msg.pre_prepare.block.clone();
        if let Slot::Equivocation = self.claim_slot(msg.pre_prepare) {
            self.reject(MessageKind::NewView, term, view, sender, RejectReason::Equivocation);
            return;
        }
        self.request_validation(block, view, ValidationSource::NewView, app);
    }

    /// Act on the app's verdict on a block. Verdicts for another term, for a validation that is no
    /// longer pending, or for a view the replica has moved past are ignored.
    pub(crate) fn on_validation_outcome(&mut self, outcome: ValidationOutcome) {
        if self.disposed || outcome.key.term != self.term {
            return;
        }
        let Some(source) = self.pending_validations.remove(&outcome.key) else {
            return;
        };
        let view = outcome.key.view;

        if !outcome.valid {
            let leader = self.members.leader_for_view(view);
            self.reject(
                MessageKind::PrePrepare,
                self.term,
                view,
                leader,
                RejectReason::BlockRejected,
            );
            return;
        }

        match source {
            ValidationSource::PrePrepare => {
                if view != self.view || !self.view_established {
                    return;
                }
            }
            ValidationSource::NewView => {
                if view < self.view || (view == self.view && self.view_established) {
                    return;
                }
                self.enter_view(view, true);
            }
        }
        self.accept_pre_prepare(view, outcome.key.block_hash);
    }

    fn on_election_timeout(&mut self, app: &mut impl App) {
        Event::publish(
            &self.event_publisher,
            Event::ViewTimeout(ViewTimeoutEvent {
                timestamp: SystemTime::now(),
                term: self.term,
                view: self.view,
            }),
        );

        let leader = roles::view_change_recipient(self.view, &self.members);
        let next_view = self.view + 1;
        self.enter_view(next_view, false);

        let mut proof = self
            .store
            .latest_prepared_proof(self.term, next_view, 2 * self.members.f());
        if !self.proof_is_valid(next_view, &proof) {
            proof = PreparedProof::empty();
        }
        let view_change = self.factory.create_view_change(self.term, next_view, proof);

        if leader == self.me {
            self.store.store_view_change(view_change);
            self.check_elected(next_view, app);
        } else {
            self.sender.send(leader, view_change.clone());
            Event::publish(
                &self.event_publisher,
                Event::SendViewChange(SendViewChangeEvent {
                    timestamp: SystemTime::now(),
                    leader,
                    view_change,
                }),
            );
        }
    }

    fn pre_prepare_rejection(&self, msg: &PrePrepare) -> Option<RejectReason> {
        let header = &msg.signed_header;
        let sender = &msg.sender.member;
        if *sender == self.me {
            Some(RejectReason::SelfOriginated)
        } else if header.term != self.term {
            Some(RejectReason::WrongTerm)
        } else if header.view < self.view {
            Some(RejectReason::StaleView)
        } else if !roles::is_leader(sender, header.view, &self.members) {
            Some(RejectReason::NotLeader)
        } else if !msg.is_correct(self.factory.key_manager()) {
            Some(RejectReason::BadSignature)
        } else {
            self.block_rejection(msg)
        }
    }

    /// Check that the pre-prepared block is intact and extends the last finalized block.
    fn block_rejection(&self, msg: &PrePrepare) -> Option<RejectReason> {
        let block = &msg.block;
        if block.hash != msg.signed_header.block_hash || !block.is_correct() {
            Some(RejectReason::BadBlockHash)
        } else if block.height != self.term {
            Some(RejectReason::BadBlockHeight)
        } else if block.previous_hash != self.last_committed_hash {
            Some(RejectReason::BadPredecessor)
        } else {
            None
        }
    }

    fn new_view_rejection(&self, msg: &NewView) -> Option<RejectReason> {
        let view = msg.signed_header.view;
        let sender = &msg.sender.member;
        let pre_prepare = &msg.pre_prepare;

        if *sender == self.me {
            return Some(RejectReason::SelfOriginated);
        }
        if msg.signed_header.term != self.term {
            return Some(RejectReason::WrongTerm);
        }
        if !roles::is_leader(sender, view, &self.members) {
            return Some(RejectReason::NotLeader);
        }
        if view < self.view {
            return Some(RejectReason::StaleView);
        }
        if view == self.view && self.view_established {
            return Some(RejectReason::ViewAlreadyEstablished);
        }
        if pre_prepare.signed_header.kind != MessageKind::PrePrepare
            || pre_prepare.signed_header.term != self.term
            || pre_prepare.signed_header.view != view
            || pre_prepare.sender.member != *sender
        {
            return Some(RejectReason::PrePrepareMismatch);
        }
        if !msg.is_correct(self.factory.key_manager())
            || !pre_prepare.is_correct(self.factory.key_manager())
        {
            return Some(RejectReason::BadSignature);
        }

        let confirmations = &msg.signed_header.view_change_confirmations;
        if let Some(reason) = self.confirmations_rejection(view, confirmations) {
            return Some(reason);
        }
        if let Some(highest) = highest_prepared_proof(confirmations) {
            if highest.signed_header.block_hash != pre_prepare.signed_header.block_hash {
                return Some(RejectReason::IgnoresPreparedProof);
            }
        }

        self.block_rejection(pre_prepare)
    }

    /// Check that `confirmations` is a sound justification for moving to `view`: view changes for
    /// this term and `view` from at least `2f + 1` distinct members, each correctly signed and each
    /// carrying a valid prepared proof.
    fn confirmations_rejection(
        &self,
        view: ViewNumber,
        confirmations: &[ViewChange],
    ) -> Option<RejectReason> {
        if confirmations.len() < self.members.quorum() {
            return Some(RejectReason::InvalidConfirmations);
        }

        let mut signers = HashSet::new();
        for confirmation in confirmations {
            let header = &confirmation.signed_header;
            let signer = confirmation.sender.member;
            if header.kind != MessageKind::ViewChange
                || header.term != self.term
                || header.view != view
                || !self.members.contains(&signer)
                || !signers.insert(signer)
            {
                return Some(RejectReason::InvalidConfirmations);
            }
        }

        let key_manager = self.factory.key_manager();
        if !confirmations.iter().all(|vc| vc.is_correct(key_manager)) {
            return Some(RejectReason::BadSignature);
        }
        if !confirmations
            .iter()
            .all(|vc| self.proof_is_valid(view, &vc.signed_header.prepared_proof))
        {
            return Some(RejectReason::InvalidProof);
        }
        None
    }

    fn proof_is_valid(&self, target_view: ViewNumber, proof: &PreparedProof) -> bool {
        validate_prepared_proof(
            self.term,
            target_view,
            proof,
            self.members.f(),
            self.factory.key_manager(),
            &self.members,
            |view| self.members.leader_for_view(view),
        )
    }

    /// Store `pre_prepare` in its view's slot. The slot is claimed before the block is validated, so
    /// that a leader cannot get a second block into the same view while the first is being validated.
    fn claim_slot(&mut self, pre_prepare: PrePrepare) -> Slot {
        let header = pre_prepare.signed_header;
        if self.store.store_pre_prepare(pre_prepare) {
            return Slot::Claimed;
        }
        match self.store.pre_prepare(header.term, header.view) {
            Some(held) if held.signed_header.block_hash == header.block_hash => Slot::AlreadyHeld,
            _ => Slot::Equivocation,
        }
    }

    fn request_validation(
        &mut self,
        block: Block,
        view: ViewNumber,
        source: ValidationSource,
        app: &mut impl App,
    ) {
        let key = PendingValidationKey {
            term: self.term,
            view,
            block_hash: block.hash,
        };
        if self.validated_views.contains(&view) || self.pending_validations.contains_key(&key) {
            return;
        }
        self.pending_validations.insert(key, source);

        let responder = ValidationResponder::new(key, self.validation_outcomes.clone());
        app.validate_block(ValidateBlockRequest::new(block, responder));
    }

    /// The pre-prepare for `view` passed validation: vote for it.
    fn accept_pre_prepare(&mut self, view: ViewNumber, block_hash: CryptoHash) {
        self.validated_views.insert(view);
        self.election_trigger.snooze();

        if roles::is_preparer(&self.me, view, &self.members) {
            let prepare = self.factory.create_prepare(self.term, view, block_hash);
            self.store.store_prepare(prepare.clone());
            self.sender.multicast(&self.members.others(&self.me), prepare.clone());
            Event::publish(
                &self.event_publisher,
                Event::SendPrepare(SendPrepareEvent {
                    timestamp: SystemTime::now(),
                    prepare,
                }),
            );
        }

        self.check_prepared(view, block_hash);
        self.check_committed(view, block_hash);
    }

    /// Whether the pre-prepare stored for `view` is for `block_hash` and passed validation.
    fn is_validated(&self, view: ViewNumber, block_hash: CryptoHash) -> bool {
        self.validated_views.contains(&view)
            && self
                .store
                .pre_prepare(self.term, view)
                .is_some_and(|pp| pp.signed_header.block_hash == block_hash)
    }

    fn check_prepared(&mut self, view: ViewNumber, block_hash: CryptoHash) {
        if self.disposed
            || self.prepared_views.contains(&view)
            || !self.is_validated(view, block_hash)
        {
            return;
        }

        let leader = self.members.leader_for_view(view);
        let prepares = self
            .store
            .prepare_signers(self.term, view, block_hash)
            .into_iter()
            .filter(|signer| *signer != leader)
            .count();
        if prepares < 2 * self.members.f() {
            return;
        }

        self.prepared_views.insert(view);
        Event::publish(
            &self.event_publisher,
            Event::Prepared(PreparedEvent {
                timestamp: SystemTime::now(),
                term: self.term,
                view,
                block_hash,
            }),
        );

        let commit = self.factory.create_commit(self.term, view, block_hash);
        self.store.store_commit(commit.clone());
        self.sender.multicast(&self.members.others(&self.me), commit.clone());
        Event::publish(
            &self.event_publisher,
            Event::SendCommit(SendCommitEvent {
                timestamp: SystemTime::now(),
                commit,
            }),
        );

        self.check_committed(view, block_hash);
    }

    fn check_committed(&mut self, view: ViewNumber, block_hash: CryptoHash) {
        if self.disposed || !self.is_validated(view, block_hash) {
            return;
        }
        if self.store.commit_signers(self.term, view, block_hash).len() < self.members.quorum() {
            return;
        }
        let Some(block) = self.store.pre_prepared_block(self.term, view).cloned() else {
            return;
        };

        Event::publish(
            &self.event_publisher,
            Event::FinalizeBlock(FinalizeBlockEvent {
                timestamp: SystemTime::now(),
                view,
                block: block.clone(),
            }),
        );
        self.finalized = Some(block);
        self.dispose();
    }

    /// Become leader of `view` if a quorum of view changes asking for it has been collected.
    fn check_elected(&mut self, view: ViewNumber, app: &mut impl App) {
        if self.disposed
            || view < self.view
            || self.elected_views.contains(&view)
            || self.store.count_view_changes(self.term, view) < self.members.quorum()
        {
            return;
        }
        self.elected_views.insert(view);

        let confirmations = self.store.view_changes(self.term, view).to_vec();
        let block = match highest_prepared_proof(&confirmations) {
            Some(pre_prepare) => pre_prepare.block.clone(),
            None => self.produce_block(view, app),
        };

        self.enter_view(view, true);
        Event::publish(
            &self.event_publisher,
            Event::Elected(ElectedEvent {
                timestamp: SystemTime::now(),
                term: self.term,
                view,
            }),
        );

        let pre_prepare = self.factory.create_pre_prepare(self.term, view, block.clone());
        let block_hash = block.hash;
        // Only the leader of a view can fill its slot, and the router never lets our own messages
        // back in, so the slot is free.
        self.store.store_pre_prepare(pre_prepare.clone());
        self.validated_views.insert(view);

        let confirmation_count = confirmations.len();
        let new_view = self
            .factory
            .create_new_view(self.term, view, confirmations, pre_prepare);
        self.sender.broadcast(new_view);
        Event::publish(
            &self.event_publisher,
            Event::SendNewView(SendNewViewEvent {
                timestamp: SystemTime::now(),
                term: self.term,
                view,
                block_hash,
                confirmations: confirmation_count,
            }),
        );
        Event::publish(
            &self.event_publisher,
            Event::Propose(ProposeEvent {
                timestamp: SystemTime::now(),
                term: self.term,
                view,
                block,
            }),
        );

        self.check_prepared(view, block_hash);
        self.check_committed(view, block_hash);
    }

    fn propose(&mut self, block: Block) {
        let view = self.view;
        let block_hash = block.hash;
        let pre_prepare = self.factory.create_pre_prepare(self.term, view, block.clone());
        self.store.store_pre_prepare(pre_prepare.clone());
        self.validated_views.insert(view);

        self.sender.multicast(&self.members.others(&self.me), pre_prepare);
        Event::publish(
            &self.event_publisher,
            Event::Propose(ProposeEvent {
                timestamp: SystemTime::now(),
                term: self.term,
                view,
                block,
            }),
        );

        self.check_prepared(view, block_hash);
        self.check_committed(view, block_hash);
    }

    fn produce_block(&self, view: ViewNumber, app: &mut impl App) -> Block {
        let request = ProduceBlockRequest::new(self.term, view, self.last_committed_hash);
        let response = app.produce_block(request);
        Block::new(self.term, self.last_committed_hash, response.data)
    }

    fn enter_view(&mut self, view: ViewNumber, established: bool) {
        self.view = view;
        self.view_established = established;
        self.election_trigger.start(view);
        Event::publish(
            &self.event_publisher,
            Event::EnterView(EnterViewEvent {
                timestamp: SystemTime::now(),
                term: self.term,
                view,
                leader: self.members.leader_for_view(view),
            }),
        );
    }

    fn reject(
        &self,
        kind: MessageKind,
        term: BlockHeight,
        view: ViewNumber,
        sender: MemberId,
        reason: RejectReason,
    ) {
        Event::publish(
            &self.event_publisher,
            Event::RejectMessage(RejectMessageEvent {
                timestamp: SystemTime::now(),
                kind,
                term,
                view,
                sender,
                reason,
            }),
        );
    }
}

/// Among `confirmations`, find the pre-prepare of the prepared proof with the highest view.
pub(crate) fn highest_prepared_proof(confirmations: &[ViewChange]) -> Option<&PrePrepare> {
    confirmations
        .iter()
        .filter_map(|vc| vc.signed_header.prepared_proof.pre_prepare.as_ref())
        .max_by_key(|pre_prepare| pre_prepare.signed_header.view)
}

/// Adapts a [`ConsensusTerm`] and the [`App`] it calls into to a [`PbftMessagesHandler`], so that a
/// [`MessageRouter`](crate::message_router::MessageRouter) can dispatch to it.
pub(crate) struct TermHandler<'a, N: Network, T: ElectionTrigger, A: App> {
    pub(crate) term: &'a mut ConsensusTerm<N, T>,
    pub(crate) app: &'a mut A,
}

impl<'a, N: Network, T: ElectionTrigger, A: App> PbftMessagesHandler for TermHandler<'a, N, T, A> {
    fn on_receive_pre_prepare(&mut self, msg: PrePrepare) {
        self.term.on_receive_pre_prepare(msg, &mut *self.app)
    }

    fn on_receive_prepare(&mut self, msg: Prepare) {
        self.term.on_receive_prepare(msg)
    }

    fn on_receive_commit(&mut self, msg: Commit) {
        self.term.on_receive_commit(msg)
    }

    fn on_receive_view_change(&mut self, msg: ViewChange) {
        self.term.on_receive_view_change(msg, &mut *self.app)
    }

    fn on_receive_new_view(&mut self, msg: NewView) {
        self.term.on_receive_new_view(msg, &mut *self.app)
    }
}
