/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Gate between the transport and the active consensus term.
//!
//! Every inbound [`PbftMessage`] goes through [`MessageRouter::route`], which drops it if:
//! 1. It was signed by the local replica (e.g., echoed back by a gossip layer),
//! 2. No term is active, or it is about a different term than the active one, or
//! 3. Its signer is not a member, or
//! 4. Its signed header claims a different message kind than the message it arrived as.
//!
//! Otherwise the message is dispatched by kind to a [`PbftMessagesHandler`]. Signatures are not
//! checked here: that is up to the handler.
//!
//! The active term is set with [`set_term`](MessageRouter::set_term), which hands back a
//! [`SubscriptionToken`]. The token is the only way to [`unsubscribe`](MessageRouter::unsubscribe),
//! so a retired term cannot accidentally unsubscribe its successor.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::events::{Event, RejectMessageEvent, RejectReason};
use crate::messages::*;
use crate::types::{
    basic::{BlockHeight, MemberId},
    members::Members,
};

/// Receiver of the protocol messages that made it through a [`MessageRouter`].
pub trait PbftMessagesHandler {
    fn on_receive_pre_prepare(&mut self, msg: PrePrepare);
    fn on_receive_prepare(&mut self, msg: Prepare);
    fn on_receive_commit(&mut self, msg: Commit);
    fn on_receive_view_change(&mut self, msg: ViewChange);
    fn on_receive_new_view(&mut self, msg: NewView);
}

/// Handle to a term subscription, returned by [`MessageRouter::set_term`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

pub struct MessageRouter {
    me: MemberId,
    members: Members,
    active: Option<(SubscriptionToken, BlockHeight)>,
    next_token: u64,
    event_publisher: Option<Sender<Event>>,
}

impl MessageRouter {
    pub fn new(
        me: MemberId,
        members: Members,
        event_publisher: Option<Sender<Event>>,
    ) -> MessageRouter {
        MessageRouter {
            me,
            members,
            active: None,
            next_token: 0,
            event_publisher,
        }
    }

    /// Make `term` the active term, replacing any previous subscription.
    pub fn set_term(&mut self, term: BlockHeight) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token);
        self.next_token += 1;
        self.active = Some((token, term));
        token
    }

    /// Remove the subscription identified by `token`. Does nothing if `token` is not the current
    /// subscription, so calling it twice is harmless.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) {
        if matches!(self.active, Some((active, _)) if active == token) {
            self.active = None;
        }
    }

    pub fn active_term(&self) -> Option<BlockHeight> {
        self.active.map(|(_, term)| term)
    }

    /// Forward `msg` to `handler` if it passes the router's checks. Returns whether it was forwarded.
    pub fn route(&self, msg: PbftMessage, handler: &mut impl PbftMessagesHandler) -> bool {
        if let Some(reason) = self.rejection(&msg) {
            Event::publish(
                &self.event_publisher,
                Event::RejectMessage(RejectMessageEvent {
                    timestamp: SystemTime::now(),
                    kind: msg.kind(),
                    term: msg.term(),
                    view: msg.view(),
                    sender: msg.sender().member,
                    reason,
                }),
            );
            return false;
        }

        match msg {
            PbftMessage::PrePrepare(msg) => handler.on_receive_pre_prepare(msg),
            PbftMessage::Prepare(msg) => handler.on_receive_prepare(msg),
            PbftMessage::Commit(msg) => handler.on_receive_commit(msg),
            PbftMessage::ViewChange(msg) => handler.on_receive_view_change(msg),
            PbftMessage::NewView(msg) => handler.on_receive_new_view(msg),
        }
        true
    }

    fn rejection(&self, msg: &PbftMessage) -> Option<RejectReason> {
        let sender = msg.sender().member;
        if sender == self.me {
            return Some(RejectReason::SelfOriginated);
        }
        if self.active_term() != Some(msg.term()) {
            return Some(RejectReason::WrongTerm);
        }
        if !self.members.contains(&sender) {
            return Some(RejectReason::UnknownMember);
        }
        if msg.header_kind() != msg.kind() {
            return Some(RejectReason::MalformedHeader);
        }
        None
    }
}
