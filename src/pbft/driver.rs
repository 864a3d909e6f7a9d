/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Term lifecycle: the [`Pbft`] driver runs one [`ConsensusTerm`] at a time and replaces it with a term
//! for the next height every time a block is finalized.
//!
//! The driver is the single entry point for everything that happens to a replica: bytes arriving from
//! the [`Network`], verdicts arriving from the [`App`]'s block validations, and the
//! [`ElectionTrigger`] firing. It is single-threaded: the caller decides when to call
//! [`tick`](Pbft::tick) (or the finer-grained entry points), and every call runs to completion.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::app::{App, ValidationOutcome};
use crate::election_trigger::ElectionTrigger;
use crate::events::Event;
use crate::message_factory::MessageFactory;
use crate::message_router::{MessageRouter, SubscriptionToken};
use crate::messages::PbftMessage;
use crate::networking::Network;
use crate::types::{
    basic::{BlockHeight, ViewNumber},
    block::Block,
    crypto_primitives::KeyManager,
    members::{ConfigurationError, Members},
};

use super::term::{ConsensusTerm, TermConfig, TermHandler};

/// Callback invoked with every finalized block, in height order.
pub type FinalizedListener = Box<dyn FnMut(&Block) + Send>;

pub struct Pbft<N: Network, A: App, T: ElectionTrigger + Clone> {
    config: TermConfig<N, T>,
    network: N,
    app: A,
    router: MessageRouter,
    term: Option<ConsensusTerm<N, T>>,
    subscription: Option<SubscriptionToken>,
    validation_outcomes: Receiver<ValidationOutcome>,
    on_finalized: Vec<FinalizedListener>,
}

impl<N: Network, A: App, T: ElectionTrigger + Clone> Pbft<N, A, T> {
    /// Create a driver for the replica identified by `key_manager`. No term runs until
    /// [`start`](Self::start) is called.
    ///
    /// Fails if the local replica is not one of `members`.
    pub fn new(
        key_manager: Arc<dyn KeyManager>,
        members: Members,
        network: N,
        app: A,
        election_trigger: T,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Self, ConfigurationError> {
        let me = key_manager.my_id();
        if !members.contains(&me) {
            return Err(ConfigurationError::NotAMember { me });
        }

        let (outcome_sender, outcome_receiver) = mpsc::channel();
        let router = MessageRouter::new(me, members.clone(), event_publisher.clone());
        let config = TermConfig {
            members,
            factory: MessageFactory::new(key_manager),
            network: network.clone(),
            election_trigger,
            validation_outcomes: outcome_sender,
            event_publisher,
        };

        Ok(Self {
            config,
            network,
            app,
            router,
            term: None,
            subscription: None,
            validation_outcomes: outcome_receiver,
            on_finalized: Vec::new(),
        })
    }

    /// Start agreeing on the block that extends `last_committed`. If the local replica leads view 0
    /// of the new term, it proposes right away.
    pub fn start(&mut self, last_committed: &Block) {
        self.begin_term(last_committed);
        self.advance_on_finalization();
    }

    /// Register a callback to be invoked with every block this replica finalizes from now on.
    pub fn on_finalized(&mut self, listener: FinalizedListener) {
        self.on_finalized.push(listener);
    }

    /// Handle a byte blob received from the network. Blobs that do not decode are dropped.
    pub fn on_receive_message(&mut self, bytes: &[u8]) {
        let msg = match PbftMessage::decode(bytes) {
            Ok(msg) => msg,
            Err(err) => {
                log::debug!("Dropping undecodable message: {:?}", err);
                return;
            }
        };
        self.route(msg);
        self.advance_on_finalization();
    }

    /// Handle every validation verdict the app has delivered so far. Returns how many there were.
    pub fn process_validation_outcomes(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(outcome) = self.validation_outcomes.try_recv() {
            if let Some(term) = self.term.as_mut() {
                term.on_validation_outcome(outcome);
            }
            self.advance_on_finalization();
            handled += 1;
        }
        handled
    }

    /// Move the active term to its next view if the election trigger has fired.
    pub fn poll_election_trigger(&mut self) {
        if let Some(term) = self.term.as_mut() {
            term.poll_election_trigger(&mut self.app);
        }
        self.advance_on_finalization();
    }

    /// Do one round of work: drain the network, handling the validation verdicts that arrive in the
    /// meantime after every message, then check the election trigger.
    ///
    /// Returns `false` if there was neither a message nor a validation verdict to handle.
    pub fn tick(&mut self) -> bool {
        let mut busy = false;
        while let Some(bytes) = self.network.recv() {
            self.on_receive_message(&bytes);
            self.process_validation_outcomes();
            busy = true;
        }
        busy |= self.process_validation_outcomes() > 0;
        self.poll_election_trigger();
        busy
    }

    /// Propose `block` in the active term. See [`ConsensusTerm::suggest_block`].
    pub fn suggest_block(&mut self, block: Block) -> bool {
        let proposed = match self.term.as_mut() {
            Some(term) => term.suggest_block(block),
            None => false,
        };
        self.advance_on_finalization();
        proposed
    }

    /// Whether the local replica leads the current view of the active term.
    pub fn is_leader(&self) -> bool {
        self.term.as_ref().is_some_and(|term| term.is_leader())
    }

    /// The height currently being agreed on, if a term is active.
    pub fn term(&self) -> Option<BlockHeight> {
        self.term.as_ref().map(|term| term.term())
    }

    /// The current view of the active term.
    pub fn view(&self) -> Option<ViewNumber> {
        self.term.as_ref().map(|term| term.view())
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    /// Stop participating: drop every finalization listener, dispose the active term, and stop
    /// routing messages to it. Calling it again does nothing.
    pub fn dispose(&mut self) {
        self.on_finalized.clear();
        if let Some(mut term) = self.term.take() {
            term.dispose();
        }
        if let Some(token) = self.subscription.take() {
            self.router.unsubscribe(token);
        }
    }

    fn route(&mut self, msg: PbftMessage) {
        let Some(term) = self.term.as_mut() else {
            return;
        };
        let mut handler = TermHandler {
            term,
            app: &mut self.app,
        };
        self.router.route(msg, &mut handler);
    }

    fn begin_term(&mut self, last_committed: &Block) {
        let height = last_committed.height + 1;
        let mut term = ConsensusTerm::new(height, last_committed.hash, self.config.clone());
        self.subscription = Some(self.router.set_term(height));
        term.start(&mut self.app);
        self.term = Some(term);
    }

    /// If the active term has finalized a block, hand the block to the listeners and move on to the
    /// next height. The next term may finalize as soon as it starts (e.g., with a single member); that
    /// block is picked up by the next call.
    fn advance_on_finalization(&mut self) {
        if let Some(block) = self.term.as_mut().and_then(|term| term.take_finalized()) {
            for listener in self.on_finalized.iter_mut() {
                listener(&block);
            }

            if let Some(mut retired) = self.term.take() {
                retired.dispose();
            }
            if let Some(token) = self.subscription.take() {
                self.router.unsubscribe(token);
            }
            self.begin_term(&block);
        }
    }
}
