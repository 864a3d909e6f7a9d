/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::sync::{
    mpsc::{self, Receiver},
    Arc, Mutex,
};

use pbft_rs::{
    events::{Event, RejectReason},
    message_factory::MessageFactory,
    messages::PbftMessage,
    pbft::Pbft,
    types::{
        basic::{MemberId, ViewNumber},
        block::Block,
        crypto_primitives::Ed25519KeyManager,
        members::Members,
    },
};

use super::{
    app::TestApp,
    builders::{child_of, factory, member_id, signing_keys},
    election::ManualTrigger,
    network::{Destination, RecordingNetwork},
};

/// A single replica under test, surrounded by peers that only exist as message factories. The test
/// plays the peers by crafting their messages and delivering them.
pub(crate) struct Harness {
    pub(crate) pbft: Pbft<RecordingNetwork, TestApp, ManualTrigger>,
    pub(crate) network: RecordingNetwork,
    pub(crate) app: TestApp,
    pub(crate) trigger: ManualTrigger,
    pub(crate) factories: Vec<MessageFactory>,
    pub(crate) members: Members,
    pub(crate) me: usize,
    finalized: Arc<Mutex<Vec<Block>>>,
    events: Receiver<Event>,
}

impl Harness {
    /// Start replica `me` of `n`, on top of the genesis block. Member `i` leads views `i`, `n + i`, ....
    pub(crate) fn new(n: usize, me: usize) -> Harness {
        let keys = signing_keys(n);
        let factories: Vec<MessageFactory> = keys.iter().map(factory).collect();
        let members = Members::new(keys.iter().map(member_id).collect()).unwrap();

        let network = RecordingNetwork::default();
        let app = TestApp::new(me as u8);
        let trigger = ManualTrigger::new();
        let (event_publisher, events) = mpsc::channel();

        let mut pbft = Pbft::new(
            Arc::new(Ed25519KeyManager::new(keys[me].clone())),
            members.clone(),
            network.clone(),
            app.clone(),
            trigger.clone(),
            Some(event_publisher),
        )
        .unwrap();

        let finalized = Arc::new(Mutex::new(Vec::new()));
        let finalized_by_listener = finalized.clone();
        pbft.on_finalized(Box::new(move |block: &Block| {
            finalized_by_listener.lock().unwrap().push(block.clone())
        }));
        pbft.start(&Block::genesis());

        Harness {
            pbft,
            network,
            app,
            trigger,
            factories,
            members,
            me,
            finalized,
            events,
        }
    }

    pub(crate) fn id(&self, member: usize) -> MemberId {
        self.factories[member].my_id()
    }

    pub(crate) fn peer(&self, member: usize) -> &MessageFactory {
        &self.factories[member]
    }

    /// A block for the first term, i.e., extending genesis.
    pub(crate) fn block(&self, tag: u8) -> Block {
        child_of(&Block::genesis(), tag)
    }

    /// Deliver `msg` as if it arrived from the network, then let the replica act on any validation
    /// verdicts that came back.
    pub(crate) fn deliver(&mut self, msg: impl Into<PbftMessage>) {
        self.deliver_bytes(&msg.into().encode());
    }

    pub(crate) fn deliver_bytes(&mut self, bytes: &[u8]) {
        self.pbft.on_receive_message(bytes);
        self.pbft.process_validation_outcomes();
    }

    /// Fire the election trigger and let the replica act on it.
    pub(crate) fn time_out(&mut self) {
        self.trigger.fire();
        self.pbft.poll_election_trigger();
    }

    pub(crate) fn current_view(&self) -> ViewNumber {
        self.pbft.view().unwrap()
    }

    pub(crate) fn finalized(&self) -> Vec<Block> {
        self.finalized.lock().unwrap().clone()
    }

    pub(crate) fn take_sent(&self) -> Vec<(Destination, PbftMessage)> {
        self.network.take_sent()
    }

    /// Take every event published since the last call.
    pub(crate) fn take_events(&mut self) -> Vec<Event> {
        self.events.try_iter().collect()
    }

    /// Take every event published since the last call, and keep the rejection reasons among them.
    pub(crate) fn rejections(&mut self) -> Vec<RejectReason> {
        self.take_events()
            .into_iter()
            .filter_map(|event| match event {
                Event::RejectMessage(rejection) => Some(rejection.reason),
                _ => None,
            })
            .collect()
    }
}
