/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use pbft_rs::{
    message_factory::MessageFactory,
    pbft::Pbft,
    types::{basic::MemberId, block::Block, crypto_primitives::Ed25519KeyManager, members::Members},
};

use super::{
    app::TestApp,
    builders::{factory, member_id, signing_keys},
    election::ManualTrigger,
    network::{mock_network, NetworkStub},
};

pub(crate) struct Node {
    pub(crate) id: MemberId,
    pub(crate) pbft: Pbft<NetworkStub, TestApp, ManualTrigger>,
    pub(crate) network: NetworkStub,
    pub(crate) app: TestApp,
    pub(crate) trigger: ManualTrigger,
    finalized: Arc<Mutex<Vec<Block>>>,
}

impl Node {
    pub(crate) fn finalized(&self) -> Vec<Block> {
        self.finalized.lock().unwrap().clone()
    }
}

/// `n` replicas connected by a mock network, driven in lock step by the test thread.
pub(crate) struct Cluster {
    pub(crate) nodes: Vec<Node>,
    pub(crate) factories: Vec<MessageFactory>,
}

impl Cluster {
    /// Create `n` replicas. They do nothing until [`start`](Self::start) is called.
    pub(crate) fn new(n: usize) -> Cluster {
        let keys = signing_keys(n);
        let ids: Vec<MemberId> = keys.iter().map(member_id).collect();
        let members = Members::new(ids.clone()).unwrap();
        let networks = mock_network(ids.iter().copied());

        let nodes = keys
            .iter()
            .zip(networks)
            .enumerate()
            .map(|(i, (key, network))| {
                let app = TestApp::new(i as u8);
                let trigger = ManualTrigger::new();
                let mut pbft = Pbft::new(
                    Arc::new(Ed25519KeyManager::new(key.clone())),
                    members.clone(),
                    network.clone(),
                    app.clone(),
                    trigger.clone(),
                    None,
                )
                .unwrap();

                let finalized = Arc::new(Mutex::new(Vec::new()));
                let finalized_by_listener = finalized.clone();
                pbft.on_finalized(Box::new(move |block: &Block| {
                    finalized_by_listener.lock().unwrap().push(block.clone())
                }));

                Node {
                    id: ids[i],
                    pbft,
                    network,
                    app,
                    trigger,
                    finalized,
                }
            })
            .collect();

        Cluster {
            nodes,
            factories: keys.iter().map(factory).collect(),
        }
    }

    pub(crate) fn start(&mut self) {
        for node in self.nodes.iter_mut() {
            node.pbft.start(&Block::genesis());
        }
    }

    /// Tick every replica once, in order.
    pub(crate) fn tick_all(&mut self) {
        for node in self.nodes.iter_mut() {
            node.pbft.tick();
        }
    }

    /// Tick every replica `rounds` times.
    pub(crate) fn run_rounds(&mut self, rounds: usize) {
        for _ in 0..rounds {
            self.tick_all();
        }
    }

    /// Tick until `done` holds, for at most `max_rounds` rounds. Returns whether `done` held.
    pub(crate) fn run_until(&mut self, max_rounds: usize, done: impl Fn(&Cluster) -> bool) -> bool {
        for _ in 0..max_rounds {
            if done(self) {
                return true;
            }
            self.tick_all();
        }
        done(self)
    }

    /// Tick until a whole round goes by without any message being sent.
    pub(crate) fn settle(&mut self) {
        for _ in 0..1_000 {
            let before = self.nodes[0].network.sent_count();
            self.tick_all();
            if self.nodes[0].network.sent_count() == before {
                return;
            }
        }
        panic!("cluster did not settle");
    }

    /// Fire the election trigger of every replica in `members`.
    pub(crate) fn time_out(&mut self, members: &[usize]) {
        for &i in members {
            self.nodes[i].trigger.fire();
        }
    }

    /// Cut replica `i` off from everyone else, in both directions.
    pub(crate) fn isolate(&self, i: usize) {
        self.nodes[i].network.set_outgoing_whitelist(Some(HashSet::new()));
        self.nodes[i].network.set_incoming_whitelist(Some(HashSet::new()));
    }

    pub(crate) fn heal(&self, i: usize) {
        self.nodes[i].network.set_outgoing_whitelist(None);
        self.nodes[i].network.set_incoming_whitelist(None);
    }

    /// Whether every replica in `members` has finalized at least `count` blocks.
    pub(crate) fn all_finalized(&self, members: &[usize], count: usize) -> bool {
        members.iter().all(|&i| self.nodes[i].finalized().len() >= count)
    }
}
