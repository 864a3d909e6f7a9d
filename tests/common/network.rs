/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use pbft_rs::{messages::PbftMessage, networking::Network, types::basic::MemberId};

type Whitelist = Arc<Mutex<Option<HashSet<MemberId>>>>;

/// A mock network stub which passes messages from and to replicas using channels.
///
/// Each stub has an outgoing and an incoming whitelist. `None` lets everything through; `Some(set)`
/// only lets messages to (respectively from) the members in `set` through. Clones of a stub share its
/// whitelists, so a test can keep a clone to partition a replica while it runs.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    me: MemberId,
    all_peers: HashMap<MemberId, Sender<(MemberId, Vec<u8>)>>,
    inbox: Arc<Mutex<Receiver<(MemberId, Vec<u8>)>>>,
    outgoing_whitelist: Whitelist,
    incoming_whitelist: Whitelist,
    sent: Arc<AtomicUsize>,
}

impl NetworkStub {
    pub(crate) fn set_outgoing_whitelist(&self, whitelist: Option<HashSet<MemberId>>) {
        *self.outgoing_whitelist.lock().unwrap() = whitelist;
    }

    pub(crate) fn set_incoming_whitelist(&self, whitelist: Option<HashSet<MemberId>>) {
        *self.incoming_whitelist.lock().unwrap() = whitelist;
    }

    /// Number of messages put on the wire by all the stubs of the same mock network.
    pub(crate) fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    fn allowed(whitelist: &Whitelist, peer: &MemberId) -> bool {
        match &*whitelist.lock().unwrap() {
            Some(whitelist) => whitelist.contains(peer),
            None => true,
        }
    }
}

impl Network for NetworkStub {
    fn send(&mut self, peer: MemberId, message: Vec<u8>) {
        if !Self::allowed(&self.outgoing_whitelist, &peer) {
            return;
        }
        if let Some(peer) = self.all_peers.get(&peer) {
            self.sent.fetch_add(1, Ordering::SeqCst);
            let _ = peer.send((self.me, message));
        }
    }

    // Sends to every member, including the sender itself.
    fn broadcast(&mut self, message: Vec<u8>) {
        let peers: Vec<MemberId> = self.all_peers.keys().copied().collect();
        for peer in peers {
            self.send(peer, message.clone())
        }
    }

    fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            let (origin, message) = match self.inbox.lock().unwrap().try_recv() {
                Ok(o_m) => o_m,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => panic!(),
            };
            if Self::allowed(&self.incoming_whitelist, &origin) {
                return Some(message);
            }
        }
    }
}

pub(crate) fn mock_network(peers: impl Iterator<Item = MemberId>) -> Vec<NetworkStub> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(MemberId, Receiver<(MemberId, Vec<u8>)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    let sent = Arc::new(AtomicUsize::new(0));
    peer_and_inboxes
        .into_iter()
        .map(|(me, inbox)| NetworkStub {
            me,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
            outgoing_whitelist: Arc::new(Mutex::new(None)),
            incoming_whitelist: Arc::new(Mutex::new(None)),
            sent: sent.clone(),
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Destination {
    Peer(MemberId),
    Broadcast,
}

/// A network that delivers nothing and remembers everything it was asked to send.
#[derive(Clone, Default)]
pub(crate) struct RecordingNetwork {
    sent: Arc<Mutex<Vec<(Destination, PbftMessage)>>>,
}

impl RecordingNetwork {
    /// Take every message sent since the last call.
    pub(crate) fn take_sent(&self) -> Vec<(Destination, PbftMessage)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    fn record(&self, destination: Destination, message: &[u8]) {
        let msg = PbftMessage::decode(message).unwrap();
        self.sent.lock().unwrap().push((destination, msg));
    }
}

impl Network for RecordingNetwork {
    fn send(&mut self, peer: MemberId, message: Vec<u8>) {
        self.record(Destination::Peer(peer), &message)
    }

    fn broadcast(&mut self, message: Vec<u8>) {
        self.record(Destination::Broadcast, &message)
    }

    fn recv(&mut self) -> Option<Vec<u8>> {
        None
    }
}
