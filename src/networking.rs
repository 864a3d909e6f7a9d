/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer (P2P) networking.
//!
//! The consensus core does not assume anything about the transport beyond the [`Network`] trait:
//! messages may be lost, delayed, duplicated, or reordered. Payloads are opaque byte blobs produced by
//! [`PbftMessage::encode`]; everything needed to authenticate a message is inside the blob.

use crate::messages::PbftMessage;
use crate::types::basic::MemberId;

pub trait Network: Clone + Send {
    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: MemberId, message: Vec<u8>);

    /// Send a message to each of the specified peers without blocking.
    fn multicast(&mut self, peers: &[MemberId], message: Vec<u8>) {
        for peer in peers {
            self.send(*peer, message.clone())
        }
    }

    /// Send a message to all peers without blocking.
    fn broadcast(&mut self, message: Vec<u8>);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<Vec<u8>>;
}

/// Handle for sending, multicasting, and broadcasting messages to the [`Network`].
///
/// It can be used to send instances of any type that implement the [`Into<PbftMessage>`] trait.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn send<S: Into<PbftMessage>>(&mut self, peer: MemberId, msg: S) {
        self.network.send(peer, msg.into().encode())
    }

    pub(crate) fn multicast<S: Into<PbftMessage>>(&mut self, peers: &[MemberId], msg: S) {
        self.network.multicast(peers, msg.into().encode())
    }

    pub(crate) fn broadcast<S: Into<PbftMessage>>(&mut self, msg: S) {
        self.network.broadcast(msg.into().encode())
    }
}
