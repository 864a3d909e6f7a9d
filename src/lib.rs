/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! pbft-rs is the consensus core of a PBFT-style Byzantine fault tolerant protocol for agreeing on a
//! chain of blocks among a fixed, ordered set of `n` members, of which up to `f = ⌊(n - 1) / 3⌋` may be
//! arbitrarily faulty.
//!
//! Agreement on each height (*term*) goes through pre-prepare, prepare and commit phases led by a
//! round-robin leader, with a view change protocol that replaces a leader that fails to make progress.
//! See [`pbft::term`] for the protocol, and [`pbft::driver`] for how terms are chained.
//!
//! The core does not do networking, key management, block production or block validation itself. It
//! consumes these through the [`Network`](networking::Network),
//! [`KeyManager`](types::crypto_primitives::KeyManager), [`App`](app::App), and
//! [`ElectionTrigger`](election_trigger::ElectionTrigger) traits. [`replica`] wires everything up and
//! runs it on background threads.

pub mod app;

pub mod election_trigger;

pub(crate) mod event_bus;

pub mod events;

pub(crate) mod logging;

pub mod message_factory;

pub mod message_router;

pub mod messages;

pub mod networking;

pub mod pbft;

pub mod proofs_validator;

pub mod quorum_store;

pub mod replica;

pub mod types;
