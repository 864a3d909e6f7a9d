/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica on background threads.
//!
//! [`Pbft`](crate::pbft::Pbft) is a plain single-threaded state machine that has to be driven by its
//! caller. This module wraps it for the common case: a [`ReplicaSpec`] bundles the user's
//! [`App`] and [`Network`] implementations with a [`Configuration`], and [`ReplicaSpec::start`] spawns
//!  1. The algorithm thread, which repeatedly [ticks](crate::pbft::Pbft::tick) the driver, backing off
//!     briefly whenever a tick finds nothing to do, and
//!  2. The event bus thread, which runs the default loggers and the user's event handlers. It is only
//!     started if there is at least one handler to run.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(signing_key)
//!     .members(members)
//!     .base_election_timeout(Duration::from_millis(500))
//!     .log_events(true)
//!     .build();
//!
//! let replica =
//!     ReplicaSpec::builder()
//!     .app(app)
//!     .network(network)
//!     .configuration(configuration)
//!     .on_finalize_block(finalize_block_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! ### Optional setters
//!
//! Besides `.genesis_block(...)` (the block the first term extends, [`Block::genesis`] by default), the
//! optional setters register handlers for the events in [`crate::events`]: `.on_store_pre_prepare`,
//! `.on_store_prepare`, `.on_store_commit`, `.on_store_view_change`, `.on_clear_term`, `.on_propose`,
//! `.on_send_prepare`, `.on_send_commit`, `.on_send_view_change`, `.on_send_new_view`,
//! `.on_prepared`, `.on_finalize_block`, `.on_elected`, `.on_enter_view`, `.on_view_timeout`, and
//! `.on_reject_message`.
//!
//! ## Log Events
//!
//! pbft-rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages printed
//! onto a terminal or to a file, set up a [logging
//! implementation](https://docs.rs/log/latest/log/#available-logging-implementations).

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ed25519_dalek::SigningKey;
use typed_builder::TypedBuilder;

use crate::app::App;
use crate::election_trigger::TimerElectionTrigger;
use crate::event_bus::*;
use crate::events::*;
use crate::networking::Network;
use crate::pbft::Pbft;
use crate::types::{
    basic::MemberId,
    block::Block,
    crypto_primitives::Ed25519KeyManager,
    members::{ConfigurationError, Members},
};

/// Stores the user-defined parameters required to start the replica, that is:
/// 1. The replica's [keypair](ed25519_dalek::SigningKey).
/// 2. The ordered membership list. The local replica must be on it.
/// 3. The base election timeout: how long the replica waits in view 0 without progress before asking
///    for a view change. The timeout doubles with every view after that.
/// 4. The "Log Events" flag, if set to "true" then logs should be printed.
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.members(...)`
    - `.base_election_timeout(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's keypair, used to sign messages. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set the ordered list of members taking part in consensus. Required."))]
    pub members: Vec<MemberId>,
    #[builder(setter(doc = "Set the time the replica waits for progress in view 0 before timing out. Required."))]
    pub base_election_timeout: Duration,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

/// Stores all necessary parameters and trait implementations required to run the [Replica].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.app(...)`
    - `.network(...)`
    - `.configuration(...)`

    Optional:
    - `.genesis_block(...)`
    - `.on_store_pre_prepare(...)`
    - `.on_store_prepare(...)`
    - `.on_store_commit(...)`
    - `.on_store_view_change(...)`
    - `.on_clear_term(...)`
    - `.on_propose(...)`
    - `.on_send_prepare(...)`
    - `.on_send_commit(...)`
    - `.on_send_view_change(...)`
    - `.on_send_new_view(...)`
    - `.on_prepared(...)`
    - `.on_finalize_block(...)`
    - `.on_elected(...)`
    - `.on_enter_view(...)`
    - `.on_view_timeout(...)`
    - `.on_reject_message(...)`
"))]
pub struct ReplicaSpec<A: App + 'static, N: Network + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the application that produces and validates blocks. The argument must implement the [App](crate::app::App) trait. Required."))]
    app: A,
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default = Block::genesis(), setter(doc = "Set the last finalized block, which the first term extends. Defaults to the genesis block. Optional."))]
    genesis_block: Block,
    #[builder(default, setter(transform = |handler: impl Fn(&StorePrePrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StorePrePrepareEvent>),
    doc = "Register a handler closure to be invoked after a pre-prepare is stored. Optional."))]
    on_store_pre_prepare: Option<HandlerPtr<StorePrePrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StorePrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StorePrepareEvent>),
    doc = "Register a handler closure to be invoked after a new prepare vote is stored. Optional."))]
    on_store_prepare: Option<HandlerPtr<StorePrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StoreCommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StoreCommitEvent>),
    doc = "Register a handler closure to be invoked after a new commit vote is stored. Optional."))]
    on_store_commit: Option<HandlerPtr<StoreCommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StoreViewChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StoreViewChangeEvent>),
    doc = "Register a handler closure to be invoked after a new view change is stored. Optional."))]
    on_store_view_change: Option<HandlerPtr<StoreViewChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ClearTermEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ClearTermEvent>),
    doc = "Register a handler closure to be invoked after everything stored for a term is discarded. Optional."))]
    on_clear_term: Option<HandlerPtr<ClearTermEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica, as leader, proposes a block. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendPrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendPrepareEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a prepare. Optional."))]
    on_send_prepare: Option<HandlerPtr<SendPrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendCommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendCommitEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a commit. Optional."))]
    on_send_commit: Option<HandlerPtr<SendCommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendViewChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendViewChangeEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a view change to the next leader. Optional."))]
    on_send_view_change: Option<HandlerPtr<SendViewChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendNewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendNewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica, as newly elected leader, broadcasts a new view. Optional."))]
    on_send_new_view: Option<HandlerPtr<SendNewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PreparedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PreparedEvent>),
    doc = "Register a handler closure to be invoked after the replica becomes prepared on a block. Optional."))]
    on_prepared: Option<HandlerPtr<PreparedEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&FinalizeBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<FinalizeBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is finalized. Optional."))]
    on_finalize_block: Option<HandlerPtr<FinalizeBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ElectedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ElectedEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a quorum of view changes. Optional."))]
    on_elected: Option<HandlerPtr<ElectedEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EnterViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EnterViewEvent>),
    doc = "Register a handler closure to be invoked after the replica enters a view. Optional."))]
    on_enter_view: Option<HandlerPtr<EnterViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ViewTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ViewTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica times out in a view. Optional."))]
    on_view_timeout: Option<HandlerPtr<ViewTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectMessageEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectMessageEvent>),
    doc = "Register a handler closure to be invoked after the replica drops an inbound message. Optional."))]
    on_reject_message: Option<HandlerPtr<RejectMessageEvent>>,
}

impl<A: App + 'static, N: Network + 'static> ReplicaSpec<A, N> {
    /// Starts all threads and channels associated with running a replica, and returns the handles to
    /// them in a [Replica] struct.
    ///
    /// Fails if the membership list is empty, has duplicates, or does not include the replica itself.
    pub fn start(self) -> Result<Replica, ConfigurationError> {
        let members = Members::new(self.configuration.members)?;
        let key_manager = Arc::new(Ed25519KeyManager::new(self.configuration.me));
        let election_trigger = TimerElectionTrigger::new(self.configuration.base_election_timeout);

        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_store_pre_prepare,
            self.on_store_prepare,
            self.on_store_commit,
            self.on_store_view_change,
            self.on_clear_term,
            self.on_propose,
            self.on_send_prepare,
            self.on_send_commit,
            self.on_send_view_change,
            self.on_send_new_view,
            self.on_prepared,
            self.on_finalize_block,
            self.on_elected,
            self.on_enter_view,
            self.on_view_timeout,
            self.on_reject_message,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let pbft = Pbft::new(
            key_manager,
            members,
            self.network,
            self.app,
            election_trigger,
            event_publisher,
        )?;

        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = start_algorithm(pbft, self.genesis_block, algorithm_shutdown_receiver);

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (shutdown, shutdown_receiver) = mpsc::channel();
                let event_bus = start_event_bus(event_handlers, event_subscriber, shutdown_receiver);
                (Some(event_bus), Some(shutdown))
            }
            None => (None, None),
        };

        Ok(Replica {
            algorithm: Some(algorithm),
            algorithm_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// How long the algorithm thread waits for a shutdown signal after a tick that found nothing to do.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

fn start_algorithm<N: Network + 'static, A: App + 'static>(
    mut pbft: Pbft<N, A, TimerElectionTrigger>,
    genesis_block: Block,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        pbft.start(&genesis_block);
        loop {
            // Only block for a while when there was nothing to do. Otherwise just check for shutdown.
            let wait = if pbft.tick() {
                Duration::ZERO
            } else {
                IDLE_POLL_INTERVAL
            };
            match shutdown_signal.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    pbft.dispose();
                    return;
                }
                Err(RecvTimeoutError::Timeout) => (),
            }
        }
    })
}

/// A handle to the background threads of a pbft-rs replica. When this value is dropped, all
/// background threads are gracefully shut down.
pub struct Replica {
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Drop for Replica {
    fn drop(&mut self) {
        // The algorithm thread publishes to the event bus, so it is shut down first.
        let _ = self.algorithm_shutdown.send(());
        if let Some(algorithm) = self.algorithm.take() {
            let _ = algorithm.join();
        }

        if let Some(shutdown) = self.event_bus_shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }
    }
}
