/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which receives [events](crate::events) published by the algorithm thread and
//! fires the handlers registered for them.
//!
//! Handlers for a given event type run in registration order: the default logger first (if the
//! replica was configured to log events), then the user-defined handler (if one was registered).

use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Registered handlers, one list per event type.
pub(crate) struct EventHandlers {
    pub(crate) store_pre_prepare_handlers: Vec<HandlerPtr<StorePrePrepareEvent>>,
    pub(crate) store_prepare_handlers: Vec<HandlerPtr<StorePrepareEvent>>,
    pub(crate) store_commit_handlers: Vec<HandlerPtr<StoreCommitEvent>>,
    pub(crate) store_view_change_handlers: Vec<HandlerPtr<StoreViewChangeEvent>>,
    pub(crate) clear_term_handlers: Vec<HandlerPtr<ClearTermEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) send_prepare_handlers: Vec<HandlerPtr<SendPrepareEvent>>,
    pub(crate) send_commit_handlers: Vec<HandlerPtr<SendCommitEvent>>,
    pub(crate) send_view_change_handlers: Vec<HandlerPtr<SendViewChangeEvent>>,
    pub(crate) send_new_view_handlers: Vec<HandlerPtr<SendNewViewEvent>>,
    pub(crate) prepared_handlers: Vec<HandlerPtr<PreparedEvent>>,
    pub(crate) finalize_block_handlers: Vec<HandlerPtr<FinalizeBlockEvent>>,
    pub(crate) elected_handlers: Vec<HandlerPtr<ElectedEvent>>,
    pub(crate) enter_view_handlers: Vec<HandlerPtr<EnterViewEvent>>,
    pub(crate) view_timeout_handlers: Vec<HandlerPtr<ViewTimeoutEvent>>,
    pub(crate) reject_message_handlers: Vec<HandlerPtr<RejectMessageEvent>>,
}

/// Build the handler list for one event type: the default logger if `log_events`, followed by the
/// user-defined handler if there is one.
fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(handler) = user_handler {
        handlers.push(handler);
    }
    handlers
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        store_pre_prepare_handler: Option<HandlerPtr<StorePrePrepareEvent>>,
        store_prepare_handler: Option<HandlerPtr<StorePrepareEvent>>,
        store_commit_handler: Option<HandlerPtr<StoreCommitEvent>>,
        store_view_change_handler: Option<HandlerPtr<StoreViewChangeEvent>>,
        clear_term_handler: Option<HandlerPtr<ClearTermEvent>>,
        propose_handler: Option<HandlerPtr<ProposeEvent>>,
        send_prepare_handler: Option<HandlerPtr<SendPrepareEvent>>,
        send_commit_handler: Option<HandlerPtr<SendCommitEvent>>,
        send_view_change_handler: Option<HandlerPtr<SendViewChangeEvent>>,
        send_new_view_handler: Option<HandlerPtr<SendNewViewEvent>>,
        prepared_handler: Option<HandlerPtr<PreparedEvent>>,
        finalize_block_handler: Option<HandlerPtr<FinalizeBlockEvent>>,
        elected_handler: Option<HandlerPtr<ElectedEvent>>,
        enter_view_handler: Option<HandlerPtr<EnterViewEvent>>,
        view_timeout_handler: Option<HandlerPtr<ViewTimeoutEvent>>,
        reject_message_handler: Option<HandlerPtr<RejectMessageEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            store_pre_prepare_handlers: handlers(log_events, store_pre_prepare_handler),
            store_prepare_handlers: handlers(log_events, store_prepare_handler),
            store_commit_handlers: handlers(log_events, store_commit_handler),
            store_view_change_handlers: handlers(log_events, store_view_change_handler),
            clear_term_handlers: handlers(log_events, clear_term_handler),
            propose_handlers: handlers(log_events, propose_handler),
            send_prepare_handlers: handlers(log_events, send_prepare_handler),
            send_commit_handlers: handlers(log_events, send_commit_handler),
            send_view_change_handlers: handlers(log_events, send_view_change_handler),
            send_new_view_handlers: handlers(log_events, send_new_view_handler),
            prepared_handlers: handlers(log_events, prepared_handler),
            finalize_block_handlers: handlers(log_events, finalize_block_handler),
            elected_handlers: handlers(log_events, elected_handler),
            enter_view_handlers: handlers(log_events, enter_view_handler),
            view_timeout_handlers: handlers(log_events, view_timeout_handler),
            reject_message_handlers: handlers(log_events, reject_message_handler),
        }
    }

    /// Whether no handler at all is registered. If so, the replica does not start an event bus.
    pub(crate) fn is_empty(&self) -> bool {
        self.store_pre_prepare_handlers.is_empty()
            && self.store_prepare_handlers.is_empty()
            && self.store_commit_handlers.is_empty()
            && self.store_view_change_handlers.is_empty()
            && self.clear_term_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.send_prepare_handlers.is_empty()
            && self.send_commit_handlers.is_empty()
            && self.send_view_change_handlers.is_empty()
            && self.send_new_view_handlers.is_empty()
            && self.prepared_handlers.is_empty()
            && self.finalize_block_handlers.is_empty()
            && self.elected_handlers.is_empty()
            && self.enter_view_handlers.is_empty()
            && self.view_timeout_handlers.is_empty()
            && self.reject_message_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::StorePrePrepare(event) => self.store_pre_prepare_handlers.iter().for_each(|handler| handler(&event)),
            Event::StorePrepare(event) => self.store_prepare_handlers.iter().for_each(|handler| handler(&event)),
            Event::StoreCommit(event) => self.store_commit_handlers.iter().for_each(|handler| handler(&event)),
            Event::StoreViewChange(event) => self.store_view_change_handlers.iter().for_each(|handler| handler(&event)),
            Event::ClearTerm(event) => self.clear_term_handlers.iter().for_each(|handler| handler(&event)),
            Event::Propose(event) => self.propose_handlers.iter().for_each(|handler| handler(&event)),
            Event::SendPrepare(event) => self.send_prepare_handlers.iter().for_each(|handler| handler(&event)),
            Event::SendCommit(event) => self.send_commit_handlers.iter().for_each(|handler| handler(&event)),
            Event::SendViewChange(event) => self.send_view_change_handlers.iter().for_each(|handler| handler(&event)),
            Event::SendNewView(event) => self.send_new_view_handlers.iter().for_each(|handler| handler(&event)),
            Event::Prepared(event) => self.prepared_handlers.iter().for_each(|handler| handler(&event)),
            Event::FinalizeBlock(event) => self.finalize_block_handlers.iter().for_each(|handler| handler(&event)),
            Event::Elected(event) => self.elected_handlers.iter().for_each(|handler| handler(&event)),
            Event::EnterView(event) => self.enter_view_handlers.iter().for_each(|handler| handler(&event)),
            Event::ViewTimeout(event) => self.view_timeout_handlers.iter().for_each(|handler| handler(&event)),
            Event::RejectMessage(event) => self.reject_message_handlers.iter().for_each(|handler| handler(&event)),
        }
    }
}

/// Start the event bus thread. It runs until `shutdown_signal` fires, or until the algorithm thread
/// has gone away and every event it published has been handled.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            Err(TryRecvError::Disconnected) => return,
        }
    })
}
