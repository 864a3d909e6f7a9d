/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the replica's
//! [config](crate::replica::Configuration).
//!
//! pbft_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [StorePrepare](crate::events::StorePrepareEvent) is printed:
//!
//! ```text
//! StorePrepare, 1701329264, 3, 0, fNGCJyk, Id5u7f6, 2
//! ```
//!
//! In the snippet:
//! - The third and fourth values are the term and the view.
//! - The fifth value is the first seven characters of the Base64 encoding of the block hash.
//! - The sixth value is the first seven characters of the Base64 encoding of the signer's id.
//! - The seventh value is the number of distinct prepares stored for that block so far.
//!
//! Rejected messages are logged at the `debug` level; every other event is logged at `info`.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const STORE_PRE_PREPARE: &str = "StorePrePrepare";
pub const STORE_PREPARE: &str = "StorePrepare";
pub const STORE_COMMIT: &str = "StoreCommit";
pub const STORE_VIEW_CHANGE: &str = "StoreViewChange";
pub const CLEAR_TERM: &str = "ClearTerm";

pub const PROPOSE: &str = "Propose";
pub const SEND_PREPARE: &str = "SendPrepare";
pub const SEND_COMMIT: &str = "SendCommit";
pub const SEND_VIEW_CHANGE: &str = "SendViewChange";
pub const SEND_NEW_VIEW: &str = "SendNewView";

pub const PREPARED: &str = "Prepared";
pub const FINALIZE_BLOCK: &str = "FinalizeBlock";
pub const ELECTED: &str = "Elected";
pub const ENTER_VIEW: &str = "EnterView";
pub const VIEW_TIMEOUT: &str = "ViewTimeout";

pub const REJECT_MESSAGE: &str = "RejectMessage";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for StorePrePrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |store_pre_prepare_event: &StorePrePrepareEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                STORE_PRE_PREPARE,
                secs_since_unix_epoch(store_pre_prepare_event.timestamp),
                store_pre_prepare_event.term,
                store_pre_prepare_event.view,
                first_seven_base64_chars(&store_pre_prepare_event.block_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for StorePrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |store_prepare_event: &StorePrepareEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                STORE_PREPARE,
                secs_since_unix_epoch(store_prepare_event.timestamp),
                store_prepare_event.term,
                store_prepare_event.view,
                first_seven_base64_chars(&store_prepare_event.block_hash.bytes()),
                first_seven_base64_chars(&store_prepare_event.signer.bytes()),
                store_prepare_event.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for StoreCommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |store_commit_event: &StoreCommitEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                STORE_COMMIT,
                secs_since_unix_epoch(store_commit_event.timestamp),
                store_commit_event.term,
                store_commit_event.view,
                first_seven_base64_chars(&store_commit_event.block_hash.bytes()),
                first_seven_base64_chars(&store_commit_event.signer.bytes()),
                store_commit_event.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for StoreViewChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |store_view_change_event: &StoreViewChangeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                STORE_VIEW_CHANGE,
                secs_since_unix_epoch(store_view_change_event.timestamp),
                store_view_change_event.term,
                store_view_change_event.view,
                first_seven_base64_chars(&store_view_change_event.signer.bytes()),
                store_view_change_event.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for ClearTermEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |clear_term_event: &ClearTermEvent| {
            log::info!(
                "{}, {}, {}",
                CLEAR_TERM,
                secs_since_unix_epoch(clear_term_event.timestamp),
                clear_term_event.term
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                propose_event.term,
                propose_event.view,
                first_seven_base64_chars(&propose_event.block.hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendPrepareEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_prepare_event: &SendPrepareEvent| {
            let header = &send_prepare_event.prepare.signed_header;
            log::info!(
                "{}, {}, {}, {}, {}",
                SEND_PREPARE,
                secs_since_unix_epoch(send_prepare_event.timestamp),
                header.term,
                header.view,
                first_seven_base64_chars(&header.block_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendCommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_commit_event: &SendCommitEvent| {
            let header = &send_commit_event.commit.signed_header;
            log::info!(
                "{}, {}, {}, {}, {}",
                SEND_COMMIT,
                secs_since_unix_epoch(send_commit_event.timestamp),
                header.term,
                header.view,
                first_seven_base64_chars(&header.block_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendViewChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_view_change_event: &SendViewChangeEvent| {
            let header = &send_view_change_event.view_change.signed_header;
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                SEND_VIEW_CHANGE,
                secs_since_unix_epoch(send_view_change_event.timestamp),
                header.term,
                header.view,
                first_seven_base64_chars(&send_view_change_event.leader.bytes()),
                prepared_proof_info(header.prepared_proof.view())
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendNewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_new_view_event: &SendNewViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                SEND_NEW_VIEW,
                secs_since_unix_epoch(send_new_view_event.timestamp),
                send_new_view_event.term,
                send_new_view_event.view,
                first_seven_base64_chars(&send_new_view_event.block_hash.bytes()),
                send_new_view_event.confirmations
            )
        };
        Box::new(logger)
    }
}

impl Logger for PreparedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prepared_event: &PreparedEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PREPARED,
                secs_since_unix_epoch(prepared_event.timestamp),
                prepared_event.term,
                prepared_event.view,
                first_seven_base64_chars(&prepared_event.block_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for FinalizeBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |finalize_block_event: &FinalizeBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                FINALIZE_BLOCK,
                secs_since_unix_epoch(finalize_block_event.timestamp),
                finalize_block_event.block.height,
                finalize_block_event.view,
                first_seven_base64_chars(&finalize_block_event.block.hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ElectedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |elected_event: &ElectedEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ELECTED,
                secs_since_unix_epoch(elected_event.timestamp),
                elected_event.term,
                elected_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for EnterViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |enter_view_event: &EnterViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ENTER_VIEW,
                secs_since_unix_epoch(enter_view_event.timestamp),
                enter_view_event.term,
                enter_view_event.view,
                first_seven_base64_chars(&enter_view_event.leader.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ViewTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |view_timeout_event: &ViewTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VIEW_TIMEOUT,
                secs_since_unix_epoch(view_timeout_event.timestamp),
                view_timeout_event.term,
                view_timeout_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectMessageEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_message_event: &RejectMessageEvent| {
            log::debug!(
                "{}, {}, {:?}, {}, {}, {}, {:?}",
                REJECT_MESSAGE,
                secs_since_unix_epoch(reject_message_event.timestamp),
                reject_message_event.kind,
                reject_message_event.term,
                reject_message_event.view,
                first_seven_base64_chars(&reject_message_event.sender.bytes()),
                reject_message_event.reason
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}

fn prepared_proof_info(proof_view: Option<crate::types::basic::ViewNumber>) -> String {
    match proof_view {
        Some(view) => format!("prepared in view {}", view),
        None => String::from("not prepared"),
    }
}
