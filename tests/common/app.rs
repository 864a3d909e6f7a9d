/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::sync::{Arc, Mutex};

use pbft_rs::{
    app::{App, ProduceBlockRequest, ProduceBlockResponse, ValidateBlockRequest, ValidationResponder},
    types::basic::{CryptoHash, Data, Datum},
};

/// What a [`TestApp`] does with the blocks it is asked to validate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ValidationMode {
    Accept,
    Reject,
    /// Keep the request until the test calls [`TestApp::release_held`].
    Hold,
}

struct TestAppState {
    mode: ValidationMode,
    held: Vec<ValidationResponder>,
    produced: u64,
    validated: Vec<CryptoHash>,
}

/// An app whose blocks carry the producing replica's tag and a counter, so that blocks proposed by
/// different replicas, or at different times, are always distinct. Clones share state, so a test can
/// keep a clone to steer validation while a driver owns the original.
#[derive(Clone)]
pub(crate) struct TestApp {
    tag: u8,
    state: Arc<Mutex<TestAppState>>,
}

impl TestApp {
    pub(crate) fn new(tag: u8) -> TestApp {
        TestApp {
            tag,
            state: Arc::new(Mutex::new(TestAppState {
                mode: ValidationMode::Accept,
                held: Vec::new(),
                produced: 0,
                validated: Vec::new(),
            })),
        }
    }

    pub(crate) fn set_mode(&self, mode: ValidationMode) {
        self.state.lock().unwrap().mode = mode;
    }

    /// Answer every held validation request with `valid`. Returns how many there were.
    pub(crate) fn release_held(&self, valid: bool) -> usize {
        let held = std::mem::take(&mut self.state.lock().unwrap().held);
        let count = held.len();
        for responder in held {
            responder.respond(valid)
        }
        count
    }

    pub(crate) fn held_count(&self) -> usize {
        self.state.lock().unwrap().held.len()
    }

    pub(crate) fn produced_count(&self) -> u64 {
        self.state.lock().unwrap().produced
    }

    /// Hashes of every block this app was asked to validate, in order.
    pub(crate) fn validated(&self) -> Vec<CryptoHash> {
        self.state.lock().unwrap().validated.clone()
    }
}

impl App for TestApp {
    fn produce_block(&mut self, request: ProduceBlockRequest) -> ProduceBlockResponse {
        let mut state = self.state.lock().unwrap();
        state.produced += 1;

        let mut bytes = vec![self.tag];
        bytes.extend_from_slice(&state.produced.to_le_bytes());
        bytes.extend_from_slice(&request.view().int().to_le_bytes());
        ProduceBlockResponse {
            data: Data::new(vec![Datum::new(bytes)]),
        }
    }

    fn validate_block(&mut self, request: ValidateBlockRequest) {
        let mut state = self.state.lock().unwrap();
        state.validated.push(request.block().hash);
        match state.mode {
            ValidationMode::Accept => {
                drop(state);
                request.respond(true)
            }
            ValidationMode::Reject => {
                drop(state);
                request.respond(false)
            }
            ValidationMode::Hold => state.held.push(request.into_responder()),
        }
    }
}
