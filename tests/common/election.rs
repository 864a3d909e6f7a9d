/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::sync::{Arc, Mutex};

use pbft_rs::{election_trigger::ElectionTrigger, types::basic::ViewNumber};

#[derive(Default)]
struct TriggerState {
    running: bool,
    fired: bool,
    started: Vec<ViewNumber>,
    snoozes: usize,
}

/// An election trigger that only fires when the test says so. Clones share state.
#[derive(Clone, Default)]
pub(crate) struct ManualTrigger {
    state: Arc<Mutex<TriggerState>>,
}

impl ManualTrigger {
    pub(crate) fn new() -> ManualTrigger {
        ManualTrigger::default()
    }

    /// Make the next `has_timed_out` return `true`, if the trigger is running by then.
    pub(crate) fn fire(&self) {
        self.state.lock().unwrap().fired = true;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// The views the trigger was started for, in order.
    pub(crate) fn started(&self) -> Vec<ViewNumber> {
        self.state.lock().unwrap().started.clone()
    }

    pub(crate) fn snoozes(&self) -> usize {
        self.state.lock().unwrap().snoozes
    }
}

impl ElectionTrigger for ManualTrigger {
    fn start(&mut self, view: ViewNumber) {
        let mut state = self.state.lock().unwrap();
        state.running = true;
        state.started.push(view);
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        state.fired = false;
    }

    fn snooze(&mut self) {
        self.state.lock().unwrap().snoozes += 1;
    }

    fn has_timed_out(&mut self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.running && state.fired {
            state.running = false;
            state.fired = false;
            true
        } else {
            false
        }
    }
}
