/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Election triggers decide when a view has gone on for too long without progress.
//!
//! Each [consensus term](crate::pbft::term::ConsensusTerm) owns one [`ElectionTrigger`]. The term
//! [`start`](ElectionTrigger::start)s it whenever it enters a view, [`snooze`](ElectionTrigger::snooze)s
//! it whenever the view makes progress, and [`stop`](ElectionTrigger::stop)s it when the term ends. The
//! replica polls [`has_timed_out`](ElectionTrigger::has_timed_out); when it returns `true` the term
//! moves to the next view and asks that view's leader to take over.

use std::cmp::min;
use std::time::{Duration, Instant};

use crate::types::basic::ViewNumber;

pub trait ElectionTrigger: Send {
    /// Arm the trigger for `view`.
    fn start(&mut self, view: ViewNumber);

    /// Disarm the trigger. It will not fire until started again.
    fn stop(&mut self);

    /// Push the deadline back, as if the current view had just started.
    fn snooze(&mut self);

    /// Returns `true` once when the armed deadline has passed, disarming the trigger.
    fn has_timed_out(&mut self) -> bool;
}

/// An [`ElectionTrigger`] driven by the wall clock.
///
/// The time allotted to a view grows exponentially with the view number, `base * 2^view`, with the
/// exponent capped at 16, so that replicas whose views drifted apart eventually spend long enough in
/// the same view to agree.
#[derive(Clone)]
pub struct TimerElectionTrigger {
    base: Duration,
    view: ViewNumber,
    deadline: Option<Instant>,
}

const MAX_BACKOFF_EXPONENT: u64 = 16;

impl TimerElectionTrigger {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            view: ViewNumber::init(),
            deadline: None,
        }
    }

    /// Time allotted to `view`.
    pub fn timeout(&self, view: ViewNumber) -> Duration {
        let exponent = min(view.int(), MAX_BACKOFF_EXPONENT) as u32;
        self.base.saturating_mul(1 << exponent)
    }
}

impl ElectionTrigger for TimerElectionTrigger {
    fn start(&mut self, view: ViewNumber) {
        self.view = view;
        self.deadline = Some(Instant::now() + self.timeout(view));
    }

    fn stop(&mut self) {
        self.deadline = None;
    }

    fn snooze(&mut self) {
        if self.deadline.is_some() {
            self.deadline = Some(Instant::now() + self.timeout(self.view));
        }
    }

    fn has_timed_out(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
