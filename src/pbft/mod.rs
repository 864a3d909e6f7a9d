/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The consensus protocol proper.
//!
//! [`term`] implements the state machine that agrees on a single block, [`driver`] chains terms
//! together into an ever-growing sequence of finalized blocks.

pub mod driver;

pub(crate) mod roles;

pub mod term;

pub use driver::Pbft;
