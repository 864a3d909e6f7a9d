/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types and traits that are used across multiple components of pbft-rs.
//!
//! Types specific to a single component, e.g., the signed message kinds, live next to that component.

pub mod basic;

pub mod block;

pub mod crypto_primitives;

pub mod members;
