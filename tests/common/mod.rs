/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

#![allow(dead_code)]

pub(crate) mod app;

pub(crate) mod builders;

pub(crate) mod cluster;

pub(crate) mod election;

pub(crate) mod harness;

pub(crate) mod logging;

pub(crate) mod network;
