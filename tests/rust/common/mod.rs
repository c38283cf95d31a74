// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::coroutines::{
    runtime::logging,
    Scheduler,
};
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::{
    thread,
    time::Duration,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Worker threads used by tests that do not care about the exact count.
#[allow(dead_code)]
pub const WORKERS: usize = 4;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Creates a scheduler for a test, with logging enabled.
pub fn scheduler(workers: usize) -> anyhow::Result<Scheduler> {
    logging::initialize();
    Ok(Scheduler::new(workers)?)
}

/// Sleeps the calling thread for up to `max_ms` milliseconds, chosen at random from `seed`.
#[allow(dead_code)]
pub fn jitter(seed: u64, max_ms: u64) {
    let mut rng: SmallRng = SmallRng::seed_from_u64(seed);
    thread::sleep(Duration::from_millis(rng.gen_range(0..=max_ms)));
}
