// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub(crate) mod context;
pub mod coroutine;
pub mod execution;
pub(crate) mod handle;
pub mod monitor;
pub mod scheduler;

//==============================================================================
// Exports
//==============================================================================

pub use self::{
    context::{
        current_coroutine,
        CurrentCoroutine,
    },
    coroutine::{
        yield_now,
        Coroutine,
        CoroutineId,
        CoroutineState,
    },
    handle::SchedulerHandle,
    monitor::{
        Monitor,
        WaitTicket,
    },
    scheduler::{
        go,
        Scheduler,
        SchedulerDump,
    },
};
