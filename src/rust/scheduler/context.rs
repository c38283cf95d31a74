// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Per-worker scheduler context and its dispatch loop.
//!
//! Each worker thread owns one [SchedulerContext]. The context pulls ready coroutines from the shared queue, switches
//! into them, and files them according to how they came back: finished coroutines are reaped, suspended ones are
//! handed to the hook they suspended with.
//!
//! While a coroutine runs, the worker records a [CurrentCoroutine] in a thread-local so that code on the coroutine's
//! stack can find out who it is and which scheduler it belongs to. The record is cleared before the coroutine is
//! handed to anybody else.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::scheduler::{
    coroutine::{
        Coroutine,
        CoroutineId,
        CoroutineState,
        Transfer,
    },
    handle::{
        Runnable,
        SchedulerHandle,
    },
};
use ::crossbeam_channel::Receiver;
use ::std::{
    cell::{
        Cell,
        RefCell,
    },
    sync::Arc,
};

//======================================================================================================================
// Thread Locals
//======================================================================================================================

thread_local! {
    /// Coroutine running on this thread, if any.
    static CURRENT: RefCell<Option<CurrentCoroutine>> = const { RefCell::new(None) };
    /// Index of the worker driven by this thread, if it is a worker.
    static WORKER: Cell<Option<usize>> = const { Cell::new(None) };
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Describes the coroutine executing on the calling thread. Does not own it.
#[derive(Clone, Debug)]
pub struct CurrentCoroutine {
    id: CoroutineId,
    name: Arc<str>,
    scheduler: SchedulerHandle,
}

/// Dispatch loop state of one worker thread.
pub(crate) struct SchedulerContext {
    index: usize,
    scheduler: SchedulerHandle,
    ready: Receiver<Runnable>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl CurrentCoroutine {
    pub fn id(&self) -> CoroutineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scheduler the current coroutine belongs to.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }
}

impl SchedulerContext {
    pub(crate) fn new(index: usize, scheduler: SchedulerHandle, ready: Receiver<Runnable>) -> Self {
        Self {
            index,
            scheduler,
            ready,
        }
    }

    /// Runs the dispatch loop until the scheduler asks this worker to stop.
    pub(crate) fn run(self) {
        WORKER.with(|worker| worker.set(Some(self.index)));
        debug!("run(): worker {} started", self.index);

        loop {
            // Blocks this thread, not a coroutine, while nothing is ready.
            let coroutine: Coroutine = match self.ready.recv() {
                Ok(Runnable::Coroutine(coroutine)) => coroutine,
                Ok(Runnable::Shutdown) => break,
                Err(_) => {
                    warn!("run(): ready queue disconnected (worker={})", self.index);
                    break;
                },
            };
            self.dispatch(coroutine);
        }

        debug!("run(): worker {} stopped", self.index);
        WORKER.with(|worker| worker.set(None));
    }

    /// Resumes one coroutine and files it once it comes back.
    fn dispatch(&self, mut coroutine: Coroutine) {
        debug_assert_eq!(coroutine.state(), CoroutineState::Ready);
        coroutine.set_state(CoroutineState::Running);
        self.scheduler.set_running(self.index, Some(coroutine.shared_name()));
        set_current(Some(CurrentCoroutine {
            id: coroutine.id(),
            name: coroutine.shared_name(),
            scheduler: coroutine.scheduler().clone(),
        }));

        let transfer: Transfer = coroutine.resume();

        set_current(None);
        self.scheduler.set_running(self.index, None);

        match transfer {
            Transfer::Suspended(on_suspend) => {
                trace!("dispatch(): '{}' suspended (worker={})", coroutine.name(), self.index);
                coroutine.set_state(CoroutineState::Waiting);
                self.scheduler.parked();
                // The coroutine is entirely off its stack now, so it is safe to hand it over.
                on_suspend(coroutine);
            },
            Transfer::Finished => {
                trace!("dispatch(): '{}' finished (worker={})", coroutine.name(), self.index);
                coroutine.set_state(CoroutineState::Finished);
                drop(coroutine);
                self.scheduler.reap();
            },
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Returns the coroutine executing on the calling thread, or `None` outside of a coroutine (including the worker's
/// own dispatch loop).
#[inline(never)]
pub fn current_coroutine() -> Option<CurrentCoroutine> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Checks whether the calling code runs on a coroutine's stack.
#[inline(never)]
pub(crate) fn in_coroutine() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

/// Checks whether the calling thread is a worker thread.
#[inline(never)]
pub(crate) fn in_worker() -> bool {
    WORKER.with(|worker| worker.get().is_some())
}

// Coroutines may migrate between threads across a suspension, so thread-local accessors are never inlined into
// coroutine code.
#[inline(never)]
fn set_current(current: Option<CurrentCoroutine>) {
    CURRENT.with(|slot| *slot.borrow_mut() = current);
}
