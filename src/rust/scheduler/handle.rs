// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::scheduler::{
    context,
    coroutine::{
        Coroutine,
        CoroutineState,
    },
};
use ::crossbeam_channel::{
    Receiver,
    Sender,
};
use ::std::{
    fmt,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Items travelling through the ready queue.
pub(crate) enum Runnable {
    Coroutine(Coroutine),
    /// Tells one worker to leave its dispatch loop.
    Shutdown,
}

/// State shared by a scheduler, its workers, and every coroutine it spawned.
pub(crate) struct SchedulerShared {
    /// Sending end of the ready queue.
    ready_tx: Sender<Runnable>,
    /// Receiving end of the ready queue. Workers hold clones of it.
    ready_rx: Receiver<Runnable>,
    /// Number of spawned coroutines that have not finished yet.
    live: Mutex<usize>,
    /// Signaled when `live` drops to zero.
    quiescent: Condvar,
    /// Number of coroutines parked outside the ready queue.
    waiting: AtomicUsize,
    /// Name of the coroutine running on each worker.
    running: Box<[Mutex<Option<Arc<str>>>]>,
    /// Stack size of new coroutines, in bytes.
    stack_size: usize,
}

/// Cloneable reference to a scheduler. Spawns coroutines and hands parked coroutines back to the ready queue from any
/// thread.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<SchedulerShared>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl SchedulerHandle {
    pub(crate) fn new(worker_count: usize, stack_size: usize) -> Self {
        let (ready_tx, ready_rx): (Sender<Runnable>, Receiver<Runnable>) = ::crossbeam_channel::unbounded();
        let running: Box<[Mutex<Option<Arc<str>>>]> = (0..worker_count).map(|_| Mutex::new(None)).collect();
        Self {
            shared: Arc::new(SchedulerShared {
                ready_tx,
                ready_rx,
                live: Mutex::new(0),
                quiescent: Condvar::new(),
                waiting: AtomicUsize::new(0),
                running,
                stack_size,
            }),
        }
    }

    /// Spawns a coroutine named `name` that runs `entry`. Returns immediately; completion is only observable in
    /// aggregate through [crate::scheduler::Scheduler::wait].
    pub fn go<F>(&self, name: &str, entry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let coroutine: Coroutine = Coroutine::new(name, self.clone(), self.shared.stack_size, entry);
        trace!("go(): spawning '{}' (id={})", coroutine.name(), coroutine.id());
        *lock(&self.shared.live) += 1;
        self.push(coroutine);
    }

    /// Makes a parked coroutine ready again. This is the only way back into the ready queue.
    ///
    /// # Panics
    ///
    /// Panics if the coroutine is not parked or belongs to another scheduler.
    pub fn enqueue(&self, coroutine: Coroutine) {
        assert!(
            self.same_as(coroutine.scheduler()),
            "ForeignCoroutine: '{}' belongs to another scheduler",
            coroutine.name()
        );
        assert_eq!(
            coroutine.state(),
            CoroutineState::Waiting,
            "only parked coroutines can be enqueued ('{}')",
            coroutine.name()
        );
        self.shared.waiting.fetch_sub(1, Ordering::AcqRel);
        self.push(coroutine);
    }

    /// Makes every coroutine in `coroutines` ready again.
    pub fn enqueue_all<I>(&self, coroutines: I)
    where
        I: IntoIterator<Item = Coroutine>,
    {
        for coroutine in coroutines {
            self.enqueue(coroutine);
        }
    }

    /// Checks whether `other` refers to the same scheduler as the target handle.
    pub fn same_as(&self, other: &SchedulerHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn push(&self, mut coroutine: Coroutine) {
        coroutine.set_state(CoroutineState::Ready);
        // The queue cannot be disconnected: the shared state keeps a receiver alive.
        if let Err(e) = self.shared.ready_tx.send(Runnable::Coroutine(coroutine)) {
            error!("push(): ready queue disconnected, dropping a coroutine ({:?})", e.0.kind());
        }
    }

    /// Tells one worker to stop.
    pub(crate) fn shutdown_one(&self) {
        if self.shared.ready_tx.send(Runnable::Shutdown).is_err() {
            warn!("shutdown_one(): ready queue disconnected");
        }
    }

    /// Blocks the calling thread until every spawned coroutine has finished.
    pub(crate) fn wait_quiescent(&self) {
        assert!(
            !context::in_worker(),
            "waiting for quiescence from a worker thread would deadlock"
        );
        let live: MutexGuard<usize> = lock(&self.shared.live);
        let _live: MutexGuard<usize> = self
            .shared
            .quiescent
            .wait_while(live, |live: &mut usize| *live > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Accounts for a finished coroutine.
    pub(crate) fn reap(&self) {
        let mut live: MutexGuard<usize> = lock(&self.shared.live);
        *live -= 1;
        if *live == 0 {
            self.shared.quiescent.notify_all();
        }
    }

    /// Accounts for a coroutine that just suspended.
    pub(crate) fn parked(&self) {
        self.shared.waiting.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn set_running(&self, worker: usize, name: Option<Arc<str>>) {
        *lock(&self.shared.running[worker]) = name;
    }

    pub(crate) fn ready_receiver(&self) -> Receiver<Runnable> {
        self.shared.ready_rx.clone()
    }

    /// Number of coroutines spawned on the target scheduler that have not finished yet.
    pub fn live(&self) -> usize {
        *lock(&self.shared.live)
    }

    /// Number of coroutines currently parked in wait-lists or on pending I/O.
    pub fn waiting(&self) -> usize {
        self.shared.waiting.load(Ordering::Acquire)
    }

    /// Number of coroutines sitting in the ready queue.
    pub fn ready(&self) -> usize {
        self.shared.ready_rx.len()
    }

    /// Name of the coroutine running on each worker, by worker index.
    pub fn running(&self) -> Vec<Option<String>> {
        self.shared
            .running
            .iter()
            .map(|slot| lock(slot).as_deref().map(str::to_string))
            .collect()
    }
}

impl Runnable {
    fn kind(&self) -> &'static str {
        match self {
            Runnable::Coroutine(_) => "coroutine",
            Runnable::Shutdown => "shutdown",
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("workers", &self.shared.running.len())
            .field("live", &self.live())
            .field("waiting", &self.waiting())
            .finish()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Locks a mutex, ignoring poisoning: every critical section in this crate leaves its data consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
