// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Implementation of our multi-threaded coroutine scheduler.
//!
//! A scheduler owns a fixed pool of worker threads that share a single FIFO ready queue. Each worker runs a
//! [SchedulerContext] dispatch loop. Coroutines are spawned with [Scheduler::go] (or the free [go] from inside a
//! coroutine) and run until they suspend or finish; [Scheduler::wait] blocks the calling thread until every spawned
//! coroutine has finished.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        config::{
            self,
            Config,
        },
        fail::Fail,
        limits,
        logging,
    },
    scheduler::{
        context::{
            self,
            CurrentCoroutine,
            SchedulerContext,
        },
        handle::SchedulerHandle,
    },
};
use ::std::{
    fmt,
    thread::{
        self,
        JoinHandle,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Coroutine scheduler.
pub struct Scheduler {
    handle: SchedulerHandle,
    workers: Vec<JoinHandle<()>>,
}

/// Snapshot of a scheduler's state, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerDump {
    /// Name of the coroutine running on each worker, by worker index.
    pub running: Vec<Option<String>>,
    /// Coroutines sitting in the ready queue.
    pub ready: usize,
    /// Coroutines spawned and not finished yet.
    pub live: usize,
    /// Coroutines parked in wait-lists or on pending I/O.
    pub waiting: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Scheduler {
    /// Creates a scheduler with `worker_count` worker threads (at least one) and default-sized coroutine stacks.
    pub fn new(worker_count: usize) -> Result<Self, Fail> {
        logging::initialize();
        Self::with_params(worker_count, limits::DEFAULT_STACK_SIZE)
    }

    /// Creates a scheduler from the `scheduler` section of a configuration.
    pub fn with_config(config: &Config) -> Result<Self, Fail> {
        match config.log_level()? {
            Some(level) => logging::initialize_with(&level),
            None => logging::initialize(),
        }
        Self::with_params(config.worker_threads()?, config.stack_size()?)
    }

    fn with_params(worker_count: usize, stack_size: usize) -> Result<Self, Fail> {
        let worker_count: usize = worker_count.max(1);
        let handle: SchedulerHandle = SchedulerHandle::new(worker_count, stack_size);
        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let worker: SchedulerContext = SchedulerContext::new(index, handle.clone(), handle.ready_receiver());
            let thread: JoinHandle<()> = match thread::Builder::new()
                .name(format!("coroutine-worker-{}", index))
                .spawn(move || worker.run())
            {
                Ok(thread) => thread,
                Err(e) => {
                    let cause: String = format!("failed to spawn worker thread (index={}, error={:?})", index, e);
                    error!("with_params(): {}", cause);
                    // Tear down the workers that did start.
                    for _ in 0..workers.len() {
                        handle.shutdown_one();
                    }
                    for thread in workers.drain(..) {
                        let _ = thread.join();
                    }
                    return Err(Fail::new(e.raw_os_error().unwrap_or(::libc::EAGAIN), &cause));
                },
            };
            workers.push(thread);
        }

        debug!("with_params(): started {} workers (stack_size={})", worker_count, stack_size);
        Ok(Self { handle, workers })
    }

    /// Spawns a coroutine named `name` that runs `entry`. Returns immediately.
    pub fn go<F>(&self, name: &str, entry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.go(name, entry);
    }

    /// Blocks the calling thread until every coroutine spawned on this scheduler has finished. Returns immediately if
    /// nothing was spawned.
    ///
    /// # Panics
    ///
    /// Panics if called from a coroutine or a worker thread.
    pub fn wait(&self) {
        assert!(
            !context::in_coroutine(),
            "wait() called from a coroutine would deadlock its worker"
        );
        self.handle.wait_quiescent();
    }

    /// Takes a snapshot of the scheduler's state and logs it.
    pub fn debug_dump(&self) -> SchedulerDump {
        let dump: SchedulerDump = SchedulerDump {
            running: self.handle.running(),
            ready: self.handle.ready(),
            live: self.handle.live(),
            waiting: self.handle.waiting(),
        };
        info!("{}", dump);
        dump
    }

    /// Returns a cloneable handle to the target scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Default trait implementation. Starts one worker per available CPU.
///
/// # Panics
///
/// Panics if the worker threads cannot be started.
impl Default for Scheduler {
    fn default() -> Self {
        match Self::new(config::default_worker_threads()) {
            Ok(scheduler) => scheduler,
            Err(e) => panic!("failed to start scheduler ({:?})", e),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let live: usize = self.handle.live();
        if live > 0 {
            warn!("drop(): shutting down with {} unfinished coroutines", live);
        }
        for _ in 0..self.workers.len() {
            self.handle.shutdown_one();
        }
        for thread in self.workers.drain(..) {
            if thread.join().is_err() {
                error!("drop(): worker thread panicked");
            }
        }
    }
}

impl fmt::Display for SchedulerDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scheduler: live={} ready={} waiting={}",
            self.live, self.ready, self.waiting
        )?;
        for (index, running) in self.running.iter().enumerate() {
            match running {
                Some(name) => writeln!(f, "  worker {}: running '{}'", index, name)?,
                None => writeln!(f, "  worker {}: idle", index)?,
            }
        }
        Ok(())
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Spawns a coroutine on the scheduler of the calling coroutine.
///
/// # Panics
///
/// Panics if called outside of a coroutine.
pub fn go<F>(name: &str, entry: F)
where
    F: FnOnce() + Send + 'static,
{
    let current: CurrentCoroutine = match context::current_coroutine() {
        Some(current) => current,
        None => panic!("NoCurrentCoroutine: go() must be called from a coroutine"),
    };
    current.scheduler().go(name, entry);
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
