// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::scheduler::{
    context,
    execution::ExecutionContext,
    handle::SchedulerHandle,
};
use ::std::{
    any::Any,
    fmt,
    mem::ManuallyDrop,
    panic::{
        self,
        AssertUnwindSafe,
    },
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
    },
    thread,
};

//======================================================================================================================
// Types
//======================================================================================================================

/// Runs on the worker right after a coroutine suspended, with ownership of it. Parks the coroutine wherever it
/// belongs (a wait-list, a pending I/O operation, the ready queue).
pub type SuspendHook = Box<dyn FnOnce(Coroutine) + Send>;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Lifecycle of a coroutine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoroutineState {
    /// Constructed, not yet handed to a scheduler.
    Created,
    /// Sitting in a ready queue.
    Ready,
    /// Executing on a worker.
    Running,
    /// Parked until something hands it back to its scheduler.
    Waiting,
    /// Entry function returned (or panicked).
    Finished,
}

/// Unique identifier of a coroutine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoroutineId(u64);

/// What a coroutine hands back to the worker that resumed it.
pub enum Transfer {
    /// The coroutine suspended; the hook must take ownership of it.
    Suspended(SuspendHook),
    /// The entry function returned.
    Finished,
}

/// A cooperatively scheduled unit of work with its own stack.
///
/// A coroutine is always owned by exactly one container: a ready queue, a wait-list, a pending I/O callback, or the
/// worker running it. It cannot be cloned; handing it over is a move.
pub struct Coroutine {
    id: CoroutineId,
    name: Arc<str>,
    state: CoroutineState,
    /// Scheduler this coroutine goes back to when it is woken.
    scheduler: SchedulerHandle,
    /// Released only once the entry function has returned; an unfinished stack is never unwound from outside.
    context: ManuallyDrop<ExecutionContext<Transfer>>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl CoroutineId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Coroutine {
    /// Creates a coroutine that will run `entry` on a fresh stack of `stack_size` bytes once a worker of `scheduler`
    /// picks it up.
    pub(crate) fn new<F>(name: &str, scheduler: SchedulerHandle, stack_size: usize, entry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let id: CoroutineId = CoroutineId::next();
        let name: Arc<str> = Arc::from(name);
        let name_: Arc<str> = name.clone();
        let context: ExecutionContext<Transfer> = ExecutionContext::new(stack_size, move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(entry)) {
                // Cancellation of an abandoned coroutine unwinds through here too; let it through.
                if payload.is::<::generator::Error>() {
                    panic::resume_unwind(payload);
                }
                error!("coroutine '{}' panicked: {}", name_, panic_message(payload.as_ref()));
            }
            Transfer::Finished
        });

        Self {
            id,
            name,
            state: CoroutineState::Created,
            scheduler,
            context: ManuallyDrop::new(context),
        }
    }

    pub fn id(&self) -> CoroutineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn state(&self) -> CoroutineState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: CoroutineState) {
        self.state = state;
    }

    /// Scheduler that owns the target coroutine.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Hands the target coroutine back to its scheduler's ready queue.
    pub fn reschedule(self) {
        let scheduler: SchedulerHandle = self.scheduler.clone();
        scheduler.enqueue(self);
    }

    /// Runs the target coroutine until its next suspension point. Only workers do this.
    pub(crate) fn resume(&mut self) -> Transfer {
        match self.context.resume() {
            Some(transfer) => transfer,
            None => Transfer::Finished,
        }
    }

    /// Suspends the calling coroutine. Once it is off its stack, the worker invokes `on_suspend` with ownership of
    /// the coroutine; whoever ends up holding it later hands it back to the scheduler to resume it.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a coroutine.
    pub fn suspend<F>(on_suspend: F)
    where
        F: FnOnce(Coroutine) + Send + 'static,
    {
        if !context::in_coroutine() {
            panic!("NoCurrentCoroutine: suspend() must be called from a coroutine");
        }
        ExecutionContext::<Transfer>::suspend(Transfer::Suspended(Box::new(on_suspend)));
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Drop trait implementation. Coroutines are only destroyed after they finished.
///
/// # Panics
///
/// Panics if the coroutine has not finished: whoever held it lost it instead of handing it back to its scheduler.
impl Drop for Coroutine {
    fn drop(&mut self) {
        if self.state == CoroutineState::Finished {
            // Safety: the context is dropped exactly once, here.
            unsafe { ManuallyDrop::drop(&mut self.context) };
            return;
        }
        // Leaks the stack of the lost coroutine.
        if thread::panicking() {
            return;
        }
        panic!(
            "CoroutineDroppedUnfinished: '{}' (id={}) dropped while {:?}",
            self.name, self.id, self.state
        );
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Suspends the calling coroutine and immediately puts it back at the end of its scheduler's ready queue.
///
/// # Panics
///
/// Panics if called outside of a coroutine.
pub fn yield_now() {
    Coroutine::suspend(|coroutine: Coroutine| coroutine.reschedule());
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
