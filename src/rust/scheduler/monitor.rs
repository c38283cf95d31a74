// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::scheduler::{
    coroutine::Coroutine,
    handle::lock,
};
use ::std::{
    collections::VecDeque,
    fmt,
    mem,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
    thread,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Coroutines parked on a monitor, plus a count of the wake operations issued so far.
struct WaitList {
    parked: VecDeque<Coroutine>,
    wakes: u64,
}

/// Snapshot of a monitor's wake count, taken before checking the condition a coroutine is about to wait for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitTicket(u64);

/// Wait/notify primitive for coroutines. A coroutine that waits is parked in a FIFO wait-list and its worker moves on
/// to other work. Waking moves parked coroutines back to their schedulers; it never runs them on the caller's stack.
pub struct Monitor {
    list: Arc<Mutex<WaitList>>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Monitor {
    pub fn new() -> Self {
        Self {
            list: Arc::new(Mutex::new(WaitList {
                parked: VecDeque::new(),
                wakes: 0,
            })),
        }
    }

    /// Parks the calling coroutine until some other context wakes it.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a coroutine.
    pub fn wait(&self) {
        self.wait_ticket(self.prepare_wait());
    }

    /// Takes a ticket to be handed to [Monitor::wait_ticket] after the caller has checked its wait condition.
    pub fn prepare_wait(&self) -> WaitTicket {
        WaitTicket(lock(&self.list).wakes)
    }

    /// Parks the calling coroutine unless the target monitor was woken after `ticket` was taken, in which case the
    /// coroutine goes straight back to the ready queue.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a coroutine.
    pub fn wait_ticket(&self, ticket: WaitTicket) {
        let list: Arc<Mutex<WaitList>> = self.list.clone();
        Coroutine::suspend(move |coroutine: Coroutine| {
            let mut list: MutexGuard<WaitList> = lock(&list);
            if list.wakes != ticket.0 {
                drop(list);
                trace!("MONITOR: '{}' missed a wake, rescheduling", coroutine.name());
                coroutine.reschedule();
            } else {
                trace!("MONITOR: '{}' will wait", coroutine.name());
                list.parked.push_back(coroutine);
            }
        });
    }

    /// Wakes the coroutine that has been waiting the longest, if any.
    pub fn wake_one(&self) {
        let coroutine: Option<Coroutine> = {
            let mut list: MutexGuard<WaitList> = lock(&self.list);
            list.wakes = list.wakes.wrapping_add(1);
            list.parked.pop_front()
        };
        if let Some(coroutine) = coroutine {
            trace!("MONITOR: waking '{}'", coroutine.name());
            coroutine.reschedule();
        }
    }

    /// Wakes every waiting coroutine, in the order they started waiting.
    pub fn wake_all(&self) {
        let parked: VecDeque<Coroutine> = {
            let mut list: MutexGuard<WaitList> = lock(&self.list);
            list.wakes = list.wakes.wrapping_add(1);
            mem::take(&mut list.parked)
        };
        if !parked.is_empty() {
            trace!("MONITOR: waking {} coroutines", parked.len());
        }
        for coroutine in parked {
            coroutine.reschedule();
        }
    }

    /// Number of coroutines currently parked on the target monitor.
    pub fn waiting(&self) -> usize {
        lock(&self.list).parked.len()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list: MutexGuard<WaitList> = lock(&self.list);
        f.debug_struct("Monitor")
            .field("waiting", &list.parked.len())
            .field("wakes", &list.wakes)
            .finish()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }
        let waiting: usize = lock(&self.list).parked.len();
        assert_eq!(
            waiting, 0,
            "MonitorNotEmptyAtDestruction: {} coroutines still waiting",
            waiting
        );
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
