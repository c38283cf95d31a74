// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    io::{
        demux::{
            EventDemultiplexer,
            Interest,
        },
        epoll::Epoll,
    },
    runtime::fail::Fail,
    scheduler::{
        handle::lock,
        Coroutine,
    },
};
use ::libc::EIO;
use ::std::{
    fmt,
    os::fd::RawFd,
    sync::{
        Arc,
        Mutex,
        OnceLock,
    },
};

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Process-wide bridge used by sockets.
static GLOBAL: OnceLock<IoBridge> = OnceLock::new();

//======================================================================================================================
// Structures
//======================================================================================================================

/// Connects coroutines to an event demultiplexer: a coroutine waiting for I/O readiness is suspended, and the
/// demultiplexer's completion puts it back on its scheduler's ready queue.
#[derive(Clone)]
pub struct IoBridge {
    demux: Arc<dyn EventDemultiplexer>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl IoBridge {
    pub fn new(demux: Arc<dyn EventDemultiplexer>) -> Self {
        Self { demux }
    }

    /// Returns the process-wide bridge, starting its demultiplexer on first use.
    pub fn global() -> Result<&'static IoBridge, Fail> {
        if let Some(bridge) = GLOBAL.get() {
            return Ok(bridge);
        }
        let bridge: IoBridge = IoBridge::new(Arc::new(Epoll::new()?));
        // Losing a race here drops the spare demultiplexer.
        Ok(GLOBAL.get_or_init(|| bridge))
    }

    /// Suspends the calling coroutine until `fd` is ready for `interest`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a coroutine.
    pub fn wait(&self, fd: RawFd, interest: Interest) -> Result<(), Fail> {
        let outcome: Arc<Mutex<Option<Result<(), Fail>>>> = Arc::new(Mutex::new(None));

        let outcome_: Arc<Mutex<Option<Result<(), Fail>>>> = outcome.clone();
        let demux: Arc<dyn EventDemultiplexer> = self.demux.clone();
        Coroutine::suspend(move |coroutine: Coroutine| {
            trace!("wait(): '{}' waits for fd={} {:?}", coroutine.name(), fd, interest);
            demux.register(
                fd,
                interest,
                Box::new(move |result: Result<(), Fail>| {
                    *lock(&outcome_) = Some(result);
                    coroutine.reschedule();
                }),
            );
        });

        let result: Option<Result<(), Fail>> = lock(&outcome).take();
        match result {
            Some(result) => result,
            None => Err(Fail::new(EIO, "resumed without a readiness outcome")),
        }
    }

    pub fn wait_readable(&self, fd: RawFd) -> Result<(), Fail> {
        self.wait(fd, Interest::Readable)
    }

    pub fn wait_writable(&self, fd: RawFd) -> Result<(), Fail> {
        self.wait(fd, Interest::Writable)
    }

    /// Withdraws interest in `fd`. Coroutines still waiting on it resume with an error.
    pub fn deregister(&self, fd: RawFd) {
        self.demux.deregister(fd);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for IoBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBridge").finish_non_exhaustive()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
