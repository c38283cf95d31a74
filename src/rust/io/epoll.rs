// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Linux event demultiplexer.
//!
//! A dedicated poller thread blocks in `epoll_wait()` and discharges the callbacks of every file descriptor that
//! becomes ready. Registrations are one-shot: once an event fires, the file descriptor is re-armed only for the
//! interest that still has callbacks waiting. An `eventfd` registered alongside lets [Epoll] interrupt the poller
//! when it shuts down.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    io::demux::{
        EventDemultiplexer,
        Interest,
        ReadinessCallback,
    },
    runtime::{
        fail::Fail,
        limits::MAX_POLL_EVENTS,
    },
    scheduler::handle::lock,
};
use ::libc::{
    c_int,
    epoll_event,
    EFD_CLOEXEC,
    EFD_NONBLOCK,
    ECANCELED,
    EINTR,
    ENOENT,
    EPOLLERR,
    EPOLLHUP,
    EPOLLIN,
    EPOLLONESHOT,
    EPOLLOUT,
    EPOLL_CLOEXEC,
    EPOLL_CTL_ADD,
    EPOLL_CTL_DEL,
    EPOLL_CTL_MOD,
};
use ::std::{
    collections::HashMap,
    mem,
    os::fd::{
        AsRawFd,
        FromRawFd,
        OwnedFd,
        RawFd,
    },
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        Mutex,
        MutexGuard,
    },
    thread::{
        self,
        JoinHandle,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Token identifying the shutdown eventfd in epoll events. File descriptors are never negative, so this cannot clash.
const WAKE_TOKEN: u64 = u64::MAX;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Callbacks waiting on one file descriptor.
#[derive(Default)]
struct Registration {
    readable: Vec<ReadinessCallback>,
    writable: Vec<ReadinessCallback>,
    /// Whether the file descriptor is known to the epoll instance.
    added: bool,
}

/// State shared with the poller thread.
struct EpollShared {
    epoll_fd: OwnedFd,
    wake_fd: OwnedFd,
    registrations: Mutex<HashMap<RawFd, Registration>>,
    shutdown: AtomicBool,
}

/// Epoll-based event demultiplexer.
pub struct Epoll {
    shared: Arc<EpollShared>,
    poller: Option<JoinHandle<()>>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Registration {
    /// Epoll event mask for the callbacks still pending.
    fn events(&self) -> u32 {
        let mut events: u32 = EPOLLONESHOT as u32;
        if !self.readable.is_empty() {
            events |= EPOLLIN as u32;
        }
        if !self.writable.is_empty() {
            events |= EPOLLOUT as u32;
        }
        events
    }

    fn is_idle(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty()
    }

    fn drain(&mut self) -> Vec<ReadinessCallback> {
        let mut callbacks: Vec<ReadinessCallback> = mem::take(&mut self.readable);
        callbacks.append(&mut self.writable);
        callbacks
    }
}

impl EpollShared {
    fn ctl(&self, op: c_int, fd: RawFd, events: u32) -> Result<(), Fail> {
        let mut event: epoll_event = epoll_event { events, u64: fd as u64 };
        match unsafe { libc::epoll_ctl(self.epoll_fd.as_raw_fd(), op, fd, &mut event) } {
            0 => Ok(()),
            _ => Err(Fail::last_os_error("epoll_ctl() failed")),
        }
    }

    /// Pokes the poller thread out of `epoll_wait()`.
    fn wake(&self) {
        let one: u64 = 1;
        let ret: isize = unsafe {
            libc::write(
                self.wake_fd.as_raw_fd(),
                &one as *const u64 as *const libc::c_void,
                mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            warn!("wake(): failed to signal poller ({:?})", Fail::last_os_error("write() failed"));
        }
    }
}

impl Epoll {
    /// Creates an epoll instance and starts its poller thread.
    pub fn new() -> Result<Self, Fail> {
        let epoll_fd: OwnedFd = match unsafe { libc::epoll_create1(EPOLL_CLOEXEC) } {
            fd if fd >= 0 => unsafe { OwnedFd::from_raw_fd(fd) },
            _ => {
                let cause: Fail = Fail::last_os_error("epoll_create1() failed");
                error!("new(): {:?}", cause);
                return Err(cause);
            },
        };
        let wake_fd: OwnedFd = match unsafe { libc::eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) } {
            fd if fd >= 0 => unsafe { OwnedFd::from_raw_fd(fd) },
            _ => {
                let cause: Fail = Fail::last_os_error("eventfd() failed");
                error!("new(): {:?}", cause);
                return Err(cause);
            },
        };

        let shared: Arc<EpollShared> = Arc::new(EpollShared {
            epoll_fd,
            wake_fd,
            registrations: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        });

        let mut event: epoll_event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };
        if unsafe {
            libc::epoll_ctl(
                shared.epoll_fd.as_raw_fd(),
                EPOLL_CTL_ADD,
                shared.wake_fd.as_raw_fd(),
                &mut event,
            )
        } != 0
        {
            return Err(Fail::last_os_error("failed to register eventfd"));
        }

        let shared_: Arc<EpollShared> = shared.clone();
        let poller: JoinHandle<()> = thread::Builder::new()
            .name("epoll-poller".to_string())
            .spawn(move || poll(shared_))?;

        Ok(Self {
            shared,
            poller: Some(poller),
        })
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl EventDemultiplexer for Epoll {
    fn register(&self, fd: RawFd, interest: Interest, callback: ReadinessCallback) {
        let mut registrations: MutexGuard<HashMap<RawFd, Registration>> = lock(&self.shared.registrations);
        if self.shared.shutdown.load(Ordering::Acquire) {
            drop(registrations);
            callback(Err(Fail::new(ECANCELED, "demultiplexer shut down")));
            return;
        }

        let registration: &mut Registration = registrations.entry(fd).or_default();
        match interest {
            Interest::Readable => registration.readable.push(callback),
            Interest::Writable => registration.writable.push(callback),
        }
        let op: c_int = if registration.added {
            EPOLL_CTL_MOD
        } else {
            EPOLL_CTL_ADD
        };

        match self.shared.ctl(op, fd, registration.events()) {
            Ok(()) => {
                trace!("register(): fd={} interest={:?}", fd, interest);
                registration.added = true;
            },
            Err(e) => {
                warn!("register(): failed to watch fd={} ({:?})", fd, e);
                let callback: Option<ReadinessCallback> = match interest {
                    Interest::Readable => registration.readable.pop(),
                    Interest::Writable => registration.writable.pop(),
                };
                if registration.is_idle() && !registration.added {
                    registrations.remove(&fd);
                }
                drop(registrations);
                if let Some(callback) = callback {
                    callback(Err(e));
                }
            },
        }
    }

    fn deregister(&self, fd: RawFd) {
        let registration: Option<Registration> = lock(&self.shared.registrations).remove(&fd);
        let mut registration: Registration = match registration {
            Some(registration) => registration,
            None => return,
        };
        if registration.added {
            if let Err(e) = self.shared.ctl(EPOLL_CTL_DEL, fd, 0) {
                if e.errno != ENOENT {
                    debug!("deregister(): fd={} ({:?})", fd, e);
                }
            }
        }
        for callback in registration.drain() {
            callback(Err(Fail::new(ECANCELED, "interest withdrawn")));
        }
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake();
        if let Some(poller) = self.poller.take() {
            if poller.join().is_err() {
                error!("drop(): poller thread panicked");
            }
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Body of the poller thread.
fn poll(shared: Arc<EpollShared>) {
    let mut events: Vec<epoll_event> = vec![epoll_event { events: 0, u64: 0 }; MAX_POLL_EVENTS];
    debug!("poll(): poller started");

    loop {
        let ready: usize = match unsafe {
            libc::epoll_wait(
                shared.epoll_fd.as_raw_fd(),
                events.as_mut_ptr(),
                MAX_POLL_EVENTS as c_int,
                -1,
            )
        } {
            n if n >= 0 => n as usize,
            _ => {
                let cause: Fail = Fail::last_os_error("epoll_wait() failed");
                if cause.errno == EINTR {
                    continue;
                }
                error!("poll(): {:?}", cause);
                break;
            },
        };

        let mut fired: Vec<ReadinessCallback> = Vec::new();
        let mut failed: Vec<(ReadinessCallback, Fail)> = Vec::new();
        {
            let mut registrations: MutexGuard<HashMap<RawFd, Registration>> = lock(&shared.registrations);
            for event in &events[..ready] {
                // Copy out of the packed struct before use.
                let token: u64 = event.u64;
                let flags: u32 = event.events;
                if token == WAKE_TOKEN {
                    continue;
                }

                let fd: RawFd = token as RawFd;
                let registration: &mut Registration = match registrations.get_mut(&fd) {
                    Some(registration) => registration,
                    None => continue,
                };
                let error: bool = flags & (EPOLLERR | EPOLLHUP) as u32 != 0;
                if error || flags & EPOLLIN as u32 != 0 {
                    fired.append(&mut registration.readable);
                }
                if error || flags & EPOLLOUT as u32 != 0 {
                    fired.append(&mut registration.writable);
                }

                // Re-arm for whatever is still awaited.
                if !registration.is_idle() {
                    if let Err(e) = shared.ctl(EPOLL_CTL_MOD, fd, registration.events()) {
                        warn!("poll(): failed to re-arm fd={} ({:?})", fd, e);
                        for callback in registration.drain() {
                            failed.push((callback, e.clone()));
                        }
                    }
                }
            }
        }

        trace!("poll(): {} events, {} callbacks", ready, fired.len());
        for callback in fired {
            callback(Ok(()));
        }
        for (callback, e) in failed {
            callback(Err(e));
        }

        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
    }

    let pending: Vec<ReadinessCallback> = lock(&shared.registrations)
        .drain()
        .flat_map(|(_, mut registration)| registration.drain())
        .collect();
    if !pending.is_empty() {
        warn!("poll(): discarding {} pending registrations", pending.len());
    }
    for callback in pending {
        callback(Err(Fail::new(ECANCELED, "demultiplexer shut down")));
    }
    debug!("poll(): poller stopped");
}
