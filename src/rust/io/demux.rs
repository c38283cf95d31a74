// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::os::fd::RawFd;

//======================================================================================================================
// Types
//======================================================================================================================

/// Continuation invoked once a file descriptor becomes ready, or with the reason it never will.
pub type ReadinessCallback = Box<dyn FnOnce(Result<(), Fail>) + Send>;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Readiness a caller is interested in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// Source of readiness notifications for file descriptors.
///
/// Every callback handed to [EventDemultiplexer::register] is invoked exactly once: with `Ok(())` when the file
/// descriptor becomes ready (or reports an error condition, which the next I/O call will surface), or with an error
/// if the registration failed, was withdrawn, or the demultiplexer shut down. Callbacks may run on any thread,
/// including the caller's, and are never invoked while the demultiplexer holds internal locks.
pub trait EventDemultiplexer: Send + Sync {
    /// Arranges for `callback` to be invoked once `fd` is ready for `interest`.
    fn register(&self, fd: RawFd, interest: Interest, callback: ReadinessCallback);

    /// Withdraws all interest in `fd`. Pending callbacks are discharged with an error.
    fn deregister(&self, fd: RawFd);
}
