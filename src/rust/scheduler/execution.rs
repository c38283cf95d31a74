// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Execution contexts: a stack of their own plus a saved resume point.
//!
//! This is the only place that knows how stacks are switched. The coroutine layer creates a context, resumes it, and
//! from inside it hands a transfer value back to whoever resumed it. Stacks are allocated and switched by the
//! [generator] crate, whose generators may be resumed from a different OS thread than the one they last ran on.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::generator::{
    Generator,
    Gn,
};
use ::std::{
    any::Any,
    mem,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// An execution context that runs an entry function on its own stack and exchanges values of type `T` with the
/// context that resumes it.
pub struct ExecutionContext<T: Any + Send> {
    generator: Generator<'static, (), T>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<T: Any + Send> ExecutionContext<T> {
    /// Allocates a stack of `stack_size` bytes and prepares `entry` to run on it. Nothing runs until the first
    /// [ExecutionContext::resume].
    pub fn new<F>(stack_size: usize, entry: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        // The generator crate sizes stacks in machine words.
        let words: usize = stack_size / mem::size_of::<usize>();
        Self {
            generator: Gn::<()>::new_opt(words, entry),
        }
    }

    /// Switches into the target context and runs it until it suspends or its entry function returns. Returns the
    /// value it transferred out, or `None` if it had already finished.
    pub fn resume(&mut self) -> Option<T> {
        self.generator.resume()
    }

    /// Checks whether the entry function of the target context has returned.
    pub fn is_done(&self) -> bool {
        self.generator.is_done()
    }

    /// Switches from the running context back to the one that resumed it, transferring `value`. Returns when the
    /// context is resumed again.
    ///
    /// Must only be called on the stack of an [ExecutionContext] of the same transfer type.
    pub fn suspend(value: T) {
        // Coroutines suspend from arbitrarily deep frames, where the generator's scope handle is not in reach.
        #[allow(deprecated)]
        ::generator::yield_with(value);
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
