// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    channel::{
        self,
        ChannelImpl,
        Reader,
        Writer,
    },
    collections::ring::{
        Consumer,
        Producer,
        RingBuffer,
    },
    runtime::fail::ChannelClosed,
    scheduler::handle::lock,
};
use ::std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Condvar,
    Mutex,
    MutexGuard,
    PoisonError,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A channel whose blocking operations block the calling OS thread. Meant for plain threads: a coroutine blocking here
/// would stall its whole worker.
pub struct ThreadedChannel<T> {
    producer: Mutex<Producer<T>>,
    consumer: Mutex<Consumer<T>>,
    /// Only set while holding `state`.
    closed: AtomicBool,
    /// Serializes waiting on and signaling `cv`.
    state: Mutex<()>,
    cv: Condvar,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<T> ThreadedChannel<T> {
    fn new(ring: RingBuffer<T>) -> Self {
        let (producer, consumer): (Producer<T>, Consumer<T>) = ring.split();
        Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            closed: AtomicBool::new(false),
            state: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wakes every blocked thread so it re-checks its condition.
    fn notify(&self) {
        let _state: MutexGuard<()> = lock(&self.state);
        self.cv.notify_all();
    }

    fn close(&self) {
        let _state: MutexGuard<()> = lock(&self.state);
        if !self.closed.swap(true, Ordering::AcqRel) {
            trace!("close(): channel closed");
        }
        self.cv.notify_all();
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T: Send> ChannelImpl<T> for ThreadedChannel<T> {
    fn put(&self, value: T) -> Result<(), ChannelClosed> {
        let mut producer: MutexGuard<Producer<T>> = lock(&self.producer);
        if self.is_closed() {
            return Err(ChannelClosed);
        }

        // Fast path.
        let mut pending: Option<T> = match producer.try_put(value) {
            Ok(()) => {
                drop(producer);
                self.notify();
                return Ok(());
            },
            Err(value) => Some(value),
        };

        let state: MutexGuard<()> = lock(&self.state);
        let state: MutexGuard<()> = self
            .cv
            .wait_while(state, |_| {
                if self.is_closed() {
                    return false;
                }
                match pending.take().map(|value| producer.try_put(value)) {
                    Some(Err(value)) => {
                        pending = Some(value);
                        true
                    },
                    _ => false,
                }
            })
            .unwrap_or_else(PoisonError::into_inner);

        if pending.is_some() {
            return Err(ChannelClosed);
        }
        self.cv.notify_all();
        drop(state);
        Ok(())
    }

    fn get(&self) -> Result<T, ChannelClosed> {
        let mut consumer: MutexGuard<Consumer<T>> = lock(&self.consumer);

        // Fast path.
        if let Some(value) = consumer.try_get() {
            drop(consumer);
            self.notify();
            return Ok(value);
        }

        let mut received: Option<T> = None;
        let state: MutexGuard<()> = lock(&self.state);
        let state: MutexGuard<()> = self
            .cv
            .wait_while(state, |_| {
                received = consumer.try_get();
                if received.is_none() && self.is_closed() {
                    // Values put before the channel closed are still handed out.
                    received = consumer.try_get();
                    return false;
                }
                received.is_none()
            })
            .unwrap_or_else(PoisonError::into_inner);

        match received {
            Some(value) => {
                self.cv.notify_all();
                drop(state);
                Ok(value)
            },
            None => Err(ChannelClosed),
        }
    }

    fn try_get(&self) -> Option<T> {
        let value: Option<T> = lock(&self.consumer).try_get();
        if value.is_some() {
            self.notify();
        }
        value
    }

    fn writer_close(&self) {
        self.close();
    }

    fn reader_close(&self) {
        self.close();
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Creates a thread-blocking channel holding up to `capacity` values.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn make<T: Send>(capacity: usize) -> (Reader<T, ThreadedChannel<T>>, Writer<T, ThreadedChannel<T>>) {
    let ring: RingBuffer<T> = match RingBuffer::new(capacity) {
        Ok(ring) => ring,
        Err(e) => panic!("invalid channel capacity (capacity={}, error={:?})", capacity, e),
    };
    channel::pair(ThreadedChannel::new(ring))
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
