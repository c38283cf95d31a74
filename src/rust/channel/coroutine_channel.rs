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
    scheduler::{
        handle::lock,
        Monitor,
        WaitTicket,
    },
};
use ::std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Mutex,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A channel whose blocking operations suspend the calling coroutine instead of its worker thread. Any number of
/// coroutines may read and write concurrently, from any worker.
pub struct CoroutineChannel<T> {
    producer: Mutex<Producer<T>>,
    consumer: Mutex<Consumer<T>>,
    closed: AtomicBool,
    /// Writers waiting for room.
    writers: Monitor,
    /// Readers waiting for values.
    readers: Monitor,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<T> CoroutineChannel<T> {
    fn new(ring: RingBuffer<T>) -> Self {
        let (producer, consumer): (Producer<T>, Consumer<T>) = ring.split();
        Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            closed: AtomicBool::new(false),
            writers: Monitor::new(),
            readers: Monitor::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            trace!("close(): channel closed");
        }
        self.writers.wake_all();
        self.readers.wake_all();
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T: Send> ChannelImpl<T> for CoroutineChannel<T> {
    fn put(&self, value: T) -> Result<(), ChannelClosed> {
        let mut value: T = value;
        loop {
            let ticket: WaitTicket = self.writers.prepare_wait();
            if self.is_closed() {
                return Err(ChannelClosed);
            }
            let result: Result<(), T> = lock(&self.producer).try_put(value);
            match result {
                Ok(()) => {
                    self.readers.wake_one();
                    return Ok(());
                },
                Err(rejected) => value = rejected,
            }
            self.writers.wait_ticket(ticket);
        }
    }

    fn get(&self) -> Result<T, ChannelClosed> {
        loop {
            let ticket: WaitTicket = self.readers.prepare_wait();
            if let Some(value) = self.try_get() {
                return Ok(value);
            }
            if self.is_closed() {
                // Values put before the channel closed are still handed out.
                return self.try_get().ok_or(ChannelClosed);
            }
            self.readers.wait_ticket(ticket);
        }
    }

    fn try_get(&self) -> Option<T> {
        let value: Option<T> = lock(&self.consumer).try_get();
        if value.is_some() {
            self.writers.wake_one();
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

/// Creates a cooperative channel holding up to `capacity` values.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn make<T: Send>(capacity: usize) -> (Reader<T, CoroutineChannel<T>>, Writer<T, CoroutineChannel<T>>) {
    let ring: RingBuffer<T> = match RingBuffer::new(capacity) {
        Ok(ring) => ring,
        Err(e) => panic!("invalid channel capacity (capacity={}, error={:?})", capacity, e),
    };
    channel::pair(CoroutineChannel::new(ring))
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
