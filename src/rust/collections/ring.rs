// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Storage shared by both ends of a ring buffer.
struct RawRing<T> {
    /// Indexes the first item in the front of the ring buffer. Only advanced by the consumer.
    front: AtomicUsize,
    /// Indexes the first empty slot after the item in the back of the ring buffer. Only advanced by the producer.
    back: AtomicUsize,
    /// Underlying buffer. One slot is always left empty to tell a full ring from an empty one.
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

/// A lock-free, single writer and single reader, fixed-size circular buffer.
///
/// Exclusive owners use it directly. To share it between two threads, [RingBuffer::split] it into a [Producer] and a
/// [Consumer]; callers needing more than one of either must serialize access themselves.
pub struct RingBuffer<T> {
    ring: Arc<RawRing<T>>,
}

/// Writing end of a split ring buffer.
pub struct Producer<T> {
    ring: Arc<RawRing<T>>,
}

/// Reading end of a split ring buffer.
pub struct Consumer<T> {
    ring: Arc<RawRing<T>>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<T> RawRing<T> {
    fn new(capacity: usize) -> Result<Self, Fail> {
        // Check if capacity is invalid.
        if capacity == 0 {
            return Err(Fail::new(libc::EINVAL, "cannot create a ring buffer with zero capacity"));
        }
        let slots: usize = match capacity.checked_add(1) {
            Some(slots) => slots,
            None => return Err(Fail::new(libc::EINVAL, "ring buffer capacity is too large")),
        };

        let buffer: Box<[UnsafeCell<MaybeUninit<T>>]> =
            (0..slots).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();

        Ok(Self {
            front: AtomicUsize::new(0),
            back: AtomicUsize::new(0),
            buffer,
        })
    }

    fn slots(&self) -> usize {
        self.buffer.len()
    }

    fn next(&self, index: usize) -> usize {
        let next: usize = index + 1;
        if next == self.slots() {
            0
        } else {
            next
        }
    }

    fn capacity(&self) -> usize {
        self.slots() - 1
    }

    fn size(&self) -> usize {
        let front: usize = self.front.load(Ordering::Acquire);
        let back: usize = self.back.load(Ordering::Acquire);
        (back + self.slots() - front) % self.slots()
    }

    fn is_empty(&self) -> bool {
        self.front.load(Ordering::Acquire) == self.back.load(Ordering::Acquire)
    }

    fn is_full(&self) -> bool {
        let back: usize = self.back.load(Ordering::Acquire);
        self.next(back) == self.front.load(Ordering::Acquire)
    }

    /// Attempts to insert an item at the back of the ring buffer.
    ///
    /// # Safety
    ///
    /// At most one thread may run this at any time.
    unsafe fn try_enqueue(&self, item: T) -> Result<(), T> {
        let back_cached: usize = self.back.load(Ordering::Relaxed);
        let next: usize = self.next(back_cached);

        // Check if the ring buffer is full.
        if next == self.front.load(Ordering::Acquire) {
            return Err(item);
        }

        // Write.
        (*self.buffer[back_cached].get()).write(item);

        // Commit write.
        self.back.store(next, Ordering::Release);

        Ok(())
    }

    /// Attempts to remove the item from the front of the ring buffer.
    ///
    /// # Safety
    ///
    /// At most one thread may run this at any time.
    unsafe fn try_dequeue(&self) -> Option<T> {
        let front_cached: usize = self.front.load(Ordering::Relaxed);

        // Check if the ring buffer is empty.
        if front_cached == self.back.load(Ordering::Acquire) {
            return None;
        }

        // Read.
        let item: T = (*self.buffer[front_cached].get()).assume_init_read();

        // Commit read.
        self.front.store(self.next(front_cached), Ordering::Release);

        Some(item)
    }
}

impl<T> RingBuffer<T> {
    /// Creates a ring buffer that holds up to `capacity` items.
    pub fn new(capacity: usize) -> Result<RingBuffer<T>, Fail> {
        Ok(RingBuffer {
            ring: Arc::new(RawRing::new(capacity)?),
        })
    }

    /// Returns the effective capacity of the target ring buffer.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Returns the number of items in the target ring buffer.
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    /// Peeks the target ring buffer and checks if it is empty.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Peeks the target ring buffer and checks if it is full.
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Attempts to insert an item at the back of the target ring buffer. Hands the item back if it is full.
    pub fn try_put(&mut self, item: T) -> Result<(), T> {
        // Safety: `&mut self` is the only handle to the ring.
        unsafe { self.ring.try_enqueue(item) }
    }

    /// Attempts to remove the item from the front of the target ring buffer.
    pub fn try_get(&mut self) -> Option<T> {
        // Safety: `&mut self` is the only handle to the ring.
        unsafe { self.ring.try_dequeue() }
    }

    /// Splits the target ring buffer into its writing and reading ends.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let producer: Producer<T> = Producer {
            ring: self.ring.clone(),
        };
        let consumer: Consumer<T> = Consumer { ring: self.ring };
        (producer, consumer)
    }
}

impl<T> Producer<T> {
    /// Attempts to insert an item at the back of the ring buffer. Hands the item back if it is full.
    pub fn try_put(&mut self, item: T) -> Result<(), T> {
        // Safety: there is exactly one producer and `&mut self` serializes its callers.
        unsafe { self.ring.try_enqueue(item) }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn size(&self) -> usize {
        self.ring.size()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }
}

impl<T> Consumer<T> {
    /// Attempts to remove the item from the front of the ring buffer.
    pub fn try_get(&mut self) -> Option<T> {
        // Safety: there is exactly one consumer and `&mut self` serializes its callers.
        unsafe { self.ring.try_dequeue() }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn size(&self) -> usize {
        self.ring.size()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Send trait implementation.
unsafe impl<T: Send> Send for RawRing<T> {}

/// Sync trait implementation. Slots are only touched by the side that owns the matching index.
unsafe impl<T: Send> Sync for RawRing<T> {}

/// Drop trait implementation.
impl<T> Drop for RawRing<T> {
    fn drop(&mut self) {
        // Release items that were never consumed.
        let mut front: usize = *self.front.get_mut();
        let back: usize = *self.back.get_mut();
        while front != back {
            unsafe { self.buffer[front].get_mut().assume_init_drop() };
            front = self.next(front);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
