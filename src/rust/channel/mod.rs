// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Bounded, closeable channels with separate reader and writer handles.
//!
//! A channel is created as a linked [Reader]/[Writer] pair. Handles are generic over the [ChannelImpl] backing them:
//! [coroutine_channel] suspends coroutines, [threaded_channel] blocks OS threads. Either way, a side of the channel
//! closes when its last handle is closed or dropped, and closing either side closes the channel.

pub mod coroutine_channel;
pub mod threaded_channel;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::ChannelClosed;
use ::std::{
    fmt,
    marker::PhantomData,
    sync::Arc,
};

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    coroutine_channel::CoroutineChannel,
    threaded_channel::ThreadedChannel,
};

//======================================================================================================================
// Traits
//======================================================================================================================

/// Operations every channel implementation provides. Handles call into this; users go through [Reader] and [Writer].
pub trait ChannelImpl<T>: Send + Sync {
    /// Inserts `value`, blocking while the channel is full and open.
    fn put(&self, value: T) -> Result<(), ChannelClosed>;

    /// Removes the oldest value, blocking while the channel is empty and open. Values buffered before the channel
    /// was closed are still handed out.
    fn get(&self) -> Result<T, ChannelClosed>;

    /// Removes the oldest value if there is one. Never blocks.
    fn try_get(&self) -> Option<T>;

    /// Closes the channel on behalf of the writer side.
    fn writer_close(&self);

    /// Closes the channel on behalf of the reader side.
    fn reader_close(&self);
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Shared by every writer handle of a channel. Closes the writer side when the last handle goes away.
struct WriterSide<T, C: ChannelImpl<T>> {
    channel: Arc<C>,
    _marker: PhantomData<fn(T)>,
}

/// Shared by every reader handle of a channel. Closes the reader side when the last handle goes away.
struct ReaderSide<T, C: ChannelImpl<T>> {
    channel: Arc<C>,
    _marker: PhantomData<fn() -> T>,
}

/// Writing end of a channel.
pub struct Writer<T, C: ChannelImpl<T> = CoroutineChannel<T>> {
    side: Arc<WriterSide<T, C>>,
}

/// Reading end of a channel.
pub struct Reader<T, C: ChannelImpl<T> = CoroutineChannel<T>> {
    side: Arc<ReaderSide<T, C>>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<T, C: ChannelImpl<T>> Writer<T, C> {
    /// Sends `value` down the channel, waiting for room if it is full.
    pub fn put(&self, value: T) -> Result<(), ChannelClosed> {
        self.side.channel.put(value)
    }

    /// Gives up this handle. The writer side closes once every handle is gone.
    pub fn close(self) {
        drop(self);
    }
}

impl<T, C: ChannelImpl<T>> Reader<T, C> {
    /// Receives the oldest value, waiting for one if the channel is empty.
    pub fn get(&self) -> Result<T, ChannelClosed> {
        self.side.channel.get()
    }

    /// Receives the oldest value if one is buffered.
    pub fn try_get(&self) -> Option<T> {
        self.side.channel.try_get()
    }

    /// Gives up this handle. The reader side closes once every handle is gone.
    pub fn close(self) {
        drop(self);
    }
}

/// Builds a linked pair of handles over `channel`.
pub(crate) fn pair<T, C: ChannelImpl<T>>(channel: C) -> (Reader<T, C>, Writer<T, C>) {
    let channel: Arc<C> = Arc::new(channel);
    let reader: Reader<T, C> = Reader {
        side: Arc::new(ReaderSide {
            channel: channel.clone(),
            _marker: PhantomData,
        }),
    };
    let writer: Writer<T, C> = Writer {
        side: Arc::new(WriterSide {
            channel,
            _marker: PhantomData,
        }),
    };
    (reader, writer)
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T, C: ChannelImpl<T>> Drop for WriterSide<T, C> {
    fn drop(&mut self) {
        self.channel.writer_close();
    }
}

impl<T, C: ChannelImpl<T>> Drop for ReaderSide<T, C> {
    fn drop(&mut self) {
        self.channel.reader_close();
    }
}

impl<T, C: ChannelImpl<T>> Clone for Writer<T, C> {
    fn clone(&self) -> Self {
        Self {
            side: self.side.clone(),
        }
    }
}

/// Cooperative channels accept any number of readers.
impl<T: Send> Clone for Reader<T, CoroutineChannel<T>> {
    fn clone(&self) -> Self {
        Self {
            side: self.side.clone(),
        }
    }
}

impl<T, C: ChannelImpl<T>> fmt::Debug for Writer<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("handles", &Arc::strong_count(&self.side))
            .finish()
    }
}

impl<T, C: ChannelImpl<T>> fmt::Debug for Reader<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("handles", &Arc::strong_count(&self.side))
            .finish()
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
pub fn make_channel<T: Send>(capacity: usize) -> (Reader<T>, Writer<T>) {
    coroutine_channel::make(capacity)
}
