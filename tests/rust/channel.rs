// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::coroutines::{
    channel::threaded_channel::{
        self,
        ThreadedChannel,
    },
    ensure_eq,
    make_channel,
    ChannelClosed,
    Reader,
    Scheduler,
    Writer,
};
use ::std::{
    sync::{
        atomic::{
            AtomicBool,
            AtomicI64,
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
    },
    thread::{
        self,
        JoinHandle,
    },
    time::Duration,
};

//======================================================================================================================
// Cooperative Channel
//======================================================================================================================

/// Tests that a reader still receives everything the writer sent before it went away, then sees the channel closed.
#[test]
fn reading_after_close() -> Result<()> {
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let (reader, writer): (Reader<i64>, Writer<i64>) = make_channel(10);
    let last_written: Arc<AtomicI64> = Arc::new(AtomicI64::new(-1));
    let last_read: Arc<AtomicI64> = Arc::new(AtomicI64::new(-1));

    let last_written_: Arc<AtomicI64> = last_written.clone();
    scheduler.go("reading_after_close writer", move || {
        for i in 0..5 {
            if writer.put(i).is_err() {
                break;
            }
            last_written_.store(i, Ordering::SeqCst);
        }
    });

    let last_read_: Arc<AtomicI64> = last_read.clone();
    scheduler.go("reading_after_close reader", move || {
        thread::sleep(Duration::from_millis(10));
        while let Ok(value) = reader.get() {
            last_read_.store(value, Ordering::SeqCst);
        }
    });

    scheduler.wait();

    ensure_eq!(last_written.load(Ordering::SeqCst), 4);
    ensure_eq!(last_read.load(Ordering::SeqCst), 4);
    Ok(())
}

/// Tests that a reader blocks until a writer puts something.
#[test]
fn reader_blocking() -> Result<()> {
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let (reader, writer): (Reader<i32>, Writer<i32>) = make_channel(10);
    let reader_finished: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
    let writer_finished: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

    let reader_finished_: Arc<AtomicBool> = reader_finished.clone();
    scheduler.go("reader_blocking reader", move || {
        if reader.get() == Ok(7) {
            reader_finished_.store(true, Ordering::SeqCst);
        }
    });

    thread::sleep(Duration::from_millis(5));
    ensure_eq!(reader_finished.load(Ordering::SeqCst), false);

    let writer_finished_: Arc<AtomicBool> = writer_finished.clone();
    scheduler.go("reader_blocking writer", move || {
        thread::sleep(Duration::from_millis(10));
        if writer.put(7).is_ok() {
            writer_finished_.store(true, Ordering::SeqCst);
        }
    });

    scheduler.wait();

    ensure_eq!(reader_finished.load(Ordering::SeqCst), true);
    ensure_eq!(writer_finished.load(Ordering::SeqCst), true);
    Ok(())
}

/// Tests that a writer blocked on a full channel fails once the reader goes away.
#[test]
fn writer_exits_when_closed() -> Result<()> {
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let (reader, writer): (Reader<i32>, Writer<i32>) = make_channel(1);
    let writer_failed: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

    scheduler.go("writer_exits_when_closed reader", move || {
        thread::sleep(Duration::from_millis(10));
        // Closes the channel on the way out.
        drop(reader);
    });

    let writer_failed_: Arc<AtomicBool> = writer_failed.clone();
    scheduler.go("writer_exits_when_closed writer", move || {
        let result: Result<(), ChannelClosed> = writer.put(1).and_then(|()| writer.put(2));
        writer_failed_.store(result == Err(ChannelClosed), Ordering::SeqCst);
    });

    scheduler.wait();

    ensure_eq!(writer_failed.load(Ordering::SeqCst), true);
    Ok(())
}

/// Tests that many more values than the channel holds go through in order.
#[test]
fn large_transfer() -> Result<()> {
    const MESSAGES: i64 = 10000;
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let (reader, writer): (Reader<i64>, Writer<i64>) = make_channel(10);
    let last_written: Arc<AtomicI64> = Arc::new(AtomicI64::new(-1));
    let last_read: Arc<AtomicI64> = Arc::new(AtomicI64::new(-1));
    let in_order: Arc<AtomicBool> = Arc::new(AtomicBool::new(true));

    let last_written_: Arc<AtomicI64> = last_written.clone();
    scheduler.go("large_transfer writer", move || {
        for i in 0..MESSAGES {
            if writer.put(i).is_err() {
                break;
            }
            last_written_.store(i, Ordering::SeqCst);
            if i % 37 == 0 {
                common::jitter(i as u64, 1);
            }
        }
    });

    let last_read_: Arc<AtomicI64> = last_read.clone();
    let in_order_: Arc<AtomicBool> = in_order.clone();
    scheduler.go("large_transfer reader", move || {
        let mut expected: i64 = 0;
        while let Ok(value) = reader.get() {
            if value != expected {
                in_order_.store(false, Ordering::SeqCst);
            }
            expected += 1;
            last_read_.store(value, Ordering::SeqCst);
            if value % 53 == 0 {
                common::jitter(value as u64, 1);
            }
        }
    });

    scheduler.wait();

    ensure_eq!(last_written.load(Ordering::SeqCst), MESSAGES - 1);
    ensure_eq!(last_read.load(Ordering::SeqCst), MESSAGES - 1);
    ensure_eq!(in_order.load(Ordering::SeqCst), true);
    Ok(())
}

/// Tests that every value sent is received exactly once and in order, for small capacities and counts around them.
#[test]
fn transfer_across_capacities() -> Result<()> {
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;

    for capacity in 1..=4usize {
        for count in [0, 1, capacity, capacity + 1, 3 * capacity + 7] {
            let (reader, writer): (Reader<usize>, Writer<usize>) = make_channel(capacity);
            let received: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
            let written: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

            let written_: Arc<AtomicUsize> = written.clone();
            scheduler.go(&format!("capacity {} writer", capacity), move || {
                for i in 0..count {
                    if writer.put(i).is_err() {
                        break;
                    }
                    written_.fetch_add(1, Ordering::SeqCst);
                }
            });

            let received_: Arc<Mutex<Vec<usize>>> = received.clone();
            scheduler.go(&format!("capacity {} reader", capacity), move || {
                while let Ok(value) = reader.get() {
                    if let Ok(mut received) = received_.lock() {
                        received.push(value);
                    }
                }
            });

            scheduler.wait();

            let received: Vec<usize> = match received.lock() {
                Ok(received) => received.clone(),
                Err(_) => anyhow::bail!("lock poisoned"),
            };
            ensure_eq!(written.load(Ordering::SeqCst), count);
            ensure_eq!(received, (0..count).collect::<Vec<usize>>());
        }
    }
    Ok(())
}

/// Tests that readers sharing a channel receive every value exactly once and all see it close.
#[test]
fn multiple_readers() -> Result<()> {
    const MESSAGES: usize = 10000;
    const READERS: usize = 100;
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let (reader, writer): (Reader<usize>, Writer<usize>) = make_channel(10);
    let received: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let closed: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

    scheduler.go("multiple_readers writer", move || {
        for i in 0..MESSAGES {
            if writer.put(i).is_err() {
                break;
            }
        }
    });

    for i in 0..READERS {
        let reader: Reader<usize> = reader.clone();
        let received: Arc<AtomicUsize> = received.clone();
        let closed: Arc<AtomicUsize> = closed.clone();
        scheduler.go(&format!("multiple_readers reader {}", i), move || {
            while reader.get().is_ok() {
                received.fetch_add(1, Ordering::SeqCst);
            }
            closed.fetch_add(1, Ordering::SeqCst);
        });
    }
    reader.close();

    scheduler.wait();

    ensure_eq!(closed.load(Ordering::SeqCst), READERS);
    ensure_eq!(received.load(Ordering::SeqCst), MESSAGES);
    Ok(())
}

/// Tests that writers sharing a channel all get their values through to one reader.
#[test]
fn multiple_writers() -> Result<()> {
    const PER_WRITER: usize = 100;
    const WRITERS: usize = 100;
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let (reader, writer): (Reader<usize>, Writer<usize>) = make_channel(10);
    let received: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

    for i in 0..WRITERS {
        let writer: Writer<usize> = writer.clone();
        scheduler.go(&format!("multiple_writers writer {}", i), move || {
            for i in 0..PER_WRITER {
                if writer.put(i).is_err() {
                    break;
                }
            }
        });
    }
    writer.close();

    let received_: Arc<AtomicUsize> = received.clone();
    scheduler.go("multiple_writers reader", move || {
        while reader.get().is_ok() {
            received_.fetch_add(1, Ordering::SeqCst);
        }
    });

    scheduler.wait();

    ensure_eq!(received.load(Ordering::SeqCst), WRITERS * PER_WRITER);
    Ok(())
}

/// Tests that try_get() drains what is buffered without blocking.
#[test]
fn non_blocking_read() -> Result<()> {
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let (reader, writer): (Reader<f64>, Writer<f64>) = make_channel(10);
    let read: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let completed: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

    let read_: Arc<AtomicUsize> = read.clone();
    let completed_: Arc<AtomicBool> = completed.clone();
    scheduler.go("non_blocking_read", move || {
        for value in [1.1, 2.2, 3.3] {
            if writer.put(value).is_err() {
                return;
            }
        }
        while reader.try_get().is_some() {
            read_.fetch_add(1, Ordering::SeqCst);
        }
        completed_.store(true, Ordering::SeqCst);
    });

    scheduler.wait();

    ensure_eq!(read.load(Ordering::SeqCst), 3);
    ensure_eq!(completed.load(Ordering::SeqCst), true);
    Ok(())
}

/// Tests that a coroutine can talk to a plain thread through a cooperative channel when only the coroutine blocks.
#[test]
fn thread_feeds_coroutine() -> Result<()> {
    const MESSAGES: usize = 1000;
    let scheduler: Scheduler = common::scheduler(2)?;
    let (reader, writer): (Reader<usize>, Writer<usize>) = make_channel(MESSAGES);
    let sum: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

    let sum_: Arc<AtomicUsize> = sum.clone();
    scheduler.go("thread_feeds_coroutine reader", move || {
        while let Ok(value) = reader.get() {
            sum_.fetch_add(value, Ordering::SeqCst);
        }
    });

    // The channel never fills up, so the thread never blocks.
    for i in 0..MESSAGES {
        writer.put(i)?;
    }
    writer.close();

    scheduler.wait();

    ensure_eq!(sum.load(Ordering::SeqCst), MESSAGES * (MESSAGES - 1) / 2);
    Ok(())
}

//======================================================================================================================
// Threaded Channel
//======================================================================================================================

/// Tests the threaded channel between a writer thread and a reader thread.
#[test]
fn threaded_large_transfer() -> Result<()> {
    const MESSAGES: usize = 10000;
    let (reader, writer): (Reader<usize, ThreadedChannel<usize>>, Writer<usize, ThreadedChannel<usize>>) =
        threaded_channel::make(10);

    let producer: JoinHandle<usize> = thread::spawn(move || {
        let mut written: usize = 0;
        for i in 0..MESSAGES {
            if writer.put(i).is_err() {
                break;
            }
            written += 1;
        }
        written
    });

    let consumer: JoinHandle<(usize, bool)> = thread::spawn(move || {
        let mut read: usize = 0;
        let mut in_order: bool = true;
        while let Ok(value) = reader.get() {
            in_order &= value == read;
            read += 1;
        }
        (read, in_order)
    });

    let written: usize = match producer.join() {
        Ok(written) => written,
        Err(_) => anyhow::bail!("producer panicked"),
    };
    let (read, in_order): (usize, bool) = match consumer.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("consumer panicked"),
    };

    ensure_eq!(written, MESSAGES);
    ensure_eq!(read, MESSAGES);
    ensure_eq!(in_order, true);
    Ok(())
}

/// Tests that the threaded channel hands out buffered values after its writers are gone.
#[test]
fn threaded_reading_after_close() -> Result<()> {
    let (reader, writer): (Reader<i32, ThreadedChannel<i32>>, Writer<i32, ThreadedChannel<i32>>) =
        threaded_channel::make(10);

    let producer: JoinHandle<()> = thread::spawn(move || {
        for i in 0..5 {
            if writer.put(i).is_err() {
                break;
            }
        }
    });
    if producer.join().is_err() {
        anyhow::bail!("producer panicked");
    }

    let mut values: Vec<i32> = Vec::new();
    while let Ok(value) = reader.get() {
        values.push(value);
    }
    ensure_eq!(values, vec![0, 1, 2, 3, 4]);
    ensure_eq!(reader.get(), Err(ChannelClosed));
    Ok(())
}
