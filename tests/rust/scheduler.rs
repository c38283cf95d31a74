// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::coroutines::{
    current_coroutine,
    ensure_eq,
    go,
    scheduler::{
        CoroutineId,
        CurrentCoroutine,
    },
    yield_now,
    Config,
    Monitor,
    Scheduler,
    SchedulerDump,
};
use ::std::{
    collections::HashSet,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
    },
    thread,
    time::Duration,
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn wait_until<F: Fn() -> bool>(condition: F) {
    while !condition() {
        thread::sleep(Duration::from_millis(1));
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

/// Tests that every spawned coroutine runs to completion before wait() returns.
#[test]
fn wait_joins_all_coroutines() -> Result<()> {
    const COROUTINES: usize = 1000;
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let count: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

    for i in 0..COROUTINES {
        let count: Arc<AtomicUsize> = count.clone();
        scheduler.go(&format!("worker {}", i), move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
    }
    scheduler.wait();

    ensure_eq!(count.load(Ordering::SeqCst), COROUTINES);
    ensure_eq!(scheduler.debug_dump().live, 0);
    Ok(())
}

/// Tests that coroutines know who they are, and that plain threads are not coroutines.
#[test]
fn current_coroutine_identity() -> Result<()> {
    let scheduler: Scheduler = common::scheduler(2)?;
    let seen: Arc<Mutex<Vec<(CoroutineId, String)>>> = Arc::new(Mutex::new(Vec::new()));

    ensure_eq!(current_coroutine().is_none(), true);

    for i in 0..4 {
        let seen: Arc<Mutex<Vec<(CoroutineId, String)>>> = seen.clone();
        scheduler.go(&format!("named {}", i), move || {
            let current: Option<CurrentCoroutine> = current_coroutine();
            if let (Some(current), Ok(mut seen)) = (current, seen.lock()) {
                seen.push((current.id(), current.name().to_string()));
            }
        });
    }
    scheduler.wait();

    let seen: Vec<(CoroutineId, String)> = match seen.lock() {
        Ok(seen) => seen.clone(),
        Err(_) => anyhow::bail!("lock poisoned"),
    };
    ensure_eq!(seen.len(), 4);
    let ids: HashSet<CoroutineId> = seen.iter().map(|(id, _)| *id).collect();
    ensure_eq!(ids.len(), 4);
    let names: HashSet<String> = seen.into_iter().map(|(_, name)| name).collect();
    ensure_eq!(names, (0..4).map(|i| format!("named {}", i)).collect::<HashSet<String>>());
    Ok(())
}

/// Tests that yielding coroutines on a single worker take turns.
#[test]
fn yield_now_interleaves() -> Result<()> {
    let scheduler: Scheduler = common::scheduler(1)?;
    let trace: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    for name in ["a", "b"] {
        let trace: Arc<Mutex<Vec<&'static str>>> = trace.clone();
        scheduler.go(name, move || {
            for _ in 0..3 {
                if let Ok(mut trace) = trace.lock() {
                    trace.push(name);
                }
                yield_now();
            }
        });
    }
    scheduler.wait();

    let trace: Vec<&'static str> = match trace.lock() {
        Ok(trace) => trace.clone(),
        Err(_) => anyhow::bail!("lock poisoned"),
    };
    ensure_eq!(trace, vec!["a", "b", "a", "b", "a", "b"]);
    Ok(())
}

/// Tests that coroutines spawned from coroutines, several levels deep, are all waited for.
#[test]
fn nested_go() -> Result<()> {
    fn spawn_tree(depth: usize, count: Arc<AtomicUsize>) {
        count.fetch_add(1, Ordering::SeqCst);
        if depth == 0 {
            return;
        }
        for i in 0..2 {
            let count: Arc<AtomicUsize> = count.clone();
            go(&format!("tree {}-{}", depth, i), move || spawn_tree(depth - 1, count));
        }
    }

    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let count: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let count_: Arc<AtomicUsize> = count.clone();
    scheduler.go("tree root", move || spawn_tree(5, count_));
    scheduler.wait();

    // A full binary tree of depth 5 has 63 nodes.
    ensure_eq!(count.load(Ordering::SeqCst), 63);
    Ok(())
}

/// Tests that a coroutine parked on one worker may be resumed by another.
#[test]
fn coroutines_migrate_between_workers() -> Result<()> {
    let scheduler: Scheduler = common::scheduler(common::WORKERS)?;
    let monitor: Arc<Monitor> = Arc::new(Monitor::new());
    let resumed: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

    for i in 0..16 {
        let monitor: Arc<Monitor> = monitor.clone();
        let resumed: Arc<AtomicUsize> = resumed.clone();
        scheduler.go(&format!("sleeper {}", i), move || {
            for _ in 0..10 {
                monitor.wait();
            }
            resumed.fetch_add(1, Ordering::SeqCst);
        });
    }

    while resumed.load(Ordering::SeqCst) < 16 {
        monitor.wake_all();
        thread::sleep(Duration::from_millis(1));
    }
    scheduler.wait();

    ensure_eq!(monitor.waiting(), 0);
    Ok(())
}

/// Tests that the scheduler dump reports parked and running coroutines.
#[test]
fn debug_dump_reports_state() -> Result<()> {
    let scheduler: Scheduler = common::scheduler(2)?;
    let monitor: Arc<Monitor> = Arc::new(Monitor::new());

    for i in 0..3 {
        let monitor: Arc<Monitor> = monitor.clone();
        scheduler.go(&format!("parked {}", i), move || monitor.wait());
    }
    wait_until(|| monitor.waiting() == 3);

    let dump: SchedulerDump = scheduler.debug_dump();
    ensure_eq!(dump.live, 3);
    ensure_eq!(dump.waiting, 3);
    ensure_eq!(dump.ready, 0);
    ensure_eq!(dump.running.len(), 2);

    monitor.wake_all();
    scheduler.wait();

    let dump: SchedulerDump = scheduler.debug_dump();
    ensure_eq!(dump.live, 0);
    ensure_eq!(dump.waiting, 0);
    Ok(())
}

/// Tests that a scheduler can be built from a configuration.
#[test]
fn scheduler_from_config() -> Result<()> {
    let config: Config = Config::from_yaml("scheduler:\n  worker_threads: 3\n  stack_size: 262144\n")?;
    let scheduler: Scheduler = Scheduler::with_config(&config)?;
    ensure_eq!(scheduler.worker_count(), 3);

    let done: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let done_: Arc<AtomicUsize> = done.clone();
    scheduler.go("deep stack", move || {
        // Uses a good chunk of the configured stack.
        let buffer: [u8; 64 * 1024] = [1; 64 * 1024];
        let sum: usize = buffer.iter().map(|b| *b as usize).sum();
        done_.store(sum, Ordering::SeqCst);
    });
    scheduler.wait();

    ensure_eq!(done.load(Ordering::SeqCst), 64 * 1024);
    Ok(())
}

/// Tests that waiting from inside a coroutine is refused instead of deadlocking its worker.
#[test]
fn wait_from_coroutine_is_refused() -> Result<()> {
    let scheduler: Arc<Scheduler> = Arc::new(common::scheduler(1)?);
    let refused: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

    let scheduler_: Arc<Scheduler> = scheduler.clone();
    let refused_: Arc<AtomicUsize> = refused.clone();
    scheduler.go("impatient", move || {
        let result: thread::Result<()> = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scheduler_.wait()));
        if result.is_err() {
            refused_.fetch_add(1, Ordering::SeqCst);
        }
    });
    scheduler.wait();

    ensure_eq!(refused.load(Ordering::SeqCst), 1);
    Ok(())
}
