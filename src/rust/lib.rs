// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Cooperative coroutines multiplexed over a pool of worker threads.
//!
//! Coroutines are spawned on a [Scheduler] and exchange values through bounded [channel]s. Blocking operations
//! (channel puts and gets, [Monitor] waits, socket I/O) suspend the calling coroutine and let its worker run other
//! coroutines in the meantime.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod channel;
pub mod collections;
pub mod runtime;
pub mod scheduler;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod io;
        pub use self::io::{
            IoBridge,
            TcpListener,
            TcpStream,
        };
    }
}

pub use self::{
    channel::{
        make_channel,
        ChannelImpl,
        Reader,
        Writer,
    },
    runtime::{
        config::Config,
        fail::{
            ChannelClosed,
            Fail,
        },
    },
    scheduler::{
        current_coroutine,
        go,
        yield_now,
        Monitor,
        Scheduler,
        SchedulerDump,
        SchedulerHandle,
    },
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out of the enclosing `anyhow::Result` function otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    ::anyhow::bail!(
                        "ensure failed: `(left == right)` left: `{:?}`, right: `{:?}` at {}:{}",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            },
        }
    }};
}

/// Ensures that two expressions are not equal, bailing out of the enclosing `anyhow::Result` function otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    ::anyhow::bail!(
                        "ensure failed: `(left != right)` left: `{:?}`, right: `{:?}` at {}:{}",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            },
        }
    }};
}
