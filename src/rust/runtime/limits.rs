// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

/// Default stack size for a coroutine, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest stack a coroutine may be given, in bytes. Anything below this cannot hold the unwinding machinery.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Maximum number of readiness events drained from the demultiplexer in one call.
pub const MAX_POLL_EVENTS: usize = 64;
