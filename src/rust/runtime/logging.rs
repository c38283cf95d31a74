// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::flexi_logger::{
    Logger,
    LoggerHandle,
};
use ::std::sync::OnceLock;

//==============================================================================
// Constants
//==============================================================================

/// Log specification used when `RUST_LOG` is not set.
const DEFAULT_LOG_SPEC: &str = "warn";

//==============================================================================
// Static Variables
//==============================================================================

/// Guardian to the logging initialize function. Holds the logger alive for the lifetime of the process.
static LOGGER: OnceLock<Option<LoggerHandle>> = OnceLock::new();

//==============================================================================
// Standalone Functions
//==============================================================================

/// Initializes logging features.
pub fn initialize() {
    initialize_with(DEFAULT_LOG_SPEC)
}

/// Initializes logging features, falling back to `spec` when `RUST_LOG` is not set. Only the first call has an
/// effect.
pub fn initialize_with(spec: &str) {
    LOGGER.get_or_init(|| {
        // Another logger may already be installed (e.g. by a test harness).
        match Logger::try_with_env_or_str(spec).and_then(|logger| logger.start()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                eprintln!("failed to initialize logger ({:?})", e);
                None
            },
        }
    });
}
