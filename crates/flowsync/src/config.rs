//! flowsync configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Environment Variables
//!
//! - `FLOWSYNC_BUFFER_WARN` - buffer length at which unbounded buffers log a
//!   growth warning (default 1024, 0 disables)
//! - `FLOWSYNC_TRACE_WAITERS` - log semaphore suspend/resume at debug
//!   level instead of trace (0/1)
//!
//! # Example
//!
//! ```rust,ignore
//! use flowsync::config::StreamConfig;
//!
//! // Defaults with env overrides, installed before the first primitive
//! // is created
//! let _ = StreamConfig::from_env().buffer_warn_threshold(10_000).install();
//! ```

use std::sync::OnceLock;

use flowsync_core::env::{env_get, env_get_bool};

/// Default buffer length that triggers a growth warning
pub const DEFAULT_BUFFER_WARN_THRESHOLD: usize = 1024;

static GLOBAL: OnceLock<StreamConfig> = OnceLock::new();

/// Process-wide tuning for the flowsync primitives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Buffer length at which `BufferedStream` and demand buffers warn
    pub buffer_warn_threshold: usize,
    /// Log semaphore waiter transitions at debug instead of trace
    pub trace_waiters: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl StreamConfig {
    /// Library defaults, ignoring the environment
    pub const fn defaults() -> Self {
        Self {
            buffer_warn_threshold: DEFAULT_BUFFER_WARN_THRESHOLD,
            trace_waiters: false,
        }
    }

    /// Library defaults with `FLOWSYNC_*` overrides applied
    pub fn from_env() -> Self {
        let defaults = Self::defaults();
        Self {
            buffer_warn_threshold: env_get("FLOWSYNC_BUFFER_WARN", defaults.buffer_warn_threshold),
            trace_waiters: env_get_bool("FLOWSYNC_TRACE_WAITERS", defaults.trace_waiters),
        }
    }

    /// Set the buffer growth warning threshold (0 disables the warning)
    pub fn buffer_warn_threshold(mut self, len: usize) -> Self {
        self.buffer_warn_threshold = len;
        self
    }

    /// Enable or disable debug-level waiter logging
    pub fn trace_waiters(mut self, enabled: bool) -> Self {
        self.trace_waiters = enabled;
        self
    }

    /// Make this the process-wide configuration
    ///
    /// Fails with the rejected config if one was already installed or
    /// resolved by an earlier call to [`StreamConfig::global`].
    pub fn install(self) -> Result<(), StreamConfig> {
        GLOBAL.set(self)
    }

    /// The process-wide configuration, resolved from env on first use
    pub fn global() -> &'static StreamConfig {
        GLOBAL.get_or_init(StreamConfig::from_env)
    }

    /// True when a buffer that just grew to `len` should log a warning
    ///
    /// Fires at the threshold and at every doubling past it, so a
    /// runaway buffer keeps reporting without flooding the log.
    pub fn should_warn_buffer(&self, len: usize) -> bool {
        let threshold = self.buffer_warn_threshold;
        threshold != 0 && len >= threshold && len % threshold == 0 && (len / threshold).is_power_of_two()
    }
}
