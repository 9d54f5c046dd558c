//! Environment variable utilities
//!
//! Configuration in flowsync is compile-time defaults overridden by
//! `FLOWSYNC_*` variables. Unset or unparsable values fall back to the
//! default silently.
//!
//! ```ignore
//! use flowsync_core::env::{env_get, env_get_bool};
//!
//! let threshold: usize = env_get("FLOWSYNC_BUFFER_WARN", 1024);
//! let verbose = env_get_bool("FLOWSYNC_TRACE_WAITERS", false);
//! ```

use std::str::FromStr;

/// Get an environment variable parsed as `T`, or `default`
#[inline]
pub fn env_get<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get an environment variable as a boolean flag
///
/// "1", "true", "yes", "on" are true and "0", "false", "no", "off" are
/// false (case-insensitive). Anything else, including unset, is `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__FLOWSYNC_TEST_UNSET__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_parses() {
        std::env::set_var("__FLOWSYNC_TEST_NUM__", " 123 ");
        let val: usize = env_get("__FLOWSYNC_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__FLOWSYNC_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_falls_back() {
        std::env::set_var("__FLOWSYNC_TEST_BAD__", "lots");
        let val: usize = env_get("__FLOWSYNC_TEST_BAD__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__FLOWSYNC_TEST_BAD__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        let key = "__FLOWSYNC_TEST_BOOL__";
        for truthy in ["1", "true", "TRUE", "yes", "on"] {
            std::env::set_var(key, truthy);
            assert!(env_get_bool(key, false), "{truthy}");
        }
        for falsy in ["0", "false", "no", "off"] {
            std::env::set_var(key, falsy);
            assert!(!env_get_bool(key, true), "{falsy}");
        }
        std::env::set_var(key, "maybe");
        assert!(env_get_bool(key, true));
        std::env::remove_var(key);
        assert!(!env_get_bool(key, false));
    }
}
