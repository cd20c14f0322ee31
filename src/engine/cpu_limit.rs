//! # CPU-limit inference for the default task processor.
//!
//! Containers often expose their CPU quota through a `CPU_LIMIT` environment
//! variable of the form `<decimal>c` (e.g. `2.7c`). When a descriptor opts in
//! with `guess_cpu_limit`, the parsed value replaces the configured worker
//! count for the *default* processor only.
//!
//! ## Rules
//! - Unset variable → no guess, use the configured value.
//! - Parse failure or a suffix other than `c` → logged error, no guess.
//! - Rounded value outside `(0, 32)` → logged error, no guess.
//! - Accepted values below 3 are floored to 3.

use tracing::{error, info};

/// Rounded values at or above this are rejected as implausible.
const MAX_CPU: i64 = 32;

/// Accepted guesses are floored here; tiny containers starve the scheduler
/// with fewer workers than this.
const MIN_WORKER_FLOOR: usize = 3;

/// Environment variable carrying the container CPU quota.
const CPU_LIMIT_ENV: &str = "CPU_LIMIT";

/// Infers the worker count for `processor_name` from the environment.
///
/// Returns `None` when no usable guess is available; the caller then keeps
/// the configured `worker_threads`.
pub(crate) fn guess_cpu_limit(processor_name: &str) -> Option<usize> {
    let raw = match std::env::var(CPU_LIMIT_ENV) {
        Ok(raw) => raw,
        Err(_) => {
            info!("CPU_LIMIT env is unset, ignoring it");
            return None;
        }
    };
    info!(cpu_limit = %raw, "CPU_LIMIT is set");

    match parse_cpu_limit(&raw) {
        Some(workers) => {
            info!(
                worker_threads = workers,
                processor = %processor_name,
                "using CPU limit from env CPU_LIMIT for worker_threads, ignoring config value"
            );
            Some(workers)
        }
        None => {
            error!(cpu_limit = %raw, "CPU_LIMIT env is invalid, ignoring it");
            None
        }
    }
}

/// Parses a `<decimal>c` CPU limit into a worker count.
fn parse_cpu_limit(raw: &str) -> Option<usize> {
    let value: f64 = raw.strip_suffix('c')?.parse().ok()?;
    let cpu = value.round() as i64;
    if cpu <= 0 || cpu >= MAX_CPU {
        return None;
    }
    Some((cpu as usize).max(MIN_WORKER_FLOOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_then_floors() {
        assert_eq!(parse_cpu_limit("2.7c"), Some(3));
        assert_eq!(parse_cpu_limit("2c"), Some(3));
        assert_eq!(parse_cpu_limit("1c"), Some(3));
        assert_eq!(parse_cpu_limit("3c"), Some(3));
        assert_eq!(parse_cpu_limit("4.2c"), Some(4));
    }

    #[test]
    fn rejects_out_of_range() {
        // Rounds to zero.
        assert_eq!(parse_cpu_limit("0.4c"), None);
        assert_eq!(parse_cpu_limit("0c"), None);
        assert_eq!(parse_cpu_limit("-1c"), None);
        // Upper bound is exclusive.
        assert_eq!(parse_cpu_limit("31c"), Some(31));
        assert_eq!(parse_cpu_limit("32c"), None);
        assert_eq!(parse_cpu_limit("31.6c"), None);
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_cpu_limit("foo"), None);
        assert_eq!(parse_cpu_limit(""), None);
        assert_eq!(parse_cpu_limit("2"), None);
        assert_eq!(parse_cpu_limit("2m"), None);
        assert_eq!(parse_cpu_limit("c"), None);
        assert_eq!(parse_cpu_limit("2cc"), None);
    }
}
