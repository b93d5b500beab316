use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use tracing::error;

/// Invokes `op`, retrying up to `max_retries` times with a short backoff on
/// failure. Exhausting retries logs a safety violation and returns `false` —
/// this wrapper never panics and never propagates a caller-visible error.
pub fn safe_call(name: &str, max_retries: u32, mut op: impl FnMut() -> bool) -> bool {
    let mut attempt = 0;
    loop {
        if op() {
            return true;
        }
        attempt += 1;
        if attempt > max_retries {
            error!(operation = name, attempts = attempt, "safety violation: operation failed after retries");
            return false;
        }
        thread::sleep(Duration::from_millis(20 * attempt as u64));
    }
}

/// Isolates `op` from an unexpected panic — the closest equivalent to a
/// structured-exception barrier available outside Windows. A caught panic
/// is logged and turned into a `false` return rather than unwinding past
/// this call.
pub fn with_exception_barrier(name: &str, op: impl FnOnce() -> bool) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(result) => result,
        Err(_) => {
            error!(operation = name, "safety violation: operation panicked");
            false
        }
    }
}
