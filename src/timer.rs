//! Monotonic timing around every measured call.
//!
//! Backed by `tokio::time::Instant`, which reads the OS monotonic clock and
//! follows the runtime's virtual clock when time is paused in tests.

use tokio::time::Instant;

/// Capture the start of a measured call.
pub fn start() -> Instant {
    Instant::now()
}

/// Nanoseconds elapsed since `start`. Saturates instead of wrapping.
pub fn elapsed_nanos(start: Instant) -> u64 {
    let nanos = start.elapsed().as_nanos();
    u64::try_from(nanos).unwrap_or(u64::MAX)
}
