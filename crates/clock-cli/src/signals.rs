//! Signal handling for interrupting long waits.
//!
//! SIGINT and SIGTERM set a process-wide flag; waiting loops poll it and
//! return early so clocks are destroyed cleanly instead of the process
//! being killed with live native contexts.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);
static SIGNAL_COUNT: AtomicU32 = AtomicU32::new(0);

/// Handle for shutdown signal checks.
#[derive(Debug, Clone, Copy)]
pub struct SignalHandler {
    _private: (),
}

impl SignalHandler {
    /// Install handlers for SIGINT and SIGTERM.
    ///
    /// On non-Unix platforms only [`SignalHandler::request_shutdown`] works.
    pub fn install() -> Self {
        #[cfg(unix)]
        register_unix_handlers();
        Self { _private: () }
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(self) -> bool {
        SHUTDOWN_FLAG.load(Ordering::Relaxed)
    }

    /// Manually request shutdown.
    pub fn request_shutdown(self) {
        SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
    }

    /// Number of signals received so far.
    pub fn signal_count(self) -> u32 {
        SIGNAL_COUNT.load(Ordering::Relaxed)
    }

    /// Sleep in short slices until `deadline` or a shutdown request.
    ///
    /// Returns true if shutdown was requested.
    pub fn sleep_until(self, deadline: Instant) -> bool {
        let poll_interval = Duration::from_millis(50);
        loop {
            if self.shutdown_requested() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            std::thread::sleep(poll_interval.min(remaining));
        }
    }
}

#[cfg(unix)]
fn register_unix_handlers() {
    use std::os::raw::c_int;

    // Only async-signal-safe work here: two atomic stores.
    extern "C" fn on_shutdown_signal(_: c_int) {
        SIGNAL_COUNT.fetch_add(1, Ordering::Relaxed);
        SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
    }

    // SAFETY: the handler only touches atomics.
    unsafe {
        libc::signal(libc::SIGINT, on_shutdown_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_shutdown_signal as libc::sighandler_t);
    }

    debug!("Unix signal handlers registered");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_until_past_deadline_returns_immediately() {
        let handler = SignalHandler { _private: () };
        let start = Instant::now();
        let interrupted = handler.sleep_until(start);
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(interrupted, handler.shutdown_requested());
    }

    #[test]
    fn test_manual_shutdown_interrupts_sleep() {
        let handler = SignalHandler { _private: () };
        handler.request_shutdown();
        assert!(handler.shutdown_requested());

        let start = Instant::now();
        assert!(handler.sleep_until(start + Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
