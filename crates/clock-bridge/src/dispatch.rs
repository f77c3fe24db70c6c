//! Inbound event routing.
//!
//! Every clock subscribes the same [`global_event_callback`] with its own
//! handle as user data. Events for handles that are not (or no longer)
//! registered are dropped without a trace beyond a debug log.

use crate::ffi::{copy_message, RET_OK};
use crate::registry::clocks;
use libc::{c_char, c_int, c_void, size_t};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// Event callback shared by every clock context.
///
/// `user_data` carries the handle of the context that emitted the event.
pub(crate) unsafe extern "C" fn global_event_callback(
    caller_ret: c_int,
    msg: *const c_char,
    len: size_t,
    user_data: *mut c_void,
) {
    // SAFETY: the buffer is valid for `len` bytes during the callback.
    let payload = unsafe { copy_message(msg, len) };
    route_event(caller_ret, &payload, user_data as usize);
}

/// Deliver one event payload to the clock registered under `addr`.
pub(crate) fn route_event(caller_ret: c_int, payload: &[u8], addr: usize) {
    if caller_ret != RET_OK {
        if payload.is_empty() {
            error!(caller_ret, "event callback reported failure");
        } else {
            error!(
                caller_ret,
                message = %String::from_utf8_lossy(payload),
                "event callback reported failure"
            );
        }
        return;
    }

    let Some(clock) = clocks().lookup(addr) else {
        debug!(handle = addr, "dropping event for unknown handle");
        return;
    };

    // Unwinding into the library's thread would abort the process.
    if panic::catch_unwind(AssertUnwindSafe(|| clock.on_event(payload))).is_err() {
        error!(handle = ?clock.handle(), "event handler panicked");
    }
}
