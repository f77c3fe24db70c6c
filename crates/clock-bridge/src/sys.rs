//! Native libclock bindings.
//!
//! These mirror `libclock.h` exactly. Linked at load time via
//! `#[link(name = "clock")]`; `build.rs` adds `LIBCLOCK_DIR` to the
//! search path.

use crate::ffi::{ClockCallBack, ClockLibrary};
use libc::{c_char, c_int, c_void};

#[link(name = "clock")]
extern "C" {
    fn clock_new(callback: ClockCallBack, user_data: *mut c_void) -> *mut c_void;

    fn clock_destroy(ctx: *mut c_void, callback: ClockCallBack, user_data: *mut c_void) -> c_int;

    fn clock_set_alarm(
        ctx: *mut c_void,
        time_millis: c_int,
        alarm_msg: *const c_char,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int;

    fn clock_list_alarms(
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int;

    fn clock_set_event_callback(ctx: *mut c_void, callback: ClockCallBack, user_data: *mut c_void);
}

/// The linked libclock shared library.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLibrary;

impl ClockLibrary for NativeLibrary {
    fn name(&self) -> &'static str {
        "native"
    }

    unsafe fn clock_new(&self, callback: ClockCallBack, user_data: *mut c_void) -> *mut c_void {
        // SAFETY: forwarded contract, see `ClockLibrary`.
        unsafe { clock_new(callback, user_data) }
    }

    unsafe fn clock_destroy(
        &self,
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int {
        // SAFETY: forwarded contract, see `ClockLibrary`.
        unsafe { clock_destroy(ctx, callback, user_data) }
    }

    unsafe fn clock_set_alarm(
        &self,
        ctx: *mut c_void,
        time_millis: c_int,
        alarm_msg: *const c_char,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int {
        // SAFETY: forwarded contract, see `ClockLibrary`.
        unsafe { clock_set_alarm(ctx, time_millis, alarm_msg, callback, user_data) }
    }

    unsafe fn clock_list_alarms(
        &self,
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int {
        // SAFETY: forwarded contract, see `ClockLibrary`.
        unsafe { clock_list_alarms(ctx, callback, user_data) }
    }

    unsafe fn clock_set_event_callback(
        &self,
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) {
        // SAFETY: forwarded contract, see `ClockLibrary`.
        unsafe { clock_set_event_callback(ctx, callback, user_data) }
    }
}
