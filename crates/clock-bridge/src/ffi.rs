//! C ABI of libclock and the library abstraction the bridge drives.
//!
//! Every request entry point takes a completion callback plus an opaque
//! user-data pointer and eventually invokes that callback, from a thread
//! owned by the library, with `(return code, message bytes, length, user data)`.
//! Events use the same callback shape through `clock_set_event_callback`.
//!
//! ```c
//! typedef void (*ClockCallBack)(int callerRet, const char* msg, size_t len, void* userData);
//! ```

use libc::{c_char, c_int, c_void, size_t};
use std::fmt;
use std::ptr::NonNull;

/// Request completed successfully.
pub const RET_OK: c_int = 0;
/// Request failed; the message buffer carries the reason.
pub const RET_ERR: c_int = 1;
/// Request was submitted without a callback.
pub const RET_MISSING_CALLBACK: c_int = 2;

/// Callback signature shared by completions and events.
pub type ClockCallBack =
    unsafe extern "C" fn(caller_ret: c_int, msg: *const c_char, len: size_t, user_data: *mut c_void);

/// The libclock entry points.
///
/// [`crate::sys::NativeLibrary`] forwards to the shared library and
/// [`crate::simulated::SimulatedLibrary`] reproduces the contract in-process.
///
/// # Contract
///
/// - `clock_destroy`, `clock_set_alarm` and `clock_list_alarms` return
///   [`RET_OK`] when the request was accepted. In that case `callback` is
///   invoked exactly once with `user_data`. Any other return value means the
///   callback will never be invoked for this request.
/// - `clock_new` returns NULL if the context could not be created; the
///   callback is then never invoked.
/// - Message buffers are only valid for the duration of the callback.
pub trait ClockLibrary: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Create a clock context.
    ///
    /// # Safety
    ///
    /// `user_data` must stay valid until `callback` has been invoked with it.
    unsafe fn clock_new(&self, callback: ClockCallBack, user_data: *mut c_void) -> *mut c_void;

    /// Destroy a clock context.
    ///
    /// # Safety
    ///
    /// `ctx` must come from `clock_new` on this library and not be destroyed yet.
    /// `user_data` must stay valid until `callback` has been invoked with it.
    unsafe fn clock_destroy(
        &self,
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int;

    /// Schedule an alarm `time_millis` from now carrying `alarm_msg`.
    ///
    /// # Safety
    ///
    /// As for [`ClockLibrary::clock_destroy`]; `alarm_msg` must be a valid
    /// NUL-terminated string for the duration of the call.
    unsafe fn clock_set_alarm(
        &self,
        ctx: *mut c_void,
        time_millis: c_int,
        alarm_msg: *const c_char,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int;

    /// List the pending alarms as JSON.
    ///
    /// # Safety
    ///
    /// As for [`ClockLibrary::clock_destroy`].
    unsafe fn clock_list_alarms(
        &self,
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int;

    /// Subscribe `callback` to the events of `ctx`.
    ///
    /// # Safety
    ///
    /// `ctx` must be a live context of this library.
    unsafe fn clock_set_event_callback(
        &self,
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    );
}

/// Opaque handle of one native clock context.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockHandle(NonNull<c_void>);

// SAFETY: the handle is an opaque token. The library synchronizes access to
// the context it names; the bridge never dereferences it.
unsafe impl Send for ClockHandle {}
unsafe impl Sync for ClockHandle {}

impl ClockHandle {
    /// Wrap a raw context pointer, returning `None` for NULL.
    #[must_use]
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Raw context pointer for foreign calls.
    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Address of the context, used as the registry key.
    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for ClockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClockHandle({:#x})", self.addr())
    }
}

/// Copy a foreign message buffer into owned bytes.
///
/// # Safety
///
/// If `msg` is non-NULL it must point to at least `len` readable bytes.
pub(crate) unsafe fn copy_message(msg: *const c_char, len: size_t) -> Vec<u8> {
    if msg.is_null() || len == 0 {
        return Vec::new();
    }
    // SAFETY: guaranteed by the caller.
    unsafe { std::slice::from_raw_parts(msg.cast::<u8>(), len) }.to_vec()
}
