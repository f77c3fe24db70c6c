//! One-shot tokens turning callback-based foreign requests into blocking calls.
//!
//! For each request a [`PendingCall`] is parked in a process-wide table under
//! a fresh id, and that id is handed to the library as the opaque user-data
//! pointer. The shared [`completion_callback`] removes the entry, stores the
//! reply and releases its [`WaitGroup`] clone; the caller blocks in
//! [`WaitGroup::wait`] until then.
//!
//! The library never holds a pointer to Rust memory, so a callback that
//! arrives twice, or after the caller gave up on a rejected request, finds
//! no entry and is ignored.
//!
//! There is no timeout: a library that never completes an accepted request
//! blocks the caller forever.

use crate::ffi::{copy_message, ClockCallBack, RET_OK};
use clock_common::error::{ClockError, ClockResult};
use crossbeam_utils::sync::WaitGroup;
use libc::{c_char, c_int, c_void, size_t};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{trace, warn};

/// Ids start above zero so user data is never NULL.
static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);

/// Result of a completed foreign request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Return code passed to the completion callback.
    pub code: c_int,
    /// Message bytes, copied out of the foreign buffer.
    pub message: Vec<u8>,
}

impl Reply {
    /// Returns true if the library reported success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == RET_OK
    }

    /// Message decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn message_lossy(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }

    /// Turn a non-zero return code into a [`ClockError::Foreign`].
    pub fn into_result(self, op: &'static str) -> ClockResult<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(ClockError::foreign(op, self.code, self.message_lossy()))
        }
    }
}

/// In-flight request awaiting its completion callback.
#[derive(Debug)]
pub(crate) struct PendingCall {
    reply: Mutex<Option<Reply>>,
    signal: Mutex<Option<WaitGroup>>,
}

impl PendingCall {
    fn new(signal: WaitGroup) -> Self {
        Self {
            reply: Mutex::new(None),
            signal: Mutex::new(Some(signal)),
        }
    }

    /// Store the reply and wake the waiting caller.
    fn complete(&self, reply: Reply) {
        *self.reply.lock().unwrap_or_else(PoisonError::into_inner) = Some(reply);
        drop(
            self.signal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }

    fn take_reply(&self) -> Option<Reply> {
        self.reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Requests whose completion callback has not fired yet, keyed by token id.
fn in_flight() -> MutexGuard<'static, HashMap<usize, Arc<PendingCall>>> {
    static IN_FLIGHT: OnceLock<Mutex<HashMap<usize, Arc<PendingCall>>>> = OnceLock::new();
    IN_FLIGHT
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Completion callback shared by every blocking request.
///
/// `user_data` is the token id issued by [`blocking_call`].
pub(crate) unsafe extern "C" fn completion_callback(
    caller_ret: c_int,
    msg: *const c_char,
    len: size_t,
    user_data: *mut c_void,
) {
    let id = user_data as usize;
    let Some(token) = in_flight().remove(&id) else {
        warn!(token = id, caller_ret, "completion for unknown or finished request");
        return;
    };
    // SAFETY: the buffer is valid for `len` bytes during the callback.
    let message = unsafe { copy_message(msg, len) };
    trace!(token = id, caller_ret, len, "completion callback");
    token.complete(Reply {
        code: caller_ret,
        message,
    });
}

/// Submit a request and block until its completion callback fires.
///
/// `submit` receives the completion callback and the token pointer and
/// performs the foreign call. It returns `Err(code)` if the library rejected
/// the request up front. The caller then returns without waiting; a reply
/// the library already delivered supplies the error message, and any later
/// callback for the token is ignored.
pub(crate) fn blocking_call<T, F>(op: &'static str, submit: F) -> ClockResult<(T, Reply)>
where
    F: FnOnce(ClockCallBack, *mut c_void) -> Result<T, c_int>,
{
    let wait_group = WaitGroup::new();
    let token = Arc::new(PendingCall::new(wait_group.clone()));
    let id = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    in_flight().insert(id, Arc::clone(&token));
    let user_data = id as *mut c_void;

    let callback: ClockCallBack = completion_callback;
    let submitted = match submit(callback, user_data) {
        Ok(value) => value,
        Err(code) => {
            in_flight().remove(&id);
            let message = token.take_reply().map_or_else(
                || "request rejected by library".to_owned(),
                |reply| reply.message_lossy(),
            );
            warn!(op, code, %message, "request rejected by library");
            return Err(ClockError::foreign(op, code, message));
        }
    };

    trace!(op, token = id, "waiting for completion");
    wait_group.wait();

    let reply = token
        .take_reply()
        .ok_or_else(|| ClockError::foreign(op, -1, "completion signalled without a reply"))?;
    Ok((submitted, reply))
}
