//! In-process implementation of the libclock contract.
//!
//! Each context runs a worker thread that owns its alarms. Requests are
//! queued to the worker and completed from there, so completion and event
//! callbacks arrive on a thread other than the caller's, exactly as with the
//! native library. Context handles are opaque ids that are never reused.

use crate::ffi::{ClockCallBack, ClockHandle, ClockLibrary, RET_ERR, RET_OK};
use clock_common::config::SimulatedConfig;
use clock_common::event::{AlarmEvent, ClockEvent, ScheduledAlarm};
use libc::{c_char, c_int, c_void};
use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

/// Spacing between context ids; keeps them looking like aligned pointers.
const CONTEXT_ID_STRIDE: usize = 0x10;

static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(0x1000);

/// Callback plus the user data it must be invoked with.
#[derive(Clone, Copy)]
struct Completion {
    callback: ClockCallBack,
    user_data: *mut c_void,
}

// SAFETY: the user data is an opaque token owned by the caller, who keeps it
// valid until the callback runs; the worker only passes it back.
unsafe impl Send for Completion {}

impl Completion {
    fn invoke(self, code: c_int, message: &[u8]) {
        // SAFETY: `message` outlives the call; the callback contract is
        // upheld by whoever submitted the request.
        unsafe {
            (self.callback)(
                code,
                message.as_ptr().cast::<c_char>(),
                message.len(),
                self.user_data,
            );
        }
    }
}

enum Request {
    Created(Completion),
    Subscribe(Completion),
    SetAlarm {
        delay: Option<Duration>,
        message: String,
        done: Completion,
    },
    List(Completion),
    Inject {
        code: c_int,
        payload: String,
    },
    Destroy(Completion),
}

struct PendingAlarm {
    deadline: Instant,
    due: SystemTime,
    message: String,
}

/// In-process clock library.
#[derive(Debug)]
pub struct SimulatedLibrary {
    config: SimulatedConfig,
    contexts: Mutex<HashMap<usize, Sender<Request>>>,
}

impl Default for SimulatedLibrary {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

impl SimulatedLibrary {
    /// Create a library with the given limits.
    #[must_use]
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    fn contexts(&self) -> MutexGuard<'_, HashMap<usize, Sender<Request>>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, ctx: *mut c_void, request: Request) -> c_int {
        let addr = ctx as usize;
        let sent = self
            .contexts()
            .get(&addr)
            .is_some_and(|tx| tx.send(request).is_ok());
        if sent {
            RET_OK
        } else {
            warn!(ctx = addr, "request for unknown context");
            RET_ERR
        }
    }

    /// Emit a raw event for `handle` from its worker thread.
    ///
    /// Returns false if the context does not exist.
    pub fn inject_event(&self, handle: ClockHandle, code: c_int, payload: &str) -> bool {
        self.send(
            handle.as_ptr(),
            Request::Inject {
                code,
                payload: payload.to_owned(),
            },
        ) == RET_OK
    }

    /// Number of live contexts.
    #[must_use]
    pub fn live_contexts(&self) -> usize {
        self.contexts().len()
    }
}

impl ClockLibrary for SimulatedLibrary {
    fn name(&self) -> &'static str {
        "simulated"
    }

    unsafe fn clock_new(&self, callback: ClockCallBack, user_data: *mut c_void) -> *mut c_void {
        let id = NEXT_CONTEXT_ID.fetch_add(CONTEXT_ID_STRIDE, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        let max_alarms = self.config.max_alarms;

        let spawned = thread::Builder::new()
            .name(format!("clock-{id:x}"))
            .spawn(move || run_worker(&rx, max_alarms));
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn clock worker");
            return std::ptr::null_mut();
        }

        if tx.send(Request::Created(Completion { callback, user_data })).is_err() {
            return std::ptr::null_mut();
        }
        self.contexts().insert(id, tx);
        debug!(ctx = id, "simulated clock created");
        id as *mut c_void
    }

    unsafe fn clock_destroy(
        &self,
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int {
        let Some(tx) = self.contexts().remove(&(ctx as usize)) else {
            return RET_ERR;
        };
        match tx.send(Request::Destroy(Completion { callback, user_data })) {
            Ok(()) => RET_OK,
            Err(_) => RET_ERR,
        }
    }

    unsafe fn clock_set_alarm(
        &self,
        ctx: *mut c_void,
        time_millis: c_int,
        alarm_msg: *const c_char,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int {
        let message = if alarm_msg.is_null() {
            String::new()
        } else {
            // SAFETY: the caller passes a NUL-terminated string valid for the call.
            unsafe { CStr::from_ptr(alarm_msg) }
                .to_string_lossy()
                .into_owned()
        };
        let done = Completion {
            callback,
            user_data,
        };

        // Negative delays are reported through the callback, like any other
        // request failure.
        let delay = u64::try_from(time_millis).ok().map(Duration::from_millis);
        self.send(
            ctx,
            Request::SetAlarm {
                delay,
                message,
                done,
            },
        )
    }

    unsafe fn clock_list_alarms(
        &self,
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) -> c_int {
        self.send(
            ctx,
            Request::List(Completion {
                callback,
                user_data,
            }),
        )
    }

    unsafe fn clock_set_event_callback(
        &self,
        ctx: *mut c_void,
        callback: ClockCallBack,
        user_data: *mut c_void,
    ) {
        self.send(
            ctx,
            Request::Subscribe(Completion {
                callback,
                user_data,
            }),
        );
    }
}

fn run_worker(rx: &Receiver<Request>, max_alarms: usize) {
    let mut alarms: Vec<PendingAlarm> = Vec::new();
    let mut events: Option<Completion> = None;

    loop {
        let next_deadline = alarms.iter().map(|a| a.deadline).min();
        let received = match next_deadline {
            Some(deadline) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(request) => Some(request),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(request) => Some(request),
                Err(_) => break,
            },
        };

        if let Some(request) = received {
            match request {
                Request::Created(done) => done.invoke(RET_OK, b""),
                Request::Subscribe(sink) => events = Some(sink),
                Request::SetAlarm {
                    delay,
                    message,
                    done,
                } => {
                    let Some(delay) = delay else {
                        done.invoke(RET_ERR, b"alarm delay must not be negative");
                        continue;
                    };
                    if alarms.len() >= max_alarms {
                        done.invoke(RET_ERR, b"too many pending alarms");
                    } else {
                        trace!(delay_ms = delay.as_millis(), "alarm scheduled");
                        alarms.push(PendingAlarm {
                            deadline: Instant::now() + delay,
                            due: SystemTime::now() + delay,
                            message,
                        });
                        done.invoke(RET_OK, b"");
                    }
                }
                Request::List(done) => {
                    let listing = list_alarms(&alarms);
                    match serde_json::to_vec(&listing) {
                        Ok(json) => done.invoke(RET_OK, &json),
                        Err(e) => done.invoke(RET_ERR, e.to_string().as_bytes()),
                    }
                }
                Request::Inject { code, payload } => {
                    if let Some(sink) = events {
                        sink.invoke(code, payload.as_bytes());
                    }
                }
                Request::Destroy(done) => {
                    alarms.clear();
                    done.invoke(RET_OK, b"");
                    break;
                }
            }
        }

        fire_due(&mut alarms, events);
    }
    debug!("simulated clock worker stopped");
}

fn list_alarms(alarms: &[PendingAlarm]) -> Vec<ScheduledAlarm> {
    let mut ordered: Vec<&PendingAlarm> = alarms.iter().collect();
    ordered.sort_by_key(|a| a.deadline);
    ordered
        .into_iter()
        .map(|a| ScheduledAlarm {
            time: epoch_seconds(a.due).to_string(),
            msg: a.message.clone(),
        })
        .collect()
}

fn fire_due(alarms: &mut Vec<PendingAlarm>, events: Option<Completion>) {
    let now = Instant::now();
    let (mut due, pending): (Vec<_>, Vec<_>) = alarms.drain(..).partition(|a| a.deadline <= now);
    *alarms = pending;
    due.sort_by_key(|a| a.deadline);

    for alarm in due {
        let Some(sink) = events else {
            trace!("alarm fired without event subscriber");
            continue;
        };
        let event = ClockEvent::Alarm(AlarmEvent::at(SystemTime::now(), alarm.message));
        match event.to_json() {
            Ok(json) => sink.invoke(RET_OK, json.as_bytes()),
            Err(e) => sink.invoke(RET_ERR, e.to_string().as_bytes()),
        }
    }
}

fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
