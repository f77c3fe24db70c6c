//! Safe handle over one libclock context.
//!
//! # Threading Model
//!
//! - **Caller threads**: `new`, `destroy`, `set_alarm` and `list_alarms`
//!   block until the library signals completion. Requests on one clock may
//!   run concurrently; `destroy` waits for them to finish first.
//! - **Library threads**: completion and event callbacks. Registered
//!   handlers run here and must not make blocking calls on a clock of the
//!   same library, since the library thread that would complete them is
//!   the one running the handler. [`Clock::state`] and the `Debug` output
//!   never block: while a destroy is waiting on the library they report
//!   [`InstanceState::Destroying`].

use crate::dispatch::global_event_callback;
use crate::ffi::{ClockHandle, ClockLibrary, RET_ERR, RET_OK};
use crate::pending::blocking_call;
use crate::registry::clocks;
use clock_common::config::{Backend, BridgeConfig, DEFAULT_EVENT_CHANNEL_CAPACITY};
use clock_common::error::{ClockError, ClockResult};
use clock_common::event::{decode_alarm_list, AlarmEvent, ClockEvent, ScheduledAlarm};
use clock_common::state::InstanceState;
use libc::c_int;
use static_assertions::assert_impl_all;
use std::ffi::CString;
use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Handler invoked when an alarm fires.
pub type AlarmHandler = Arc<dyn Fn(&AlarmEvent) + Send + Sync>;

/// Handlers for the events a clock emits.
#[derive(Clone, Default)]
pub struct EventCallbacks {
    /// Called with the fire time and message of each alarm.
    pub on_alarm: Option<AlarmHandler>,
}

impl EventCallbacks {
    /// Create an empty handler set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the alarm handler.
    #[must_use]
    pub fn on_alarm<F>(mut self, handler: F) -> Self
    where
        F: Fn(&AlarmEvent) + Send + Sync + 'static,
    {
        self.on_alarm = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for EventCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCallbacks")
            .field("on_alarm", &self.on_alarm.is_some())
            .finish()
    }
}

/// Event receiving side of a clock, reachable from the registry.
pub(crate) struct ClockInner {
    handle: ClockHandle,
    callbacks: RwLock<EventCallbacks>,
    subscribers: Mutex<Vec<SyncSender<ClockEvent>>>,
    channel_capacity: usize,
}

impl ClockInner {
    fn new(handle: ClockHandle, channel_capacity: usize) -> Self {
        Self {
            handle,
            callbacks: RwLock::new(EventCallbacks::default()),
            subscribers: Mutex::new(Vec::new()),
            channel_capacity,
        }
    }

    pub(crate) fn handle(&self) -> ClockHandle {
        self.handle
    }

    /// Decode an event payload and hand it to the registered handlers.
    pub(crate) fn on_event(&self, payload: &[u8]) {
        let event = match ClockEvent::decode(payload) {
            Ok(event) => event,
            Err(e) => {
                error!(handle = ?self.handle, error = %e, "could not decode event");
                return;
            }
        };

        match &event {
            ClockEvent::Alarm(alarm) => {
                // Clone out so handlers may re-register without deadlocking.
                let handler = self
                    .callbacks
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .on_alarm
                    .clone();
                match handler {
                    Some(handler) => handler(alarm),
                    None => debug!(handle = ?self.handle, "no alarm handler registered"),
                }
            }
            ClockEvent::Unknown => {
                debug!(handle = ?self.handle, "ignoring unrecognized event");
                return;
            }
        }

        self.publish(event);
    }

    fn publish(&self, event: ClockEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(handle = ?self.handle, "event channel full, dropping event");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

/// A libclock instance.
///
/// Created with [`Clock::new`] or [`ClockBuilder`]. The native context is
/// released by [`Clock::destroy`], or on drop if still live.
pub struct Clock {
    inner: Arc<ClockInner>,
    library: Arc<dyn ClockLibrary>,
    state: RwLock<InstanceState>,
}

assert_impl_all!(Clock: Send, Sync);
assert_impl_all!(EventCallbacks: Send, Sync);

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("handle", &self.inner.handle)
            .field("library", &self.library.name())
            .field("state", &self.state())
            .finish()
    }
}

impl Clock {
    /// Create a clock on the default library.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Foreign`] if the library fails to create the
    /// context, or [`ClockError::Config`] if no library is compiled in.
    pub fn new() -> ClockResult<Self> {
        ClockBuilder::new().build()
    }

    /// Create a clock on the given library.
    ///
    /// # Errors
    ///
    /// As for [`Clock::new`].
    pub fn with_library(library: Arc<dyn ClockLibrary>) -> ClockResult<Self> {
        ClockBuilder::new().library(library).build()
    }

    /// Start configuring a clock.
    #[must_use]
    pub fn builder() -> ClockBuilder {
        ClockBuilder::new()
    }

    fn create(library: Arc<dyn ClockLibrary>, channel_capacity: usize) -> ClockResult<Self> {
        debug!(library = library.name(), "creating clock");

        let (handle, reply) = blocking_call("new", |callback, user_data| {
            // SAFETY: `user_data` is kept alive by `blocking_call` until the
            // completion callback consumes it.
            let ctx = unsafe { library.clock_new(callback, user_data) };
            ClockHandle::from_raw(ctx).ok_or(RET_ERR)
        })?;

        if let Err(e) = reply.into_result("new") {
            error!(?handle, error = %e, "failed to create clock");
            release_failed_context(library.as_ref(), handle);
            return Err(e);
        }

        let inner = Arc::new(ClockInner::new(handle, channel_capacity));
        clocks().register(handle, &inner);

        // The handle doubles as user data so the shared callback can find
        // its way back to this clock.
        // SAFETY: `handle` is a live context of `library`.
        unsafe {
            library.clock_set_event_callback(handle.as_ptr(), global_event_callback, handle.as_ptr());
        }

        info!(?handle, "created clock");
        Ok(Self {
            inner,
            library,
            state: RwLock::new(InstanceState::Live),
        })
    }

    /// Handle of the native context.
    #[must_use]
    pub fn handle(&self) -> ClockHandle {
        self.inner.handle
    }

    /// Current lifecycle state.
    ///
    /// Only `destroy` holds the state exclusively, so a contended lock means
    /// a destroy is in progress.
    #[must_use]
    pub fn state(&self) -> InstanceState {
        match self.state.try_read() {
            Ok(state) => *state,
            Err(TryLockError::Poisoned(e)) => *e.into_inner(),
            Err(TryLockError::WouldBlock) => InstanceState::Destroying,
        }
    }

    /// Name of the library driving this clock.
    #[must_use]
    pub fn library_name(&self) -> &'static str {
        self.library.name()
    }

    /// Replace the registered event handlers.
    ///
    /// Events already being delivered may still reach the previous handlers.
    pub fn register_callbacks(&self, callbacks: EventCallbacks) {
        *self
            .inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner) = callbacks;
        debug!(handle = ?self.inner.handle, "registered event callbacks");
    }

    /// Receive recognized events on a bounded channel.
    ///
    /// Events that do not fit in the channel are dropped with a warning.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<ClockEvent> {
        let (tx, rx) = mpsc::sync_channel(self.inner.channel_capacity);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Schedule an alarm `delay` from now carrying `message`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidArgument`] if the delay does not fit a C
    /// `int` of milliseconds or the message contains a NUL byte,
    /// [`ClockError::InvalidInstance`] after destroy, and
    /// [`ClockError::Foreign`] if the library reports a failure.
    pub fn set_alarm(&self, delay: Duration, message: &str) -> ClockResult<()> {
        let millis = c_int::try_from(delay.as_millis()).map_err(|_| {
            ClockError::InvalidArgument(format!("alarm delay {delay:?} is too large"))
        })?;
        let alarm_msg = CString::new(message).map_err(|_| {
            ClockError::InvalidArgument("alarm message contains a NUL byte".into())
        })?;

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        self.ensure_live(*state)?;

        debug!(handle = ?self.inner.handle, millis, "setting alarm");
        let ((), reply) = blocking_call("set_alarm", |callback, user_data| {
            // SAFETY: the context is live while the state lock is held and
            // `alarm_msg` outlives the call.
            let code = unsafe {
                self.library.clock_set_alarm(
                    self.inner.handle.as_ptr(),
                    millis,
                    alarm_msg.as_ptr(),
                    callback,
                    user_data,
                )
            };
            accepted(code)
        })?;
        reply.into_result("set_alarm")?;

        info!(handle = ?self.inner.handle, millis, "alarm set");
        Ok(())
    }

    /// Fetch the pending alarms as the JSON text returned by the library.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidInstance`] after destroy,
    /// [`ClockError::Foreign`] if the library reports a failure, and
    /// [`ClockError::Decode`] if the reply is not UTF-8.
    pub fn list_alarms_raw(&self) -> ClockResult<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        self.ensure_live(*state)?;

        let ((), reply) = blocking_call("list_alarms", |callback, user_data| {
            // SAFETY: the context is live while the state lock is held.
            let code = unsafe {
                self.library
                    .clock_list_alarms(self.inner.handle.as_ptr(), callback, user_data)
            };
            accepted(code)
        })?;
        let reply = reply.into_result("list_alarms")?;

        String::from_utf8(reply.message)
            .map_err(|e| ClockError::Decode(format!("alarm list is not UTF-8: {e}")))
    }

    /// Fetch and decode the pending alarms.
    ///
    /// # Errors
    ///
    /// As for [`Clock::list_alarms_raw`], plus [`ClockError::Decode`] if the
    /// reply is not a list of alarms.
    pub fn list_alarms(&self) -> ClockResult<Vec<ScheduledAlarm>> {
        let raw = self.list_alarms_raw()?;
        decode_alarm_list(&raw).map_err(|e| ClockError::Decode(e.to_string()))
    }

    /// Release the native context.
    ///
    /// On success the handle leaves the registry and later events for it are
    /// dropped. A failed destroy leaves the clock live.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidInstance`] if the clock is already
    /// destroyed, and [`ClockError::Foreign`] if the library fails.
    pub fn destroy(&self) -> ClockResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.ensure_live(*state)?;

        debug!(handle = ?self.inner.handle, "destroying clock");
        state.transition_to(InstanceState::Destroying)?;

        let result = blocking_call("destroy", |callback, user_data| {
            // SAFETY: the context is live and no other request is in flight
            // while the write lock is held.
            let code = unsafe {
                self.library
                    .clock_destroy(self.inner.handle.as_ptr(), callback, user_data)
            };
            accepted(code)
        })
        .and_then(|((), reply)| reply.into_result("destroy"));

        match result {
            Ok(_) => {
                clocks().unregister(self.inner.handle, &self.inner);
                state.transition_to(InstanceState::Destroyed)?;
                info!(handle = ?self.inner.handle, "destroyed clock");
                Ok(())
            }
            Err(e) => {
                state.transition_to(InstanceState::Live)?;
                error!(handle = ?self.inner.handle, error = %e, "failed to destroy clock");
                Err(e)
            }
        }
    }

    fn ensure_live(&self, state: InstanceState) -> ClockResult<()> {
        if state.is_live() {
            Ok(())
        } else {
            Err(ClockError::InvalidInstance(format!(
                "clock {:?} is {state}",
                self.inner.handle
            )))
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        if self.state().is_live() {
            if let Err(e) = self.destroy() {
                warn!(handle = ?self.inner.handle, error = %e, "destroy on drop failed");
            }
        }
    }
}

/// Destroy a possibly absent clock.
///
/// # Errors
///
/// Returns [`ClockError::InvalidInstance`] for `None`, otherwise as for
/// [`Clock::destroy`].
pub fn destroy(clock: Option<&Clock>) -> ClockResult<()> {
    match clock {
        Some(clock) => clock.destroy(),
        None => {
            let err = ClockError::InvalidInstance("clock is nil".into());
            error!(error = %err, "failed to destroy");
            Err(err)
        }
    }
}

/// Best-effort release of a context whose creation reported failure.
fn release_failed_context(library: &dyn ClockLibrary, handle: ClockHandle) {
    let result = blocking_call("destroy", |callback, user_data| {
        // SAFETY: `handle` came from `clock_new` and was never registered or
        // shared, so this is its only release.
        let code = unsafe { library.clock_destroy(handle.as_ptr(), callback, user_data) };
        accepted(code)
    })
    .and_then(|((), reply)| reply.into_result("destroy"));
    if let Err(e) = result {
        warn!(?handle, error = %e, "could not release context of failed clock");
    }
}

fn accepted(code: c_int) -> Result<(), c_int> {
    if code == RET_OK {
        Ok(())
    } else {
        Err(code)
    }
}

/// Builder for configuring a clock.
pub struct ClockBuilder {
    library: Option<Arc<dyn ClockLibrary>>,
    config: BridgeConfig,
}

impl Default for ClockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockBuilder {
    /// Create a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            library: None,
            config: BridgeConfig::default(),
        }
    }

    /// Drive the given library instead of the configured backend.
    #[must_use]
    pub fn library(mut self, library: Arc<dyn ClockLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Set the capacity of channels returned by [`Clock::subscribe`].
    #[must_use]
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    /// Set the full bridge configuration.
    #[must_use]
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the clock.
    ///
    /// # Errors
    ///
    /// As for [`Clock::new`].
    pub fn build(self) -> ClockResult<Clock> {
        let capacity = if self.config.event_channel_capacity == 0 {
            DEFAULT_EVENT_CHANNEL_CAPACITY
        } else {
            self.config.event_channel_capacity
        };
        let library = match self.library {
            Some(library) => library,
            None => library_for(&self.config)?,
        };
        Clock::create(library, capacity)
    }
}

/// Instantiate the library selected by `config.backend`.
///
/// # Errors
///
/// Returns [`ClockError::Config`] if the backend was not compiled in.
pub fn library_for(config: &BridgeConfig) -> ClockResult<Arc<dyn ClockLibrary>> {
    match config.backend {
        Backend::Simulated => simulated_library(config),
        Backend::Native => native_library(),
    }
}

#[cfg(feature = "simulated")]
#[allow(clippy::unnecessary_wraps)]
fn simulated_library(config: &BridgeConfig) -> ClockResult<Arc<dyn ClockLibrary>> {
    Ok(Arc::new(crate::simulated::SimulatedLibrary::new(
        config.simulated.clone(),
    )))
}

#[cfg(not(feature = "simulated"))]
fn simulated_library(_config: &BridgeConfig) -> ClockResult<Arc<dyn ClockLibrary>> {
    Err(ClockError::Config(
        "built without the `simulated` feature".into(),
    ))
}

#[cfg(feature = "native")]
#[allow(clippy::unnecessary_wraps)]
fn native_library() -> ClockResult<Arc<dyn ClockLibrary>> {
    Ok(Arc::new(crate::sys::NativeLibrary))
}

#[cfg(not(feature = "native"))]
fn native_library() -> ClockResult<Arc<dyn ClockLibrary>> {
    Err(ClockError::Config("built without the `native` feature".into()))
}
