//! Safe bindings for libclock, the native alarm clock library.
//!
//! This crate provides:
//! - [`Clock`], a handle over one native clock context with blocking
//!   `new`/`destroy`/`set_alarm`/`list_alarms` calls
//! - [`EventCallbacks`] and [`Clock::subscribe`] for asynchronous alarm events
//! - [`ClockLibrary`], the C ABI seam, with a linked [`sys::NativeLibrary`]
//!   (`native` feature) and an in-process [`simulated::SimulatedLibrary`]
//!   (`simulated` feature, on by default)

pub mod clock;
mod dispatch;
pub mod ffi;
mod pending;
mod registry;
#[cfg(feature = "simulated")]
pub mod simulated;
#[cfg(feature = "native")]
pub mod sys;

pub use clock::{destroy, library_for, AlarmHandler, Clock, ClockBuilder, EventCallbacks};
pub use clock_common::{
    AlarmEvent, Backend, BridgeConfig, ClockError, ClockEvent, ClockResult, InstanceState,
    ScheduledAlarm,
};
pub use ffi::{ClockCallBack, ClockHandle, ClockLibrary, RET_ERR, RET_MISSING_CALLBACK, RET_OK};
