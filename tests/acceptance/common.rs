//! Shared helpers for acceptance tests.

#![allow(dead_code)] // Not every suite uses every helper

use clock_bridge::simulated::SimulatedLibrary;
use clock_bridge::{AlarmEvent, Clock, EventCallbacks};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on how long a 1s alarm may take to reach its handler.
pub const DELIVERY_BOUND: Duration = Duration::from_millis(2000);

/// A fresh in-process library with default limits.
pub fn library() -> Arc<SimulatedLibrary> {
    Arc::new(SimulatedLibrary::default())
}

/// Create a clock whose alarm handler forwards every event to a channel.
pub fn recording_clock(library: &Arc<SimulatedLibrary>) -> (Clock, Receiver<AlarmEvent>) {
    let clock = Clock::with_library(library.clone()).expect("clock creation failed");
    let (tx, rx) = mpsc::channel();
    clock.register_callbacks(EventCallbacks::new().on_alarm(move |alarm| {
        let _ = tx.send(alarm.clone());
    }));
    (clock, rx)
}

/// An alarm event payload as libclock would emit it.
pub fn alarm_json(msg: &str) -> String {
    format!(r#"{{"eventType":"clock_alarm","time":"1718000000","msg":"{msg}"}}"#)
}
