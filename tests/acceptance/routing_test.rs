//! Event routing acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Unknown event types reach no handler and raise no error
//! - Events reported with a failure code are not dispatched
//! - Events for a destroyed handle are dropped
//! - Concurrent clocks never receive each other's alarms

use super::common::{alarm_json, library, recording_clock, DELIVERY_BOUND};
use clock_bridge::{Clock, EventCallbacks, RET_ERR, RET_OK};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

const QUIET_PERIOD: Duration = Duration::from_millis(300);

#[test]
fn test_unknown_event_type_is_ignored() {
    let library = library();
    let (clock, alarms) = recording_clock(&library);
    let events = clock.subscribe();

    assert!(library.inject_event(
        clock.handle(),
        RET_OK,
        r#"{"eventType":"clock_tick","time":"1"}"#
    ));
    assert!(alarms.recv_timeout(QUIET_PERIOD).is_err());
    assert!(events.try_recv().is_err());

    // The clock keeps working afterwards.
    assert!(library.inject_event(clock.handle(), RET_OK, &alarm_json("still here")));
    assert_eq!(alarms.recv_timeout(DELIVERY_BOUND).unwrap().msg, "still here");

    clock.destroy().unwrap();
}

#[test]
fn test_failed_event_is_not_dispatched() {
    let library = library();
    let (clock, alarms) = recording_clock(&library);

    assert!(library.inject_event(clock.handle(), RET_ERR, &alarm_json("broken")));
    assert!(alarms.recv_timeout(QUIET_PERIOD).is_err());

    clock.destroy().unwrap();
}

#[test]
fn test_event_after_destroy_is_dropped() {
    let library = library();
    let (clock, alarms) = recording_clock(&library);
    let handle = clock.handle();

    clock.destroy().unwrap();

    assert!(!library.inject_event(handle, RET_OK, &alarm_json("stale")));
    assert!(alarms.recv_timeout(QUIET_PERIOD).is_err());
}

#[test]
fn test_concurrent_clocks_do_not_cross_deliver() {
    const CLOCKS: usize = 4;

    let library = library();
    let barrier = Arc::new(Barrier::new(CLOCKS));
    let workers: Vec<_> = (0..CLOCKS)
        .map(|index| {
            let library = library.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let clock = Clock::with_library(library).unwrap();
                let received = Arc::new(Mutex::new(Vec::new()));
                let sink = Arc::clone(&received);
                clock.register_callbacks(EventCallbacks::new().on_alarm(move |alarm| {
                    sink.lock().unwrap().push(alarm.msg.clone());
                }));

                barrier.wait();
                let message = format!("clock {index}");
                for _ in 0..3 {
                    clock.set_alarm(Duration::from_millis(100), &message).unwrap();
                }
                thread::sleep(Duration::from_millis(100) + DELIVERY_BOUND / 2);
                clock.destroy().unwrap();

                let received = received.lock().unwrap().clone();
                (message, received)
            })
        })
        .collect();

    for worker in workers {
        let (message, received) = worker.join().unwrap();
        assert_eq!(received.len(), 3, "{message} got {received:?}");
        assert!(
            received.iter().all(|msg| *msg == message),
            "{message} got {received:?}"
        );
    }
}
