//! Alarm delivery acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A 1000ms alarm reaches the handler within 2000ms with the exact message
//! - The reported alarm time is within one second of wall-clock time
//! - Subscribers receive the same alarm as the handler
//! - Pending alarms are listed until they fire

use super::common::{library, recording_clock, DELIVERY_BOUND};
use clock_bridge::{Clock, ClockError, ClockEvent};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[test]
fn test_alarm_fires_with_exact_message() {
    let library = library();
    let (clock, alarms) = recording_clock(&library);

    let start = Instant::now();
    clock
        .set_alarm(Duration::from_millis(1000), "wake up: äöü 🕰")
        .unwrap();

    let alarm = alarms
        .recv_timeout(DELIVERY_BOUND)
        .expect("alarm was not delivered in time");
    assert_eq!(alarm.msg, "wake up: äöü 🕰");
    assert!(start.elapsed() >= Duration::from_millis(900));

    clock.destroy().unwrap();
}

#[test]
fn test_alarm_time_matches_wall_clock() {
    let library = library();
    let (clock, alarms) = recording_clock(&library);

    clock.set_alarm(Duration::from_millis(200), "time check").unwrap();
    let alarm = alarms.recv_timeout(DELIVERY_BOUND).unwrap();

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let reported = alarm.epoch_seconds().expect("alarm time is not numeric");
    let now = i64::try_from(now).unwrap();
    assert!(
        (now - reported).abs() <= 1,
        "alarm time {reported} too far from {now}"
    );

    clock.destroy().unwrap();
}

#[test]
fn test_subscriber_sees_handler_alarm() {
    let library = library();
    let (clock, alarms) = recording_clock(&library);
    let events = clock.subscribe();

    clock.set_alarm(Duration::from_millis(100), "both").unwrap();

    let handled = alarms.recv_timeout(DELIVERY_BOUND).unwrap();
    match events.recv_timeout(DELIVERY_BOUND).unwrap() {
        ClockEvent::Alarm(published) => assert_eq!(published, handled),
        ClockEvent::Unknown => panic!("unknown event published"),
    }

    clock.destroy().unwrap();
}

#[test]
fn test_list_alarms_returns_pending() {
    let clock = Clock::with_library(library()).unwrap();
    assert!(clock.list_alarms().unwrap().is_empty());

    clock.set_alarm(Duration::from_secs(120), "later").unwrap();
    clock.set_alarm(Duration::from_secs(60), "sooner").unwrap();
    clock.set_alarm(Duration::from_millis(50), "now").unwrap();
    std::thread::sleep(Duration::from_millis(300));

    let messages: Vec<_> = clock
        .list_alarms()
        .unwrap()
        .into_iter()
        .map(|alarm| alarm.msg)
        .collect();
    assert_eq!(messages, ["sooner", "later"]);

    clock.destroy().unwrap();
}

#[test]
fn test_message_with_nul_is_rejected() {
    let clock = Clock::with_library(library()).unwrap();
    let err = clock
        .set_alarm(Duration::from_millis(10), "bad\0message")
        .unwrap_err();
    assert!(matches!(err, ClockError::InvalidArgument(_)));
    assert!(clock.list_alarms().unwrap().is_empty());
    clock.destroy().unwrap();
}

#[test]
fn test_pending_alarm_does_not_fire_after_destroy() {
    let library = library();
    let (clock, alarms) = recording_clock(&library);

    clock.set_alarm(Duration::from_millis(200), "never").unwrap();
    clock.destroy().unwrap();

    assert!(alarms.recv_timeout(Duration::from_millis(600)).is_err());
}
