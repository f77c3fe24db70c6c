//! Instance lifecycle acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Create then destroy succeeds on both calls
//! - Destroying a missing or already destroyed instance errors without
//!   hanging or panicking
//! - Native contexts are released on destroy and on drop

use super::common::library;
use clock_bridge::{destroy, Clock, ClockError, InstanceState};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn test_create_then_destroy() {
    let library = library();
    let clock = Clock::with_library(library.clone()).expect("create failed");
    assert_eq!(clock.state(), InstanceState::Live);
    assert_eq!(library.live_contexts(), 1);

    clock.destroy().expect("destroy failed");
    assert_eq!(clock.state(), InstanceState::Destroyed);
    assert_eq!(library.live_contexts(), 0);
}

#[test]
fn test_destroy_nil_instance_errors() {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(destroy(None));
    });

    let result = rx
        .recv_timeout(Duration::from_secs(1))
        .expect("destroy of a nil instance hung");
    assert!(matches!(result, Err(ClockError::InvalidInstance(_))));
}

#[test]
fn test_destroy_twice_errors() {
    let clock = Clock::with_library(library()).unwrap();
    destroy(Some(&clock)).unwrap();

    let err = destroy(Some(&clock)).unwrap_err();
    assert!(matches!(err, ClockError::InvalidInstance(_)));
    assert_eq!(clock.state(), InstanceState::Destroyed);
}

#[test]
fn test_drop_releases_context() {
    let library = library();
    {
        let _clock = Clock::with_library(library.clone()).unwrap();
        assert_eq!(library.live_contexts(), 1);
    }
    assert_eq!(library.live_contexts(), 0);
}

#[test]
fn test_clock_is_usable_from_other_threads() {
    let clock = std::sync::Arc::new(Clock::with_library(library()).unwrap());

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let clock = std::sync::Arc::clone(&clock);
            thread::spawn(move || clock.set_alarm(Duration::from_secs(60), &format!("alarm {i}")))
        })
        .collect();
    for worker in workers {
        worker.join().unwrap().unwrap();
    }

    assert_eq!(clock.list_alarms().unwrap().len(), 4);
    clock.destroy().unwrap();
}
