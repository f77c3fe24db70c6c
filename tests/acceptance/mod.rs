//! Acceptance test suites for the libclock bridge.

mod alarm_test;
mod common;
mod lifecycle_test;
mod routing_test;
