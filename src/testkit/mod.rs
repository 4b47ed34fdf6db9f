//! Helpers for testing code that schedules work on other threads.

use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Repeatedly evaluate the provided function upto
/// a specified limit, sleeping briefly between
/// executions.
///
/// If the function doesn't return true within the
/// limit, this panics and thus fails the test.
pub fn eventually<F: FnMut() -> bool>(limit: Duration, mut f: F) {
    let start = Instant::now();

    while !f() {
        if start.elapsed() > limit {
            panic!("provided function hasn't returned true within {:?}", limit);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Repeatedly evaluate the provided function for the
/// whole of `period`, panicking if it ever returns true.
///
/// This is the counterpart of `eventually`, for asserting
/// that something (e.g. cancelled work) doesn't happen.
pub fn never<F: FnMut() -> bool>(period: Duration, mut f: F) {
    let start = Instant::now();

    loop {
        if f() {
            panic!("provided function returned true within {:?}", period);
        }

        if start.elapsed() > period {
            return;
        }

        thread::sleep(POLL_INTERVAL);
    }
}
