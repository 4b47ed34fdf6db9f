use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic source of time, in nanoseconds.
///
/// Readings are never compared directly. The counter is allowed to wrap
/// around `u64::MAX`, so two readings are only ever related through
/// `remaining`, which looks at the sign of their wrapping difference.
/// That holds as long as the readings being compared are less than
/// ~292 years apart.
///
/// Delays are capped at `MAX_DELAY_NANOS`, half of that window, so a
/// deadline stays comparable with any other pending deadline even when
/// the earlier one is overdue and hasn't fired yet.
pub trait Clock {
    fn now(&self) -> u64;
}

/// Nanoseconds from `now` until `deadline`. Zero or negative means the
/// deadline has been reached.
#[inline]
pub fn remaining(deadline: u64, now: u64) -> i64 {
    deadline.wrapping_sub(now) as i64
}

/// The reading that is `delay` after `now`.
///
/// Delays are clamped to `MAX_DELAY_NANOS` so the result is always
/// considered to be in the future of `now`, and never more than half the
/// comparison window after any deadline that is already due.
#[inline]
pub fn deadline(now: u64, delay: Duration) -> u64 {
    now.wrapping_add(duration_nanos(delay))
}

/// The longest delay a deadline can be set with, ~146 years.
pub const MAX_DELAY_NANOS: u64 = (i64::MAX as u64) / 2;

/// Converts a duration to nanoseconds, clamped to `MAX_DELAY_NANOS`.
pub(crate) fn duration_nanos(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();

    if nanos > MAX_DELAY_NANOS as u128 {
        MAX_DELAY_NANOS
    } else {
        nanos as u64
    }
}

/// A `Clock` backed by `std::time::Instant`.
///
/// Readings start at `offset` when the clock is created. A non-zero
/// offset is only interesting for exercising wraparound, e.g. starting
/// a second before `u64::MAX`.
#[derive(Debug)]
pub struct MonotonicClock {
    base: Instant,
    offset: u64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    pub fn with_offset(offset: u64) -> Self {
        Self {
            base: Instant::now(),
            offset,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.offset
            .wrapping_add(duration_nanos(self.base.elapsed()))
    }
}

/// A `Clock` that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            nanos: AtomicU64::new(start),
        }
    }

    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    pub fn advance(&self, duration: Duration) {
        let delta = duration_nanos(duration);

        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.wrapping_add(delta))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_sign() {
        assert_eq!(remaining(100, 40), 60);
        assert_eq!(remaining(40, 100), -60);
        assert_eq!(remaining(7, 7), 0);
    }

    #[test]
    fn test_remaining_across_wrap() {
        let now = u64::MAX - 10;
        let later = deadline(now, Duration::from_nanos(20));

        // numerically smaller, but still in the future
        assert!(later < now);
        assert_eq!(remaining(later, now), 20);
        assert_eq!(remaining(now, later), -20);
    }

    #[test]
    fn test_deadline_clamps() {
        let d = deadline(0, Duration::MAX);

        assert_eq!(d, MAX_DELAY_NANOS);
        assert!(remaining(d, 0) > 0);
    }

    #[test]
    fn test_clamped_deadline_after_overdue() {
        // a deadline that was due a long time ago is still "before" one
        // set now with the longest possible delay
        let overdue = u64::MAX - 5;
        let now = overdue.wrapping_add(MAX_DELAY_NANOS / 2);
        let never = deadline(now, Duration::MAX);

        assert!(remaining(overdue, now) < 0);
        assert!(remaining(never, overdue) > 0);
        assert!(remaining(overdue, never) < 0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(u64::MAX);

        clock.advance(Duration::from_nanos(2));
        assert_eq!(clock.now(), 1);

        clock.set(42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn test_monotonic_clock_offset() {
        let clock = MonotonicClock::with_offset(u64::MAX);
        let first = clock.now();

        std::thread::sleep(Duration::from_millis(2));

        assert!(remaining(clock.now(), first) > 0);
    }
}
