//! Monotonic time source.
//!
//! The scheduler never sleeps on this clock; it only stamps atoms and
//! compares deadlines. Routing all reads through the trait lets tests
//! substitute a manually advanced clock and drive every timeout path
//! deterministically.

use crate::types::TimeNs;

/// Source of monotonic timestamps for watchdog bookkeeping.
pub trait Clock {
    fn now(&self) -> TimeNs;
}

/// CLOCK_MONOTONIC in nanoseconds.
#[derive(Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> TimeNs {
        let mut time = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let ret = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut time) };
        assert!(ret == 0);
        time.tv_sec as u64 * 1_000_000_000 + time.tv_nsec as u64
    }
}
