//! Monotonic clock access.
//!
//! VSync deadlines and delivered timestamps are nanoseconds on
//! CLOCK_MONOTONIC, the clock the device stamps its own pulses with.
//! `std::time::Instant` is opaque and cannot be compared against
//! device-reported values, so the clock is read directly.

/// Current CLOCK_MONOTONIC time in nanoseconds.
pub(crate) fn monotonic_nanos() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out-pointer and CLOCK_MONOTONIC always exists
    // on the platforms this crate targets.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    debug_assert_eq!(rc, 0, "clock_gettime(CLOCK_MONOTONIC) cannot fail");
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}
