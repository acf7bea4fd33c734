//! Software VSync fallback timer.
//!
//! Synthesizes VSync pulses with correct long-run periodicity on hardware
//! that cannot deliver them. A dedicated thread waits on an absolute
//! monotonic deadline; the deadline grid is anchored when the timer is first
//! armed and never re-phased afterwards, so scheduling delay shifts
//! individual pulses but never accumulates into drift.
//!
//! # Design Invariants
//!
//! 1. **Single lock**: the enabled flag and the next deadline are the only
//!    cross-thread state, behind one mutex/condvar pair. Enable/disable is a
//!    flag write plus a signal.
//!
//! 2. **Wake reasons are not trusted**: any wakeup (disable, spurious,
//!    signal) re-evaluates the state from scratch. Only a wait that ran the
//!    deadline down fires the callback, so a disable racing a sleep never
//!    produces a phantom pulse.
//!
//! 3. **Park, don't terminate**: disabling parks the thread on the condvar;
//!    the thread only exits when the timer is dropped.

use std::num::NonZeroU64;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use crate::event::EventHandler;
use crate::time::monotonic_nanos;

#[derive(Debug, Default)]
struct TimerState {
    enabled: bool,
    shutdown: bool,
    /// Next deadline in monotonic ns. `None` until the timer is first armed;
    /// the first arm anchors the phase of the grid.
    next_deadline: Option<u64>,
}

/// Periodic waiter synthesizing VSync when the device has no native event.
///
/// The thread starts parked; [`set_enabled`](Self::set_enabled) arms and
/// disarms it any number of times. Dropping the timer joins the thread.
pub struct VsyncTimer {
    shared: Arc<(Mutex<TimerState>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl VsyncTimer {
    /// Spawn the timer thread, parked until the first enable.
    ///
    /// `period` is the refresh period in nanoseconds, immutable for the
    /// timer's lifetime. Every fired timestamp lies on the grid
    /// `anchor + k * period`.
    pub fn new(period: NonZeroU64, handler: Arc<dyn EventHandler>) -> Self {
        let shared = Arc::new((Mutex::new(TimerState::default()), Condvar::new()));
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("vsync-timer".into())
            .spawn(move || run(thread_shared, period.get(), handler))
            .expect("failed to spawn vsync timer thread");
        Self {
            shared,
            thread: Some(thread),
        }
    }

    /// Toggle pulse delivery.
    ///
    /// Enabling wakes a parked thread immediately. The grid phase survives
    /// disable/enable cycles: re-enabling resumes on the original grid, at
    /// the next tick that is still in the future.
    pub fn set_enabled(&self, enabled: bool) {
        let (lock, cvar) = &*self.shared;
        let mut state = lock.lock().unwrap();
        if state.enabled != enabled {
            trace!(enabled, "vsync timer toggled");
            state.enabled = enabled;
            cvar.notify_all();
        }
    }

    pub fn is_enabled(&self) -> bool {
        let (lock, _) = &*self.shared;
        lock.lock().unwrap().enabled
    }
}

impl Drop for VsyncTimer {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.shared;
            let mut state = lock.lock().unwrap();
            state.shutdown = true;
            cvar.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Smallest deadline on the grid `{next + k * period}` strictly after `now`.
///
/// Used when scheduling delay ate one or more ticks: the timer realigns to
/// the next tick of the original grid instead of re-phasing to the wake
/// time, so `deadline % period` is invariant across any delay.
fn next_aligned_deadline(next: u64, now: u64, period: u64) -> u64 {
    debug_assert!(next <= now);
    let missed = (now - next) / period + 1;
    next + missed * period
}

fn run(shared: Arc<(Mutex<TimerState>, Condvar)>, period: u64, handler: Arc<dyn EventHandler>) {
    raise_thread_priority();

    let (lock, cvar) = &*shared;
    let mut state = lock.lock().unwrap();
    loop {
        if state.shutdown {
            return;
        }
        if !state.enabled {
            state = cvar.wait(state).unwrap();
            continue;
        }

        let now = monotonic_nanos();
        let next = match state.next_deadline {
            // First arm anchors the grid: the first aligned tick >= now is
            // now itself.
            None => {
                state.next_deadline = Some(now);
                now
            }
            Some(next) if next >= now => next,
            // One or more ticks were missed; skip to the original grid's
            // next future tick.
            Some(missed) => {
                let next = next_aligned_deadline(missed, now, period);
                trace!(missed, next, "vsync deadline realigned");
                state.next_deadline = Some(next);
                next
            }
        };

        if next > now {
            let (guard, result) = cvar
                .wait_timeout(state, Duration::from_nanos(next - now))
                .unwrap();
            state = guard;
            if !result.timed_out() {
                // Disable, shutdown or spurious wake: re-evaluate.
                continue;
            }
        }
        if state.shutdown || !state.enabled {
            continue;
        }
        if monotonic_nanos() < next {
            // Woke short of the deadline; sleep the remainder.
            continue;
        }

        state.next_deadline = Some(next + period);
        // Deliver with the lock released so the handler may call back into
        // set_enabled without deadlocking.
        drop(state);
        handler.on_vsync_received(0, next);
        state = lock.lock().unwrap();
    }
}

/// Pulse delivery paces the whole render loop, so ask for urgent-display
/// priority. Needs CAP_SYS_NICE; without it the timer runs at the default
/// priority, which is fine everywhere except heavily loaded systems.
fn raise_thread_priority() {
    // SAFETY: plain syscalls without pointer arguments. The `which` cast
    // papers over glibc/musl disagreeing on the parameter type.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, libc::gettid() as _, -8) };
    if rc != 0 {
        debug!("vsync timer thread keeps default priority");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PERIOD: u64 = 16_666_666;

    #[test]
    fn test_realign_after_small_delay() {
        // Missed the tick at 10 * PERIOD by half a period: the next tick is
        // the very next grid point.
        let next = 10 * PERIOD;
        let now = next + PERIOD / 2;
        assert_eq!(next_aligned_deadline(next, now, PERIOD), 11 * PERIOD);
    }

    #[test]
    fn test_realign_after_50ms_stall() {
        // A 50 ms stall eats three 16.6 ms ticks; the computed deadline is
        // the smallest grid point strictly after resumption, same phase.
        let next = 100 * PERIOD;
        let now = next + 50_000_000;
        let realigned = next_aligned_deadline(next, now, PERIOD);
        assert!(realigned > now);
        assert!(realigned - now <= PERIOD);
        assert_eq!(realigned % PERIOD, next % PERIOD);
    }

    #[test]
    fn test_realign_exactly_on_grid() {
        // `now` landing exactly on a grid point still moves strictly forward.
        let next = 5 * PERIOD;
        let now = 8 * PERIOD;
        assert_eq!(next_aligned_deadline(next, now, PERIOD), 9 * PERIOD);
    }

    #[test]
    fn test_realign_when_deadline_equals_now() {
        let next = 7 * PERIOD;
        assert_eq!(next_aligned_deadline(next, next, PERIOD), 8 * PERIOD);
    }

    proptest! {
        /// Phase is preserved across any sequence of oversleeps: every
        /// realigned deadline stays congruent to the anchor modulo the
        /// period and lands within one period after the wake time.
        #[test]
        fn prop_phase_preserved_across_oversleeps(
            anchor in 0u64..1_000_000_000,
            period in 1_000_000u64..50_000_000,
            delays in prop::collection::vec(0u64..200_000_000, 1..32),
        ) {
            let mut next = anchor;
            for delay in delays {
                let now = next + delay;
                let realigned = if next >= now {
                    next
                } else {
                    next_aligned_deadline(next, now, period)
                };
                prop_assert!(realigned >= now);
                prop_assert!(realigned - now <= period);
                prop_assert_eq!(realigned % period, anchor % period);
                // Fire, then advance one period, as the timer thread does.
                next = realigned + period;
            }
        }
    }
}
