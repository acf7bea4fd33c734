//! Thread-safe capture of delivered events for assertions.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::event::EventHandler;

#[derive(Default)]
struct Recorded {
    vsyncs: Vec<(usize, u64)>,
    invalidates: usize,
}

/// [`EventHandler`] that records every delivery and lets tests block until
/// enough pulses arrived.
#[derive(Default)]
pub struct RecordingHandler {
    inner: Mutex<Recorded>,
    cvar: Condvar,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delivered (display, timestamp) pairs, in arrival order.
    pub fn vsyncs(&self) -> Vec<(usize, u64)> {
        self.inner.lock().unwrap().vsyncs.clone()
    }

    pub fn vsync_count(&self) -> usize {
        self.inner.lock().unwrap().vsyncs.len()
    }

    pub fn invalidate_count(&self) -> usize {
        self.inner.lock().unwrap().invalidates
    }

    /// Block until at least `count` VSync deliveries were recorded. Returns
    /// false on timeout.
    pub fn wait_for_vsyncs(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut recorded = self.inner.lock().unwrap();
        while recorded.vsyncs.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.cvar.wait_timeout(recorded, deadline - now).unwrap();
            recorded = guard;
        }
        true
    }
}

impl EventHandler for RecordingHandler {
    fn on_vsync_received(&self, display: usize, timestamp_ns: u64) {
        let mut recorded = self.inner.lock().unwrap();
        recorded.vsyncs.push((display, timestamp_ns));
        self.cvar.notify_all();
    }

    fn on_invalidate(&self) {
        let mut recorded = self.inner.lock().unwrap();
        recorded.invalidates += 1;
        self.cvar.notify_all();
    }
}
