//! Outbound event boundary.
//!
//! The facade never owns the handler; it shares a reference for its own
//! lifetime and calls it from whichever VSync source is active.

/// Sink for events delivered by the composition facade.
///
/// Calls arrive on a device-owned thread (native VSync) or on the fallback
/// timer thread, never on the caller's protocol thread. Implementations must
/// be non-blocking and must not assume any ordering between a delivered
/// VSync and any particular prepare/commit.
pub trait EventHandler: Send + Sync {
    /// A VSync pulse for `display` at `timestamp_ns` on the monotonic clock.
    ///
    /// Pulses from a given source arrive in increasing timestamp order,
    /// spaced by one refresh period in steady state.
    fn on_vsync_received(&self, display: usize, timestamp_ns: u64);

    /// The device changed composition state asynchronously (hot-plug,
    /// internal fault); the next frame must redo full prepare/commit.
    fn on_invalidate(&self);
}
