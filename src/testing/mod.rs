//! Test harness: a scriptable fake device and a recording event handler.
//!
//! Exercising the facade needs neither vendor hardware nor a display, the
//! same way compositor integration tests run against a headless backend:
//! [`FakeDevice`] stands in for the vendor module and counts protocol calls
//! for assertions, [`RecordingHandler`] captures delivered events, and
//! [`Fixture`] wires both to a facade.

mod fake;
mod recording;

pub use fake::{FakeDevice, FakeDeviceState};
pub use recording::RecordingHandler;

use std::sync::Arc;
use std::time::Duration;

use crate::composer::HwComposer;
use crate::event::EventHandler;

/// Complete facade environment for tests: fake device plus recording
/// handler, with the device's test handle kept out for scripting.
pub struct Fixture {
    pub composer: HwComposer,
    pub device: Arc<FakeDeviceState>,
    pub handler: Arc<RecordingHandler>,
}

impl Fixture {
    /// Facade over a fake device without native VSync, at ~60Hz.
    pub fn new() -> Self {
        Self::with_options(Duration::from_nanos(16_666_666), false)
    }

    /// Facade over a fake device that advertises native VSync.
    pub fn with_native_vsync() -> Self {
        Self::with_options(Duration::from_nanos(16_666_666), true)
    }

    pub fn with_options(refresh_period: Duration, native_vsync: bool) -> Self {
        let device = FakeDevice::new();
        let state = device.handle();
        state.set_native_vsync(native_vsync);
        let handler = RecordingHandler::new();
        let composer = HwComposer::new(
            Some(Box::new(device)),
            Arc::clone(&handler) as Arc<dyn EventHandler>,
            refresh_period,
        );
        Self {
            composer,
            device: state,
            handler,
        }
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
