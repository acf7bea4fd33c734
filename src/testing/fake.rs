//! Scriptable stand-in for the vendor device.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::device::{
    ComposerDevice, DeviceCallbacks, DeviceEvent, DeviceResult, DisplayHandle, SurfaceHandle,
};
use crate::error::DeviceError;
use crate::layer::{CompositionType, LayerFlags, WorkList};

#[derive(Default)]
struct Inner {
    native_vsync: bool,
    /// How many non-skip layers each prepare promotes to overlays, front to
    /// back. Enough to exercise snapshot accounting without modeling real
    /// hardware.
    overlay_budget: usize,
    fail_next: Option<DeviceError>,
    prepare_calls: usize,
    commit_calls: usize,
    release_calls: usize,
    event_control_log: Vec<(DeviceEvent, bool)>,
    last_commit_target: Option<(DisplayHandle, SurfaceHandle)>,
    last_prepare_geometry_changed: Option<bool>,
    callbacks: Option<Arc<dyn DeviceCallbacks>>,
}

/// Shared test handle onto a [`FakeDevice`], kept by the test after the
/// device itself moves into the facade.
#[derive(Default)]
pub struct FakeDeviceState {
    inner: Mutex<Inner>,
}

impl FakeDeviceState {
    /// Advertise (or not) native VSYNC. Must be set before the facade is
    /// constructed; the facade queries it once.
    pub fn set_native_vsync(&self, supported: bool) {
        self.inner.lock().unwrap().native_vsync = supported;
    }

    pub fn set_overlay_budget(&self, budget: usize) {
        self.inner.lock().unwrap().overlay_budget = budget;
    }

    /// Make the next protocol call fail with `err`, once.
    pub fn fail_next_call(&self, err: DeviceError) {
        self.inner.lock().unwrap().fail_next = Some(err);
    }

    pub fn prepare_calls(&self) -> usize {
        self.inner.lock().unwrap().prepare_calls
    }

    pub fn commit_calls(&self) -> usize {
        self.inner.lock().unwrap().commit_calls
    }

    pub fn release_calls(&self) -> usize {
        self.inner.lock().unwrap().release_calls
    }

    pub fn event_control_log(&self) -> Vec<(DeviceEvent, bool)> {
        self.inner.lock().unwrap().event_control_log.clone()
    }

    pub fn last_commit_target(&self) -> Option<(DisplayHandle, SurfaceHandle)> {
        self.inner.lock().unwrap().last_commit_target
    }

    /// Geometry-changed flag observed by the most recent prepare.
    pub fn last_prepare_geometry_changed(&self) -> Option<bool> {
        self.inner.lock().unwrap().last_prepare_geometry_changed
    }

    pub fn has_callbacks(&self) -> bool {
        self.inner.lock().unwrap().callbacks.is_some()
    }

    /// Simulate a device-thread VSync pulse through the registered
    /// callbacks.
    ///
    /// # Panics
    ///
    /// Panics if no callbacks were registered.
    pub fn fire_vsync(&self, display: usize, timestamp_ns: u64) {
        let callbacks = self
            .inner
            .lock()
            .unwrap()
            .callbacks
            .clone()
            .expect("no callbacks registered");
        callbacks.vsync(display, timestamp_ns);
    }

    /// Simulate a device-thread invalidate through the registered
    /// callbacks.
    ///
    /// # Panics
    ///
    /// Panics if no callbacks were registered.
    pub fn fire_invalidate(&self) {
        let callbacks = self
            .inner
            .lock()
            .unwrap()
            .callbacks
            .clone()
            .expect("no callbacks registered");
        callbacks.invalidate();
    }

    fn take_failure(&self) -> DeviceResult {
        match self.inner.lock().unwrap().fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Fake vendor device for tests.
///
/// Classification script: the first `overlay_budget` layers without the
/// SKIP flag become overlays, everything else goes to the framebuffer path.
pub struct FakeDevice {
    state: Arc<FakeDeviceState>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeDeviceState::default()),
        }
    }

    /// Test handle shared with the internal state; keep it before boxing
    /// the device into a facade.
    pub fn handle(&self) -> Arc<FakeDeviceState> {
        Arc::clone(&self.state)
    }
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposerDevice for FakeDevice {
    fn prepare(&mut self, list: &mut WorkList) -> DeviceResult {
        {
            let mut inner = self.state.inner.lock().unwrap();
            inner.prepare_calls += 1;
            inner.last_prepare_geometry_changed = Some(list.geometry_changed());
        }
        self.state.take_failure()?;

        let budget = self.state.inner.lock().unwrap().overlay_budget;
        let mut promoted = 0;
        for layer in list.layers_mut() {
            if promoted < budget && !layer.flags.contains(LayerFlags::SKIP) {
                layer.composition_type = CompositionType::Overlay;
                promoted += 1;
            } else {
                layer.composition_type = CompositionType::Framebuffer;
            }
        }
        debug!(promoted, total = list.len(), "fake device classified list");
        Ok(())
    }

    fn commit(
        &mut self,
        display: DisplayHandle,
        surface: SurfaceHandle,
        _list: &mut WorkList,
    ) -> DeviceResult {
        {
            let mut inner = self.state.inner.lock().unwrap();
            inner.commit_calls += 1;
            inner.last_commit_target = Some((display, surface));
        }
        self.state.take_failure()
    }

    fn release(&mut self) -> DeviceResult {
        self.state.inner.lock().unwrap().release_calls += 1;
        self.state.take_failure()
    }

    fn event_control(&mut self, event: DeviceEvent, enabled: bool) -> DeviceResult {
        self.state
            .inner
            .lock()
            .unwrap()
            .event_control_log
            .push((event, enabled));
        self.state.take_failure()
    }

    fn register_callbacks(&mut self, callbacks: Arc<dyn DeviceCallbacks>) {
        self.state.inner.lock().unwrap().callbacks = Some(callbacks);
    }

    fn supports_native_vsync(&self) -> bool {
        self.state.inner.lock().unwrap().native_vsync
    }
}
