//! Composition facade.
//!
//! [`HwComposer`] owns the work list, drives the two-phase prepare/commit
//! protocol against the device, and manages which VSync source is armed.
//! Protocol calls are made serially by one caller thread; the facade does no
//! internal locking, ordering is the caller's responsibility. VSync and
//! invalidate notifications run on other threads and never touch facade
//! state.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::device::{
    ComposerDevice, DeviceCallbacks, DeviceEvent, DisplayHandle, SurfaceHandle,
};
use crate::error::{Error, Result};
use crate::event::EventHandler;
use crate::layer::{CompositionType, Layer, WorkList};
use crate::vsync::VsyncTimer;

/// Which VSync source is currently armed. At most one at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VsyncSource {
    /// Delivery disabled.
    None,
    /// The device generates VSYNC itself.
    Native,
    /// The software fallback timer synthesizes pulses.
    Fallback,
}

/// Work-list protocol position. Misuse becomes an explicit
/// [`Error::InvalidState`] instead of undefined device behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    /// List allocated, not yet classified.
    Created,
    /// Last prepare succeeded; commit is legal.
    Prepared,
    /// Last commit consumed the classification; prepare must run again
    /// before the next commit.
    Committed,
}

/// Immutable per-type counts snapshotted by a successful prepare. Reading
/// them back never mutates anything.
#[derive(Debug, Clone, Copy, Default)]
struct Classification {
    overlay: usize,
    framebuffer: usize,
}

/// Typed replacement for the C callback trampolines: the device gets one
/// shared sink that forwards straight to the external handler. It holds no
/// facade state and takes no lock, so device-thread delivery can never
/// contend with protocol calls or the fallback timer.
struct CallbackBridge {
    handler: Arc<dyn EventHandler>,
}

impl DeviceCallbacks for CallbackBridge {
    fn invalidate(&self) {
        trace!("device invalidate");
        self.handler.on_invalidate();
    }

    fn vsync(&self, display: usize, timestamp_ns: u64) {
        self.handler.on_vsync_received(display, timestamp_ns);
    }
}

/// Facade over the vendor composition device.
///
/// Frame loop: [`create_work_list`](Self::create_work_list) whenever the
/// layer count changes, fill the layers, [`prepare`](Self::prepare), read
/// the classification, composite the framebuffer layers, then
/// [`commit`](Self::commit).
pub struct HwComposer {
    device: Option<Box<dyn ComposerDevice>>,
    refresh_period: NonZeroU64,
    list: Option<WorkList>,
    list_state: ListState,
    classification: Option<Classification>,
    display: Option<DisplayHandle>,
    surface: Option<SurfaceHandle>,
    vsync_timer: Option<VsyncTimer>,
    native_vsync: bool,
    vsync_source: VsyncSource,
}

impl HwComposer {
    /// Build the facade around an optional device.
    ///
    /// `device: None` models a machine without a hardware composition
    /// module: [`init_check`](Self::init_check) reports
    /// [`Error::Unavailable`] and every protocol call becomes a safe no-op
    /// with the same status.
    ///
    /// The fallback timer thread is spawned only when a device is present
    /// and does not advertise native VSYNC; on the native path it could
    /// never be armed.
    ///
    /// # Panics
    ///
    /// Panics if `refresh_period` is zero or does not fit in nanoseconds.
    pub fn new(
        device: Option<Box<dyn ComposerDevice>>,
        handler: Arc<dyn EventHandler>,
        refresh_period: Duration,
    ) -> Self {
        let period = u64::try_from(refresh_period.as_nanos())
            .ok()
            .and_then(NonZeroU64::new)
            .expect("refresh period must be a non-zero number of nanoseconds");

        let mut device = device;
        let mut native_vsync = false;
        if let Some(dev) = device.as_deref_mut() {
            native_vsync = dev.supports_native_vsync();
            dev.register_callbacks(Arc::new(CallbackBridge {
                handler: Arc::clone(&handler),
            }));
        }

        let vsync_timer = match &device {
            Some(_) if !native_vsync => Some(VsyncTimer::new(period, handler)),
            _ => None,
        };

        debug!(
            has_device = device.is_some(),
            native_vsync, "hardware composer initialized"
        );

        Self {
            device,
            refresh_period: period,
            list: None,
            list_state: ListState::Created,
            classification: None,
            display: None,
            surface: None,
            vsync_timer,
            native_vsync,
            vsync_source: VsyncSource::None,
        }
    }

    /// Whether a hardware composition module is present.
    ///
    /// On [`Error::Unavailable`] the compositor must do full GPU/software
    /// composition with its own refresh pacing; every other operation keeps
    /// returning the same status and never blocks.
    pub fn init_check(&self) -> Result<()> {
        match self.device {
            Some(_) => Ok(()),
            None => Err(Error::Unavailable),
        }
    }

    /// Record the display/surface handles the device targets on commit.
    /// No validation beyond non-null.
    pub fn set_frame_buffer(&mut self, display: DisplayHandle, surface: SurfaceHandle) -> Result<()> {
        self.init_check()?;
        if display.is_null() || surface.is_null() {
            return Err(Error::InvalidState("null frame buffer handle"));
        }
        self.display = Some(display);
        self.surface = Some(surface);
        Ok(())
    }

    /// (Re)allocate the work list with exactly `num_layers` slots.
    ///
    /// Raises the geometry-changed flag and invalidates any cached
    /// classification. Must be called whenever the layer count changes;
    /// calling with an unchanged count is permitted and still forces
    /// re-classification on the next prepare.
    pub fn create_work_list(&mut self, num_layers: usize) -> Result<()> {
        self.init_check()?;
        debug!(num_layers, "work list created");
        self.list = Some(WorkList::new(num_layers));
        self.list_state = ListState::Created;
        self.classification = None;
        Ok(())
    }

    /// Ask the device what it can do with the current list.
    ///
    /// On success every layer carries its composition type and the facade
    /// snapshots the per-type counts. The device status is propagated
    /// unchanged; a failed prepare leaves no classification behind, since
    /// the device may have partially overwritten the tags.
    pub fn prepare(&mut self) -> Result<()> {
        let device = self.device.as_deref_mut().ok_or(Error::Unavailable)?;
        let Some(list) = self.list.as_mut() else {
            return Err(Error::InvalidState("prepare without a work list"));
        };

        match device.prepare(list) {
            Ok(()) => {
                let mut overlay = 0;
                let mut framebuffer = 0;
                for layer in list.layers() {
                    match layer.composition_type {
                        CompositionType::Overlay => overlay += 1,
                        CompositionType::Framebuffer => framebuffer += 1,
                    }
                }
                self.classification = Some(Classification {
                    overlay,
                    framebuffer,
                });
                self.list_state = ListState::Prepared;
                trace!(overlay, framebuffer, "prepare classified work list");
                Ok(())
            }
            Err(err) => {
                warn!(code = err.code, "device rejected prepare");
                self.classification = None;
                self.list_state = ListState::Created;
                Err(err.into())
            }
        }
    }

    /// Finalize the frame using the most recent prepare's classification.
    ///
    /// Requires a successful prepare on the current list and a recorded
    /// frame buffer target; both are reported as [`Error::InvalidState`],
    /// double-commit included.
    pub fn commit(&mut self) -> Result<()> {
        let device = self.device.as_deref_mut().ok_or(Error::Unavailable)?;
        let Some(list) = self.list.as_mut() else {
            return Err(Error::InvalidState("commit without a work list"));
        };
        if self.list_state != ListState::Prepared {
            return Err(Error::InvalidState("commit without a successful prepare"));
        }
        let (Some(display), Some(surface)) = (self.display, self.surface) else {
            return Err(Error::InvalidState("commit without a frame buffer target"));
        };

        match device.commit(display, surface, list) {
            Ok(()) => {
                list.clear_geometry_changed();
                self.list_state = ListState::Committed;
                trace!("frame committed");
                Ok(())
            }
            Err(err) => {
                warn!(code = err.code, "device rejected commit");
                Err(err.into())
            }
        }
    }

    /// Release hardware resources, e.g. before pausing composition or on a
    /// hardware reset.
    ///
    /// The work list is dropped; [`create_work_list`](Self::create_work_list)
    /// is required before the next prepare. VSync delivery is unaffected.
    pub fn release(&mut self) -> Result<()> {
        let device = self.device.as_deref_mut().ok_or(Error::Unavailable)?;
        let status = device.release();
        self.list = None;
        self.classification = None;
        self.list_state = ListState::Created;
        debug!("hardware resources released");
        if let Err(err) = status {
            warn!(code = err.code, "device rejected release");
            return Err(err.into());
        }
        Ok(())
    }

    /// Deactivate hardware composition until the next
    /// [`create_work_list`](Self::create_work_list); the compositor
    /// composites every layer itself in the meantime. VSync delivery is
    /// unaffected.
    pub fn disable(&mut self) -> Result<()> {
        self.init_check()?;
        debug!("hardware composition disabled");
        self.list = None;
        self.classification = None;
        self.list_state = ListState::Created;
        Ok(())
    }

    /// Toggle delivery of `event`.
    ///
    /// For [`DeviceEvent::Vsync`] exactly one source is armed: the device's
    /// native event when it advertises support, the fallback timer
    /// otherwise. Disabling stops delivery from whichever source is active;
    /// the underlying clock keeps its phase.
    pub fn event_control(&mut self, event: DeviceEvent, enabled: bool) -> Result<()> {
        let device = self.device.as_deref_mut().ok_or(Error::Unavailable)?;
        match event {
            DeviceEvent::Vsync => {
                if self.native_vsync {
                    device.event_control(DeviceEvent::Vsync, enabled)?;
                } else if let Some(timer) = &self.vsync_timer {
                    timer.set_enabled(enabled);
                }
                self.vsync_source = match (enabled, self.native_vsync) {
                    (false, _) => VsyncSource::None,
                    (true, true) => VsyncSource::Native,
                    (true, false) => VsyncSource::Fallback,
                };
                debug!(?event, enabled, source = ?self.vsync_source, "event delivery toggled");
            }
        }
        Ok(())
    }

    /// Number of layers of `ty` as classified by the last successful
    /// prepare. Zero until a prepare completes.
    pub fn layer_count(&self, ty: CompositionType) -> usize {
        let Some(classification) = self.classification else {
            return 0;
        };
        match ty {
            CompositionType::Overlay => classification.overlay,
            CompositionType::Framebuffer => classification.framebuffer,
        }
    }

    /// Total capacity of the current work list.
    pub fn num_layers(&self) -> usize {
        self.list.as_ref().map_or(0, WorkList::len)
    }

    /// The layer array of the current work list, carrying the device's
    /// classification after a prepare.
    pub fn layers(&self) -> &[Layer] {
        self.list.as_ref().map_or(&[], WorkList::layers)
    }

    /// Mutable layer access for filling buffers and geometry before
    /// prepare. Classification tags written by the device are read-only by
    /// contract; overwriting them desynchronizes caller and device.
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        self.list.as_mut().map_or(&mut [], WorkList::layers_mut)
    }

    /// Whether the current work list demands full re-classification.
    pub fn geometry_changed(&self) -> bool {
        self.list.as_ref().is_some_and(WorkList::geometry_changed)
    }

    /// Refresh period, immutable for the facade lifetime.
    pub fn refresh_period(&self) -> Duration {
        Duration::from_nanos(self.refresh_period.get())
    }

    /// Which VSync source is currently armed.
    pub fn active_vsync_source(&self) -> VsyncSource {
        self.vsync_source
    }
}

impl Drop for HwComposer {
    fn drop(&mut self) {
        // Stop native delivery; the fallback timer joins its thread on drop.
        if self.vsync_source == VsyncSource::Native {
            if let Some(device) = self.device.as_deref_mut() {
                let _ = device.event_control(DeviceEvent::Vsync, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use crate::testing::{FakeDevice, RecordingHandler};

    fn composer_with_fake() -> (HwComposer, Arc<crate::testing::FakeDeviceState>) {
        let device = FakeDevice::new();
        let state = device.handle();
        let handler = RecordingHandler::new();
        let composer = HwComposer::new(
            Some(Box::new(device)),
            handler,
            Duration::from_nanos(16_666_666),
        );
        (composer, state)
    }

    #[test]
    fn test_unavailable_is_sticky() {
        let handler = RecordingHandler::new();
        let mut composer = HwComposer::new(None, handler, Duration::from_millis(16));

        assert_eq!(composer.init_check(), Err(Error::Unavailable));
        assert_eq!(composer.create_work_list(4), Err(Error::Unavailable));
        assert_eq!(composer.prepare(), Err(Error::Unavailable));
        assert_eq!(composer.commit(), Err(Error::Unavailable));
        assert_eq!(composer.release(), Err(Error::Unavailable));
        assert_eq!(composer.disable(), Err(Error::Unavailable));
        assert_eq!(
            composer.event_control(DeviceEvent::Vsync, true),
            Err(Error::Unavailable)
        );
        assert_eq!(composer.layer_count(CompositionType::Overlay), 0);
        assert!(composer.layers().is_empty());
        assert_eq!(composer.active_vsync_source(), VsyncSource::None);
    }

    #[test]
    fn test_prepare_requires_work_list() {
        let (mut composer, _state) = composer_with_fake();
        assert!(matches!(composer.prepare(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_commit_requires_prepare() {
        let (mut composer, _state) = composer_with_fake();
        composer.create_work_list(2).unwrap();
        assert!(matches!(composer.commit(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_double_commit_is_rejected() {
        let (mut composer, _state) = composer_with_fake();
        composer
            .set_frame_buffer(DisplayHandle(1), SurfaceHandle(2))
            .unwrap();
        composer.create_work_list(2).unwrap();
        composer.prepare().unwrap();
        composer.commit().unwrap();
        assert!(matches!(composer.commit(), Err(Error::InvalidState(_))));
        // Another prepare makes commit legal again.
        composer.prepare().unwrap();
        composer.commit().unwrap();
    }

    #[test]
    fn test_commit_requires_frame_buffer_target() {
        let (mut composer, _state) = composer_with_fake();
        composer.create_work_list(1).unwrap();
        composer.prepare().unwrap();
        assert!(matches!(composer.commit(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_null_frame_buffer_handles_rejected() {
        let (mut composer, _state) = composer_with_fake();
        assert!(matches!(
            composer.set_frame_buffer(DisplayHandle(0), SurfaceHandle(2)),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            composer.set_frame_buffer(DisplayHandle(1), SurfaceHandle(0)),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_classification_counts_sum_to_capacity() {
        let (mut composer, state) = composer_with_fake();
        state.set_overlay_budget(2);
        composer.create_work_list(5).unwrap();
        composer.prepare().unwrap();

        assert_eq!(composer.layer_count(CompositionType::Overlay), 2);
        assert_eq!(composer.layer_count(CompositionType::Framebuffer), 3);
        assert_eq!(
            composer.layer_count(CompositionType::Overlay)
                + composer.layer_count(CompositionType::Framebuffer),
            composer.num_layers()
        );
    }

    #[test]
    fn test_recreate_forces_reclassification() {
        let (mut composer, state) = composer_with_fake();
        state.set_overlay_budget(1);
        composer
            .set_frame_buffer(DisplayHandle(1), SurfaceHandle(2))
            .unwrap();
        composer.create_work_list(3).unwrap();
        composer.prepare().unwrap();
        composer.commit().unwrap();
        assert!(!composer.geometry_changed());

        // Same count is permitted and raises the flag again.
        composer.create_work_list(3).unwrap();
        assert!(composer.geometry_changed());
        assert_eq!(composer.layer_count(CompositionType::Overlay), 0);
    }

    #[test]
    fn test_disable_invalidates_classification() {
        let (mut composer, state) = composer_with_fake();
        state.set_overlay_budget(3);
        composer.create_work_list(3).unwrap();
        composer.prepare().unwrap();
        assert_eq!(composer.layer_count(CompositionType::Overlay), 3);

        composer.disable().unwrap();
        assert_eq!(composer.layer_count(CompositionType::Overlay), 0);
        assert_eq!(composer.num_layers(), 0);
        assert!(matches!(composer.prepare(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_failed_prepare_clears_snapshot() {
        let (mut composer, state) = composer_with_fake();
        state.set_overlay_budget(2);
        composer.create_work_list(2).unwrap();
        composer.prepare().unwrap();
        assert_eq!(composer.layer_count(CompositionType::Overlay), 2);

        state.fail_next_call(DeviceError::new(-22));
        assert_eq!(
            composer.prepare(),
            Err(Error::Device(DeviceError::new(-22)))
        );
        assert_eq!(composer.layer_count(CompositionType::Overlay), 0);
        assert!(matches!(composer.commit(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_skip_layers_stay_on_framebuffer_path() {
        let (mut composer, state) = composer_with_fake();
        state.set_overlay_budget(4);
        composer.create_work_list(3).unwrap();
        composer.layers_mut()[1].flags = crate::layer::LayerFlags::SKIP;
        composer.prepare().unwrap();

        assert_eq!(composer.layer_count(CompositionType::Overlay), 2);
        assert_eq!(
            composer.layers()[1].composition_type,
            CompositionType::Framebuffer
        );
    }
}
