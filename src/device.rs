//! Device contract for the vendor composition hardware.
//!
//! The facade is device-agnostic: everything hardware-specific sits behind
//! [`ComposerDevice`], so the same protocol logic runs against a real vendor
//! module or against [`crate::testing::FakeDevice`] in tests.
//!
//! # Design Invariants
//!
//! 1. **Status passthrough**: every protocol call returns the device's raw
//!    status unchanged. The facade never retries and never reinterprets.
//!
//! 2. **Typed callbacks**: push notifications cross the boundary through
//!    [`DeviceCallbacks`], a capability object registered once at facade
//!    construction, instead of raw function pointers with a context blob.

use std::sync::Arc;

use crate::error::DeviceError;
use crate::layer::WorkList;

/// Opaque display handle the device targets on commit. Owned by the caller;
/// the facade only checks it is non-null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayHandle(pub u64);

impl DisplayHandle {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Opaque render surface handle, recorded alongside the display handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle(pub u64);

impl SurfaceHandle {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Events whose delivery can be toggled through
/// [`HwComposer::event_control`](crate::composer::HwComposer::event_control).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Vertical-sync pulse at the start of each display refresh interval.
    Vsync,
}

/// Push notifications issued by the device from its own thread context.
///
/// Implementations must be non-blocking and must not re-enter the facade;
/// they run concurrently with the caller's protocol thread.
pub trait DeviceCallbacks: Send + Sync {
    /// The device changed composition state asynchronously; the next frame
    /// must redo full prepare/commit.
    fn invalidate(&self);

    /// A hardware VSync pulse for `display` at `timestamp_ns` on the
    /// monotonic clock. Only delivered while VSYNC is enabled through
    /// `event_control`.
    fn vsync(&self, display: usize, timestamp_ns: u64);
}

pub type DeviceResult = std::result::Result<(), DeviceError>;

/// Vendor hardware composition device.
///
/// The two-phase frame protocol is prepare (the device classifies each work
/// list entry as overlay or framebuffer) followed by commit (the device
/// composites its overlays and displays the frame). Both take the same list;
/// the device may rewrite per-layer classification and hint bits in place
/// during prepare.
pub trait ComposerDevice: Send {
    /// Ask the device what it can do with the list. The device overwrites
    /// each entry's [`composition_type`](crate::layer::Layer) and hint bits.
    fn prepare(&mut self, list: &mut WorkList) -> DeviceResult;

    /// Finalize the frame using the classification from the last prepare,
    /// targeting the recorded display/surface handles.
    fn commit(
        &mut self,
        display: DisplayHandle,
        surface: SurfaceHandle,
        list: &mut WorkList,
    ) -> DeviceResult;

    /// Release hardware resources, e.g. before pausing composition or on a
    /// hardware reset.
    fn release(&mut self) -> DeviceResult;

    /// Toggle delivery of a device-generated event.
    fn event_control(&mut self, event: DeviceEvent, enabled: bool) -> DeviceResult;

    /// Register the push-notification sink. Called exactly once, during
    /// facade construction, before any other call.
    fn register_callbacks(&mut self, callbacks: Arc<dyn DeviceCallbacks>);

    /// Whether the device can generate VSYNC itself. When false, the facade
    /// synthesizes VSync with its fallback timer instead of asking the
    /// device.
    fn supports_native_vsync(&self) -> bool;
}
