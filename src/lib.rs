//! hwc-core - hardware composition abstraction
//!
//! Mediates between a display compositor and a vendor-supplied hardware
//! composition device: delivers periodic VSync pulses to the render loop
//! (forwarded from hardware, or synthesized by a software fallback timer
//! when the hardware cannot emit them) and drives the per-frame two-phase
//! prepare/commit protocol that splits layers between hardware overlays and
//! the GPU/software framebuffer path.
pub mod composer;
pub mod device;
pub mod error;
pub mod event;
pub mod layer;
pub mod testing;
pub mod vsync;
mod time;

pub use composer::{HwComposer, VsyncSource};
pub use device::{
    ComposerDevice, DeviceCallbacks, DeviceEvent, DeviceResult, DisplayHandle, SurfaceHandle,
};
pub use error::{DeviceError, Error};
pub use event::EventHandler;
pub use layer::{BufferHandle, CompositionType, Layer, LayerFlags, Rect, WorkList};
