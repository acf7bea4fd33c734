//! Work list and layer model.
//!
//! A [`WorkList`] is the per-frame ordered set of layers submitted to the
//! device for classification. The device decides, layer by layer, whether it
//! composites the layer itself (overlay) or leaves it to the GPU/software
//! path (framebuffer); the caller reads the result back after prepare.

use bitflags::bitflags;

/// How a layer gets composited, as decided by the device during prepare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositionType {
    /// Composited directly by dedicated display hardware, bypassing the GPU.
    Overlay,
    /// Composited by the GPU/software path into the shared framebuffer.
    ///
    /// The default for a freshly created list: until the device says
    /// otherwise, every layer is the caller's to draw.
    #[default]
    Framebuffer,
}

bitflags! {
    /// Per-layer compositing flags set by the caller.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LayerFlags: u32 {
        /// The device must not composite this layer; the caller always
        /// renders it through the framebuffer path.
        const SKIP = 1 << 0;
    }
}

/// Opaque buffer handle owned by the caller. The facade passes it through
/// to the device untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle(pub u64);

/// Integer rectangle in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// One entry of the work list.
///
/// The caller fills buffer and geometry before prepare; the device writes
/// `composition_type` and `hints` during prepare. After a completed prepare
/// the classification is read-only to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Layer {
    /// Classification written by the device during prepare.
    pub composition_type: CompositionType,
    /// Device-defined hint bits, written during prepare. Opaque here, like
    /// the status codes.
    pub hints: u32,
    /// Caller-set compositing flags.
    pub flags: LayerFlags,
    /// Buffer to composite, owned by the caller.
    pub buffer: Option<BufferHandle>,
    /// Portion of the buffer to read.
    pub source_crop: Rect,
    /// Where the layer lands on the display.
    pub display_frame: Rect,
}

/// The per-frame ordered set of layers submitted for classification.
///
/// Capacity is fixed at creation; recreating the list is the only way to
/// change it. Every (re)creation raises the geometry-changed flag so the
/// device fully re-evaluates classification instead of reusing cached
/// results.
#[derive(Debug)]
pub struct WorkList {
    layers: Vec<Layer>,
    geometry_changed: bool,
}

impl WorkList {
    pub(crate) fn new(num_layers: usize) -> Self {
        Self {
            layers: vec![Layer::default(); num_layers],
            geometry_changed: true,
        }
    }

    /// Fixed capacity chosen at creation.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Whether the device must fully re-evaluate classification on the next
    /// prepare instead of reusing cached results.
    pub fn geometry_changed(&self) -> bool {
        self.geometry_changed
    }

    /// Cleared once a commit has consumed the re-evaluated classification.
    pub(crate) fn clear_geometry_changed(&mut self) {
        self.geometry_changed = false;
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }
}
