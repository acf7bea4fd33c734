//! Error types for the composition facade.

use thiserror::Error;

/// Raw status reported by the vendor device.
///
/// The encoding belongs to the device contract; it is carried through to the
/// caller unchanged and never reinterpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("device returned status {code}")]
pub struct DeviceError {
    /// Vendor-defined status code.
    pub code: i32,
}

impl DeviceError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Errors surfaced by [`HwComposer`](crate::composer::HwComposer) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// No hardware composition module is present. Every protocol operation
    /// degrades to a safe no-op returning this status; the compositor falls
    /// back to full GPU/software composition with its own refresh pacing.
    #[error("hardware composition unavailable")]
    Unavailable,

    /// The device rejected a call. No retries are made; whether to fall back
    /// to software composition for the frame is the caller's decision.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A protocol precondition was violated, e.g. commit without a prior
    /// successful prepare on the current work list.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
