use thiserror::Error;

/// Failures reported by a [`super::RenderBackend`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    /// Requested buffer exceeds the device's buffer size limit.
    #[error("buffer of {size} bytes exceeds device limit of {max} bytes")]
    BufferTooLarge { size: u64, max: u64 },

    /// The device does not support 32-bit index buffers.
    #[error("wide (32-bit) index buffers are not supported by this backend")]
    WideIndicesUnsupported,

    /// `read_pixel` or a hit-only operation without a bound hit target.
    #[error("hit target is not bound")]
    HitTargetNotBound,

    /// Mapping or copying the readback buffer failed.
    #[error("hit target readback failed: {0}")]
    Readback(String),
}
