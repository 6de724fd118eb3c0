use strata_engine::render::{GpuError, IndexWidth};
use thiserror::Error;

/// Failures while compiling or uploading a batch.
///
/// All of these are scoped to one tile's replay group.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// The batch addresses more vertices than the available index width can.
    #[error("batch index {max_index} exceeds {width:?} index range")]
    IndexRangeExceeded { max_index: u32, width: IndexWidth },

    /// `finish` was called on a batch that was already uploaded.
    #[error("batch was already finished")]
    AlreadyFinished,

    /// `add` was called after the batch was uploaded.
    #[error("cannot append to a finished batch")]
    AppendAfterFinish,

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Ring sets the ear clipper cannot turn into triangles.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriangulationError {
    /// Fewer than three distinct points.
    #[error("ring has {points} distinct points; at least 3 are required")]
    DegenerateRing { points: usize },

    /// No ear could be clipped; typically a self-intersecting ring.
    #[error("no ear found with {remaining} vertices left")]
    NoEar { remaining: usize },
}

/// Rejected tile grid definitions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("tile grid needs at least one resolution")]
    NoResolutions,

    /// Resolutions must be finite, positive, and strictly decreasing with zoom.
    #[error("resolution {resolution} at zoom {z} is not below the previous level")]
    ResolutionOrder { z: u32, resolution: f64 },

    #[error("tile size must be non-zero")]
    ZeroTileSize,

    #[error("grid extent has no area")]
    EmptyExtent,
}
