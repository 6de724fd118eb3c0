//! Strata vector crate.
//!
//! Compiles vector tile features into GPU batches and drives them per frame:
//! - replays: per-kind vertex/index batches with per-feature element ranges
//! - replay groups: one tile's replays, bulk drawing and pixel-readback hit detection
//! - tile layer renderer: tile selection with fallbacks, cache reuse, deferred release

pub mod batch;
pub mod config;
pub mod error;
pub mod feature;
pub mod frame;
pub mod geometry;
pub mod layer;
pub mod renderer;
pub mod replay;
pub mod tile;
pub mod triangulate;

pub use batch::{BatchBuffers, VertexBatch};
pub use config::{LayerOptions, ReplayConfig};
pub use error::{GridError, ReplayError, TriangulationError};
pub use feature::{Feature, FeatureId, Fill, RenderOrder, Stroke, Style, StyleFunction, StyleSource};
pub use frame::FrameState;
pub use geometry::{Geometry, GeometryKind, Rings};
pub use layer::LayerProperties;
pub use renderer::{RenderStats, TileLayerRenderer};
pub use replay::{FeatureRange, HitQuery, Replay, ReplayGroup, ReplayKind, ReplayParams};
pub use tile::{MemoryTileSource, ReplayState, Tile, TileCoord, TileGrid, TileRange, TileSource, TileState};
pub use triangulate::triangulate;
