//! Tile addressing, tile state, and tile sources.

mod coord;
mod grid;
mod source;
mod tile;

pub use coord::{TileCoord, TileRange};
pub use grid::TileGrid;
pub use source::{MemoryTileSource, TileSource};
pub use tile::{ReplayState, Tile, TileState};
