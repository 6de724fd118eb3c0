//! Coordinate and geometry types shared across the engine and vector layers.
//!
//! Canonical CPU spaces:
//! - Map units (`Coord`, `Extent`): f64, +X right, +Y up
//! - Pixels (`Viewport`, scissor rects): origin top-left, +Y down
//!
//! Renderers convert map units to clip space through a `Transform2D` uploaded as
//! a 4x4 uniform.

mod coord;
mod extent;
mod transform;
mod viewport;

pub use coord::Coord;
pub use extent::Extent;
pub use transform::Transform2D;
pub use viewport::Viewport;
