//! Per-frame view state handed to the layer renderer.

use std::collections::HashSet;

use strata_engine::coords::{Coord, Extent, Transform2D};

use crate::feature::FeatureId;
use crate::tile::TileCoord;

/// Map coordinates to clip space for a view of `size` CSS pixels.
///
/// The view is rotated counter-clockwise by `rotation`, so map content turns
/// the other way on screen.
pub fn view_transform(center: Coord, resolution: f64, rotation: f64, size: [f64; 2]) -> Transform2D {
    Transform2D::translate(-center.x, -center.y)
        .then(Transform2D::rotate(-rotation))
        .then(Transform2D::scale(2.0 / (size[0] * resolution), 2.0 / (size[1] * resolution)))
}

/// View parameters for one frame plus the tile bookkeeping the renderer fills in.
#[derive(Debug, Clone)]
pub struct FrameState {
    /// Monotonic frame counter; also the release epoch.
    pub index: u64,
    pub center: Coord,
    /// Map units per CSS pixel.
    pub resolution: f64,
    /// Radians, counter-clockwise.
    pub rotation: f64,
    pub pixel_ratio: f32,
    /// Viewport size in CSS pixels.
    pub size: [u32; 2],
    /// Axis-aligned map extent covering the rotated viewport.
    pub extent: Extent,
    pub skipped_features: HashSet<FeatureId>,
    /// Tiles the renderer asked for but which were still idle; the load queue.
    pub wanted_tiles: Vec<TileCoord>,
    /// Every tile selected for drawing this frame.
    pub used_tiles: Vec<TileCoord>,
}

impl FrameState {
    pub fn new(index: u64, center: Coord, resolution: f64, rotation: f64, pixel_ratio: f32, size: [u32; 2]) -> Self {
        Self {
            index,
            center,
            resolution,
            rotation,
            pixel_ratio,
            size,
            extent: rotated_extent(center, resolution, rotation, size),
            skipped_features: HashSet::new(),
            wanted_tiles: Vec::new(),
            used_tiles: Vec::new(),
        }
    }

    pub fn with_skipped(mut self, ids: impl IntoIterator<Item = FeatureId>) -> Self {
        self.skipped_features.extend(ids);
        self
    }

    /// Map coordinates to clip space for this frame.
    pub fn frame_transform(&self) -> Transform2D {
        view_transform(self.center, self.resolution, self.rotation, self.size_f64())
    }

    /// Target size in physical pixels.
    pub fn viewport_px(&self) -> [f32; 2] {
        [
            self.size[0] as f32 * self.pixel_ratio,
            self.size[1] as f32 * self.pixel_ratio,
        ]
    }

    pub fn size_f64(&self) -> [f64; 2] {
        [self.size[0] as f64, self.size[1] as f64]
    }

    #[inline]
    pub fn is_rotated(&self) -> bool {
        self.rotation.rem_euclid(std::f64::consts::TAU) != 0.0
    }
}

fn rotated_extent(center: Coord, resolution: f64, rotation: f64, size: [u32; 2]) -> Extent {
    let half_w = size[0] as f64 * resolution / 2.0;
    let half_h = size[1] as f64 * resolution / 2.0;
    let (sin, cos) = rotation.sin_cos();
    let corners = [(-half_w, -half_h), (half_w, -half_h), (half_w, half_h), (-half_w, half_h)]
        .map(|(x, y)| Coord::new(center.x + x * cos - y * sin, center.y + x * sin + y * cos));
    Extent::from_coords(&corners)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrotated_extent_matches_size() {
        let frame = FrameState::new(0, Coord::new(100.0, 50.0), 2.0, 0.0, 1.0, [200, 100]);
        assert_eq!(frame.extent, Extent::new(-100.0, -50.0, 300.0, 150.0));
        assert!(!frame.is_rotated());
    }

    #[test]
    fn rotated_extent_grows() {
        let frame = FrameState::new(0, Coord::zero(), 1.0, std::f64::consts::FRAC_PI_4, 1.0, [100, 100]);
        let half = 50.0 * std::f64::consts::SQRT_2;
        assert!((frame.extent.max_x - half).abs() < 1e-9);
        assert!((frame.extent.min_y + half).abs() < 1e-9);
    }

    #[test]
    fn frame_transform_maps_extent_to_clip_corners() {
        let frame = FrameState::new(0, Coord::new(10.0, 10.0), 0.5, 0.0, 2.0, [40, 20]);
        let t = frame.frame_transform();
        let close = |a: Coord, b: Coord| (a.x - b.x).abs() < 1e-12 && (a.y - b.y).abs() < 1e-12;
        assert!(close(t.apply(Coord::new(10.0, 10.0)), Coord::zero()));
        assert!(close(t.apply(Coord::new(20.0, 15.0)), Coord::new(1.0, 1.0)));
        assert!(close(t.apply(Coord::new(0.0, 5.0)), Coord::new(-1.0, -1.0)));
        assert_eq!(frame.viewport_px(), [80.0, 40.0]);
    }
}
