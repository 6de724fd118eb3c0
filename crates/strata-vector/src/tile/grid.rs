//! Tile grid: which tile covers which map area at which resolution.
//!
//! The origin is the top-left corner of the grid extent; columns grow to the
//! right and rows grow downwards. Resolutions are listed from the coarsest
//! (zoom 0) to the finest.

use strata_engine::coords::{Coord, Extent};

use super::{TileCoord, TileRange};
use crate::error::GridError;

/// Fractional tile positions this close to an integer snap onto it.
const SNAP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    origin: Coord,
    resolutions: Vec<f64>,
    tile_size: [u32; 2],
    extent: Extent,
}

impl TileGrid {
    pub fn new(extent: Extent, resolutions: Vec<f64>, tile_size: [u32; 2]) -> Result<Self, GridError> {
        if resolutions.is_empty() {
            return Err(GridError::NoResolutions);
        }
        for (z, &resolution) in resolutions.iter().enumerate() {
            let valid = resolution.is_finite() && resolution > 0.0;
            if !valid || (z > 0 && resolution >= resolutions[z - 1]) {
                return Err(GridError::ResolutionOrder { z: z as u32, resolution });
            }
        }
        if tile_size[0] == 0 || tile_size[1] == 0 {
            return Err(GridError::ZeroTileSize);
        }
        if !extent.has_area() {
            return Err(GridError::EmptyExtent);
        }
        Ok(Self {
            origin: extent.top_left(),
            resolutions,
            tile_size,
            extent,
        })
    }

    /// Square power-of-two pyramid over `extent`: zoom 0 is one tile.
    pub fn xyz(extent: Extent, max_zoom: u32, tile_size: u32) -> Result<Self, GridError> {
        if tile_size == 0 {
            return Err(GridError::ZeroTileSize);
        }
        let base = extent.width().max(extent.height()) / tile_size as f64;
        let resolutions = (0..=max_zoom).map(|z| base / f64::from(1u32 << z.min(31))).collect();
        Self::new(extent, resolutions, [tile_size, tile_size])
    }

    #[inline]
    pub fn origin(&self) -> Coord {
        self.origin
    }

    #[inline]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    #[inline]
    pub fn tile_size(&self) -> [u32; 2] {
        self.tile_size
    }

    #[inline]
    pub fn min_zoom(&self) -> u32 {
        0
    }

    #[inline]
    pub fn max_zoom(&self) -> u32 {
        self.resolutions.len() as u32 - 1
    }

    #[inline]
    pub fn resolutions(&self) -> &[f64] {
        &self.resolutions
    }

    pub fn resolution(&self, z: u32) -> Option<f64> {
        self.resolutions.get(z as usize).copied()
    }

    /// The finest zoom whose resolution is still at least `resolution`;
    /// zoom 0 when even that one is finer.
    pub fn z_for_resolution(&self, resolution: f64) -> u32 {
        let threshold = resolution * (1.0 - SNAP_EPSILON);
        // Resolutions decrease with zoom, so the matching levels form a prefix.
        let matching = self.resolutions.partition_point(|&r| r >= threshold);
        matching.saturating_sub(1) as u32
    }

    /// Map extent of one tile.
    pub fn tile_coord_extent(&self, coord: TileCoord) -> Extent {
        let resolution = self.resolution(coord.z).unwrap_or(f64::NAN);
        let w = self.tile_size[0] as f64 * resolution;
        let h = self.tile_size[1] as f64 * resolution;
        let min_x = self.origin.x + coord.x as f64 * w;
        let max_y = self.origin.y - coord.y as f64 * h;
        Extent::new(min_x, max_y - h, min_x + w, max_y)
    }

    /// The tile containing `coord` at zoom `z`. A point on a tile edge belongs
    /// to the tile right of / below it.
    pub fn tile_coord_for_coord_and_z(&self, coord: Coord, z: u32) -> Option<TileCoord> {
        let (fx, fy) = self.fractional(coord, z)?;
        Some(TileCoord::new(z, snap(fx).floor() as i32, snap(fy).floor() as i32))
    }

    /// Tiles at `z` intersecting `extent`, clipped to the grid. `None` when
    /// nothing of the grid is covered.
    pub fn tile_range_for_extent_and_z(&self, extent: Extent, z: u32) -> Option<TileRange> {
        let clipped = extent.intersection(self.extent);
        if clipped.is_empty() {
            return None;
        }
        let (min_fx, min_fy) = self.fractional(Coord::new(clipped.min_x, clipped.max_y), z)?;
        let (max_fx, max_fy) = self.fractional(Coord::new(clipped.max_x, clipped.min_y), z)?;

        // Upper edges are exclusive: an extent ending on a tile boundary does not
        // reach into the next tile.
        let min_x = snap(min_fx).floor() as i32;
        let min_y = snap(min_fy).floor() as i32;
        let max_x = (snap(max_fx).ceil() as i32 - 1).max(min_x);
        let max_y = (snap(max_fy).ceil() as i32 - 1).max(min_y);

        TileRange::new(min_x, max_x, min_y, max_y).intersection(&self.full_tile_range(z)?)
    }

    /// Every tile of zoom `z` inside the grid extent.
    pub fn full_tile_range(&self, z: u32) -> Option<TileRange> {
        let resolution = self.resolution(z)?;
        let cols = (snap(self.extent.width() / (self.tile_size[0] as f64 * resolution)).ceil() as i32).max(1);
        let rows = (snap(self.extent.height() / (self.tile_size[1] as f64 * resolution)).ceil() as i32).max(1);
        Some(TileRange::new(0, cols - 1, 0, rows - 1))
    }

    /// Calls `f` with the range covering `coord`'s footprint at every coarser
    /// zoom, nearest first, until `f` returns `true`. Returns whether it did.
    pub fn for_each_tile_coord_parent_tile_range(
        &self,
        coord: TileCoord,
        mut f: impl FnMut(u32, TileRange) -> bool,
    ) -> bool {
        let footprint = self.tile_coord_extent(coord);
        for z in (self.min_zoom()..coord.z).rev() {
            let Some(range) = self.tile_range_for_extent_and_z(footprint, z) else { continue };
            if f(z, range) {
                return true;
            }
        }
        false
    }

    /// Tiles at `coord.z + 1` covering `coord`'s footprint.
    pub fn tile_coord_child_tile_range(&self, coord: TileCoord) -> Option<TileRange> {
        if coord.z >= self.max_zoom() {
            return None;
        }
        self.tile_range_for_extent_and_z(self.tile_coord_extent(coord), coord.z + 1)
    }

    fn fractional(&self, coord: Coord, z: u32) -> Option<(f64, f64)> {
        let resolution = self.resolution(z)?;
        let fx = (coord.x - self.origin.x) / (self.tile_size[0] as f64 * resolution);
        let fy = (self.origin.y - coord.y) / (self.tile_size[1] as f64 * resolution);
        Some((fx, fy))
    }
}

#[inline]
fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPSILON { r } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> TileGrid {
        TileGrid::xyz(Extent::new(0.0, 0.0, 1024.0, 1024.0), 3, 256).unwrap()
    }

    #[test]
    fn xyz_resolutions_halve() {
        assert_eq!(grid().resolutions(), &[4.0, 2.0, 1.0, 0.5]);
        assert_eq!(grid().origin(), Coord::new(0.0, 1024.0));
    }

    #[test]
    fn invalid_grids_are_rejected() {
        let e = Extent::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(TileGrid::new(e, vec![], [1, 1]), Err(GridError::NoResolutions));
        assert_eq!(
            TileGrid::new(e, vec![2.0, 2.0], [1, 1]),
            Err(GridError::ResolutionOrder { z: 1, resolution: 2.0 })
        );
        assert_eq!(TileGrid::new(Extent::empty(), vec![1.0], [1, 1]), Err(GridError::EmptyExtent));
    }

    // ── zoom selection ────────────────────────────────────────────────────

    #[test]
    fn z_for_resolution_picks_finest_not_finer_than_view() {
        let g = grid();
        assert_eq!(g.z_for_resolution(1.0), 2);
        assert_eq!(g.z_for_resolution(0.9), 2);
        assert_eq!(g.z_for_resolution(1.1), 1);
        assert_eq!(g.z_for_resolution(0.1), 3);
        assert_eq!(g.z_for_resolution(100.0), 0);
    }

    // ── ranges ────────────────────────────────────────────────────────────

    #[test]
    fn tile_extent_is_top_left_origin() {
        let g = grid();
        assert_eq!(g.tile_coord_extent(TileCoord::new(2, 0, 0)), Extent::new(0.0, 768.0, 256.0, 1024.0));
        assert_eq!(g.tile_coord_extent(TileCoord::new(1, 1, 1)), Extent::new(512.0, 0.0, 1024.0, 512.0));
    }

    #[test]
    fn range_upper_edges_are_exclusive() {
        let g = grid();
        let range = g.tile_range_for_extent_and_z(Extent::new(256.0, 256.0, 768.0, 768.0), 2).unwrap();
        assert_eq!(range, TileRange::new(1, 2, 1, 2));
    }

    #[test]
    fn range_is_clipped_to_grid() {
        let g = grid();
        let range = g.tile_range_for_extent_and_z(Extent::new(-500.0, -500.0, 100.0, 100.0), 2).unwrap();
        assert_eq!(range, TileRange::new(0, 0, 3, 3));
        assert!(g.tile_range_for_extent_and_z(Extent::new(2000.0, 0.0, 3000.0, 10.0), 2).is_none());
    }

    #[test]
    fn coord_lookup_round_trips_through_extent() {
        let g = grid();
        let coord = g.tile_coord_for_coord_and_z(Coord::new(300.0, 1000.0), 2).unwrap();
        assert_eq!(coord, TileCoord::new(2, 1, 0));
        assert!(g.tile_coord_extent(coord).contains_coord(Coord::new(300.0, 1000.0)));
    }

    #[test]
    fn parent_ranges_walk_to_zoom_zero() {
        let g = grid();
        let mut seen = Vec::new();
        let found = g.for_each_tile_coord_parent_tile_range(TileCoord::new(3, 5, 6), |z, range| {
            seen.push((z, range));
            false
        });
        assert!(!found);
        assert_eq!(
            seen,
            vec![
                (2, TileRange::new(2, 2, 3, 3)),
                (1, TileRange::new(1, 1, 1, 1)),
                (0, TileRange::new(0, 0, 0, 0)),
            ]
        );
    }

    #[test]
    fn child_range_is_two_by_two() {
        let g = grid();
        assert_eq!(g.tile_coord_child_tile_range(TileCoord::new(1, 1, 0)), Some(TileRange::new(2, 3, 0, 1)));
        assert_eq!(g.tile_coord_child_tile_range(TileCoord::new(3, 0, 0)), None);
    }
}
