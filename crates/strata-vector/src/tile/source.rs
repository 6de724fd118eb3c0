//! Tile sources: where the renderer gets tiles from.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{Tile, TileCoord, TileGrid, TileState};
use crate::feature::Feature;

/// Tile cache and loader as seen by the layer renderer.
///
/// Loading happens outside the frame loop; the renderer only observes tile
/// state each frame.
pub trait TileSource {
    fn tile_grid(&self) -> &TileGrid;

    /// Returns the tile at `coord`, creating it `Idle` on first reference.
    fn get_tile(&mut self, coord: TileCoord, pixel_ratio: f32) -> &mut Tile;

    /// Looks up a tile without creating it.
    fn cached_tile(&self, coord: TileCoord) -> Option<&Tile>;

    fn cached_tile_mut(&mut self, coord: TileCoord) -> Option<&mut Tile>;

    /// Tiles evicted since the last call; their GPU resources still need release.
    fn drain_evicted(&mut self) -> Vec<Tile>;
}

/// In-memory tile source whose loads are completed by the caller.
#[derive(Debug)]
pub struct MemoryTileSource {
    grid: TileGrid,
    tiles: HashMap<TileCoord, Tile>,
    evicted: Vec<Tile>,
    clock: u64,
}

impl MemoryTileSource {
    pub fn new(grid: TileGrid) -> Self {
        Self {
            grid,
            tiles: HashMap::new(),
            evicted: Vec::new(),
            clock: 0,
        }
    }

    fn tile_entry(&mut self, coord: TileCoord) -> &mut Tile {
        self.clock += 1;
        let clock = self.clock;
        let tile = self.tiles.entry(coord).or_insert_with(|| Tile::new(coord));
        tile.last_used = clock;
        tile
    }

    /// Completes a load with `features`.
    pub fn set_loaded(&mut self, coord: TileCoord, features: Vec<Arc<Feature>>) {
        self.tile_entry(coord).set_loaded(features);
    }

    pub fn set_state(&mut self, coord: TileCoord, state: TileState) {
        self.tile_entry(coord).set_state(state);
    }

    /// Invalidates the cached batch of one tile. Returns whether it exists.
    pub fn mark_dirty(&mut self, coord: TileCoord) -> bool {
        match self.tiles.get_mut(&coord) {
            Some(tile) => {
                tile.mark_dirty();
                true
            }
            None => false,
        }
    }

    /// Evicts least recently used tiles not in `keep` until at most `max`
    /// remain. Returns how many were evicted.
    pub fn expire_cache(&mut self, max: usize, keep: &HashSet<TileCoord>) -> usize {
        let excess = self.tiles.len().saturating_sub(max);
        if excess == 0 {
            return 0;
        }

        let mut candidates: Vec<(u64, TileCoord)> = self
            .tiles
            .values()
            .filter(|t| !keep.contains(&t.coord()))
            .map(|t| (t.last_used, t.coord()))
            .collect();
        candidates.sort_unstable();

        let mut evicted = 0;
        for (_, coord) in candidates.into_iter().take(excess) {
            if let Some(tile) = self.tiles.remove(&coord) {
                self.evicted.push(tile);
                evicted += 1;
            }
        }
        if evicted > 0 {
            log::debug!("evicted {evicted} tiles, {} cached", self.tiles.len());
        }
        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl TileSource for MemoryTileSource {
    fn tile_grid(&self) -> &TileGrid {
        &self.grid
    }

    fn get_tile(&mut self, coord: TileCoord, _pixel_ratio: f32) -> &mut Tile {
        self.tile_entry(coord)
    }

    fn cached_tile(&self, coord: TileCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }

    fn cached_tile_mut(&mut self, coord: TileCoord) -> Option<&mut Tile> {
        self.tiles.get_mut(&coord)
    }

    fn drain_evicted(&mut self) -> Vec<Tile> {
        std::mem::take(&mut self.evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_engine::coords::Extent;

    fn source() -> MemoryTileSource {
        MemoryTileSource::new(TileGrid::xyz(Extent::new(0.0, 0.0, 1024.0, 1024.0), 3, 256).unwrap())
    }

    #[test]
    fn get_tile_creates_idle_once() {
        let mut source = source();
        let coord = TileCoord::new(1, 0, 1);
        assert!(source.cached_tile(coord).is_none());
        assert_eq!(source.get_tile(coord, 1.0).state(), TileState::Idle);
        source.get_tile(coord, 1.0).set_state(TileState::Loading);
        assert_eq!(source.get_tile(coord, 1.0).state(), TileState::Loading);
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn expire_evicts_least_recent_outside_keep() {
        let mut source = source();
        let (a, b, c) = (TileCoord::new(2, 0, 0), TileCoord::new(2, 1, 0), TileCoord::new(2, 2, 0));
        source.set_loaded(a, Vec::new());
        source.set_loaded(b, Vec::new());
        source.set_loaded(c, Vec::new());
        source.get_tile(a, 1.0);

        let keep = HashSet::from([b]);
        assert_eq!(source.expire_cache(1, &keep), 2);
        assert!(source.cached_tile(b).is_some());

        let evicted: Vec<TileCoord> = source.drain_evicted().iter().map(Tile::coord).collect();
        assert_eq!(evicted, vec![c, a]);
        assert!(source.drain_evicted().is_empty());
    }

    #[test]
    fn mark_dirty_reports_missing_tiles() {
        let mut source = source();
        assert!(!source.mark_dirty(TileCoord::new(0, 0, 0)));
        source.set_state(TileCoord::new(0, 0, 0), TileState::Empty);
        assert!(source.mark_dirty(TileCoord::new(0, 0, 0)));
    }
}
