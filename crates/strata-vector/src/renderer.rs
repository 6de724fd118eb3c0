//! Tile layer renderer: the per-frame driver.
//!
//! `prepare_frame` picks the tiles to draw (substituting ancestors or children
//! for tiles that are not ready), rebuilds stale batches, and orders the result
//! coarse to fine. `compose_frame` then only issues draws for what `prepare`
//! finalized. GPU resources of replaced or evicted batches are released one
//! frame later through the release queue.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use strata_engine::coords::{Coord, Extent};
use strata_engine::render::{BlendMode, GpuError, ReleaseQueue, RenderBackend, ScissorRect};

use crate::config::LayerOptions;
use crate::error::ReplayError;
use crate::feature::{Feature, FeatureId};
use crate::frame::FrameState;
use crate::layer::LayerProperties;
use crate::replay::{HitQuery, ReplayGroup, ReplayParams};
use crate::tile::{Tile, TileCoord, TileRange, TileSource, TileState};

/// Counters for the most recent `prepare_frame` / `compose_frame`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Replay groups rebuilt during prepare.
    pub groups_built: usize,
    /// Features that produced at least one style in rebuilt groups.
    pub features_batched: usize,
    /// Ring sets triangulated during prepare.
    pub triangulations: usize,
    /// Tiles whose group was replayed during compose.
    pub tiles_drawn: usize,
}

pub struct TileLayerRenderer {
    options: LayerOptions,
    release_queue: ReleaseQueue,

    /// Tiles selected by the last prepare, coarse to fine.
    rendered: Vec<TileCoord>,
    stats: RenderStats,
    last_errors: Vec<(TileCoord, ReplayError)>,
}

impl TileLayerRenderer {
    pub fn new(options: LayerOptions) -> Self {
        Self {
            options,
            release_queue: ReleaseQueue::new(),
            rendered: Vec::new(),
            stats: RenderStats::default(),
            last_errors: Vec::new(),
        }
    }

    #[inline]
    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    /// Tiles drawn by the next compose, coarse to fine.
    #[inline]
    pub fn rendered_tiles(&self) -> &[TileCoord] {
        &self.rendered
    }

    #[inline]
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Tile-scoped batch failures of the last prepare.
    #[inline]
    pub fn last_errors(&self) -> &[(TileCoord, ReplayError)] {
        &self.last_errors
    }

    /// Deferred releases not yet run.
    #[inline]
    pub fn pending_releases(&self) -> usize {
        self.release_queue.len()
    }

    // ── prepare ───────────────────────────────────────────────────────────

    /// Selects and (re)builds the tiles for `frame`. Returns `false` when the
    /// layer has nothing to draw this frame.
    pub fn prepare_frame(
        &mut self,
        frame: &mut FrameState,
        layer: &LayerProperties,
        source: &mut dyn TileSource,
        backend: &mut dyn RenderBackend,
    ) -> bool {
        self.release_queue.collect(frame.index, backend);
        for tile in source.drain_evicted() {
            if let Some(group) = tile.replay_state.replay_group {
                self.release_queue.schedule(frame.index, group.delete_resources_function());
            }
        }

        self.rendered.clear();
        self.last_errors.clear();
        self.stats = RenderStats::default();

        if !frame.extent.has_area() || frame.resolution <= 0.0 {
            return false;
        }

        let grid = source.tile_grid().clone();
        let z = grid.z_for_resolution(frame.resolution);
        let Some(range) = grid.tile_range_for_extent_and_z(frame.extent, z) else {
            return false;
        };

        let interim_on_error = self.options.use_interim_tiles_on_error;
        let mut selected: BTreeMap<u32, Vec<TileCoord>> = BTreeMap::new();
        let mut seen: HashSet<TileCoord> = HashSet::new();
        let mut record = |coord: TileCoord, selected: &mut BTreeMap<u32, Vec<TileCoord>>| {
            if seen.insert(coord) {
                selected.entry(coord.z).or_default().push(coord);
            }
        };

        for coord in range.coords(z) {
            let tile = source.get_tile(coord, frame.pixel_ratio);
            if tile.is_drawable(interim_on_error) {
                record(coord, &mut selected);
                continue;
            }
            if tile.state() == TileState::Idle {
                frame.wanted_tiles.push(coord);
            }

            let source_ref: &dyn TileSource = &*source;
            let mut found: Vec<TileCoord> = Vec::new();
            let covered = grid.for_each_tile_coord_parent_tile_range(coord, |pz, prange| {
                find_drawable(source_ref, pz, &prange, interim_on_error, &mut found)
            });
            if !covered {
                if let Some(child_range) = grid.tile_coord_child_tile_range(coord) {
                    find_drawable(source_ref, z + 1, &child_range, interim_on_error, &mut found);
                }
            }
            for c in found {
                record(c, &mut selected);
            }
        }

        let render_order = layer.render_order().map(|o| o.id());
        for coords in selected.values() {
            for &coord in coords {
                let Some(tile) = source.cached_tile_mut(coord) else { continue };
                if tile.state() != TileState::Loaded
                    || tile.replay_state.is_reusable(layer.revision(), render_order, frame.resolution)
                {
                    continue;
                }
                let tile_extent = grid.tile_coord_extent(coord);
                self.rebuild(tile, tile_extent, frame, layer, backend);
            }
        }

        // BTreeMap iteration is ascending zoom: coarse fallbacks draw first.
        self.rendered = selected.into_values().flatten().collect();
        frame.used_tiles.extend_from_slice(&self.rendered);

        log::trace!(
            "frame {}: z{} range {}x{}, {} tiles selected, {} rebuilt",
            frame.index,
            z,
            range.width(),
            range.height(),
            self.rendered.len(),
            self.stats.groups_built
        );
        true
    }

    fn rebuild(
        &mut self,
        tile: &mut Tile,
        tile_extent: Extent,
        frame: &FrameState,
        layer: &LayerProperties,
        backend: &mut dyn RenderBackend,
    ) {
        let coord = tile.coord();
        if let Some(old) = tile.replay_state.replay_group.take() {
            self.release_queue.schedule(frame.index, old.delete_resources_function());
        }

        let mut features: Vec<Arc<Feature>> = tile.features().to_vec();
        if let Some(order) = layer.render_order() {
            features.sort_by(|a, b| order.compare(a, b));
        }

        let mut group = ReplayGroup::new(tile_extent.center(), tile_extent, self.options.replay.clone());
        let result = self.build_group(&mut group, &features, frame, layer, backend);

        self.stats.groups_built += 1;
        self.stats.triangulations += group.triangulation_count();
        let render_order = layer.render_order().map(|o| o.id());
        tile.replay_state.stamp(layer.revision(), render_order, frame.resolution);

        match result {
            Ok(()) => {
                log::debug!("tile {coord}: built {} features", group.feature_count());
                tile.replay_state.replay_group = Some(group);
            }
            Err(err) => {
                log::warn!("tile {coord}: batch failed: {err}");
                // Never drawn, so nothing in flight can reference it.
                (group.delete_resources_function())(&mut *backend);
                self.last_errors.push((coord, err));
            }
        }
    }

    fn build_group(
        &mut self,
        group: &mut ReplayGroup,
        features: &[Arc<Feature>],
        frame: &FrameState,
        layer: &LayerProperties,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), ReplayError> {
        for feature in features {
            let styles = feature.resolve_styles(layer.style(), frame.resolution);
            if styles.is_empty() {
                continue;
            }
            self.stats.features_batched += 1;
            for style in &styles {
                group.add_feature(feature, style)?;
            }
        }
        group.finish(backend)
    }

    // ── compose ───────────────────────────────────────────────────────────

    /// Replays every prepared tile into the frame target.
    pub fn compose_frame(
        &mut self,
        frame: &FrameState,
        layer: &LayerProperties,
        source: &dyn TileSource,
        backend: &mut dyn RenderBackend,
    ) {
        self.stats.tiles_drawn = 0;
        let grid = source.tile_grid();
        let frame_transform = frame.frame_transform();
        let viewport_px = frame.viewport_px();

        for &coord in &self.rendered {
            let Some(group) = source.cached_tile(coord).and_then(|t| t.replay_state.replay_group.as_ref()) else {
                continue;
            };
            let scissor = if frame.is_rotated() {
                None
            } else {
                match tile_scissor(grid.tile_coord_extent(coord), frame) {
                    Some(rect) => Some(rect),
                    None => continue,
                }
            };
            let params = ReplayParams {
                frame_transform,
                viewport_px,
                pixel_ratio: frame.pixel_ratio,
                opacity: layer.opacity(),
                skipped: &frame.skipped_features,
                blend: BlendMode::Alpha,
                scissor,
            };
            group.replay(backend, &params);
            self.stats.tiles_drawn += 1;
        }
    }

    // ── hit detection ─────────────────────────────────────────────────────

    /// Calls `callback` for each distinct feature rendered at `coordinate`,
    /// topmost first, until it returns `Some`.
    pub fn for_each_feature_at_coordinate<T>(
        &self,
        coordinate: Coord,
        frame: &FrameState,
        source: &dyn TileSource,
        backend: &mut dyn RenderBackend,
        mut callback: impl FnMut(&Arc<Feature>) -> Option<T>,
    ) -> Result<Option<T>, GpuError> {
        let margin_px = self.options.render_buffer.max(0.0) + self.options.hit_tolerance.max(0.0);
        let margin = f64::from(margin_px) * frame.resolution;
        let probe = Extent::new(coordinate.x, coordinate.y, coordinate.x, coordinate.y).buffered(margin);
        let query = HitQuery {
            coordinate,
            resolution: frame.resolution,
            rotation: frame.rotation,
            pixel_ratio: frame.pixel_ratio,
            hit_extent: Some(probe),
            skipped: &frame.skipped_features,
        };

        let mut reported: HashSet<FeatureId> = HashSet::new();
        // Finest tiles were drawn last, so they are on top.
        for &coord in self.rendered.iter().rev() {
            let Some(group) = source.cached_tile(coord).and_then(|t| t.replay_state.replay_group.as_ref()) else {
                continue;
            };
            if !group.max_extent().intersects(probe) {
                continue;
            }
            let hit = group.for_each_feature_at_coordinate(backend, &query, |feature| {
                if reported.insert(feature.id()) { callback(feature) } else { None }
            })?;
            if hit.is_some() {
                return Ok(hit);
            }
        }
        Ok(None)
    }

    pub fn has_feature_at_coordinate(
        &self,
        coordinate: Coord,
        frame: &FrameState,
        source: &dyn TileSource,
        backend: &mut dyn RenderBackend,
    ) -> Result<bool, GpuError> {
        let hit = self.for_each_feature_at_coordinate(coordinate, frame, source, backend, |_| Some(()))?;
        Ok(hit.is_some())
    }

    /// Runs every pending release now, e.g. before dropping the backend.
    pub fn release_all(&mut self, source: &mut dyn TileSource, backend: &mut dyn RenderBackend) {
        for tile in source.drain_evicted() {
            if let Some(group) = tile.replay_state.replay_group {
                (group.delete_resources_function())(&mut *backend);
            }
        }
        self.release_queue.flush(backend);
    }
}

/// Records drawable tiles of `range` found in the cache. Returns whether every
/// tile of the range was drawable.
fn find_drawable(
    source: &dyn TileSource,
    z: u32,
    range: &TileRange,
    interim_on_error: bool,
    found: &mut Vec<TileCoord>,
) -> bool {
    let mut all = true;
    for coord in range.coords(z) {
        match source.cached_tile(coord) {
            Some(tile) if tile.is_drawable(interim_on_error) => found.push(coord),
            _ => all = false,
        }
    }
    all
}

/// Physical-pixel rect of `extent` in an unrotated frame, or `None` when it is
/// entirely outside the viewport.
fn tile_scissor(extent: Extent, frame: &FrameState) -> Option<ScissorRect> {
    let scale = f64::from(frame.pixel_ratio) / frame.resolution;
    let [vw, vh] = frame.viewport_px().map(|v| v.max(1.0) as u32);
    let to_px = |v: f64, max: u32| (v.max(0.0) as u32).min(max);

    let x = to_px(((extent.min_x - frame.extent.min_x) * scale).floor(), vw);
    let y = to_px(((frame.extent.max_y - extent.max_y) * scale).floor(), vh);
    let x2 = to_px(((extent.max_x - frame.extent.min_x) * scale).ceil(), vw);
    let y2 = to_px(((frame.extent.max_y - extent.min_y) * scale).ceil(), vh);

    let (width, height) = (x2.saturating_sub(x), y2.saturating_sub(y));
    if width == 0 || height == 0 { None } else { Some(ScissorRect { x, y, width, height }) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerOptions;
    use crate::feature::{RenderOrder, Style, StyleSource};
    use crate::geometry::Geometry;
    use crate::tile::{MemoryTileSource, TileGrid};
    use strata_engine::paint::Color;
    use strata_engine::render::testing::SoftwareBackend;

    fn grid() -> TileGrid {
        TileGrid::xyz(Extent::new(0.0, 0.0, 1024.0, 1024.0), 3, 256).unwrap()
    }

    fn square(id: u64, e: Extent) -> Arc<Feature> {
        let ring = vec![
            Coord::new(e.min_x, e.min_y),
            Coord::new(e.max_x, e.min_y),
            Coord::new(e.max_x, e.max_y),
            Coord::new(e.min_x, e.max_y),
        ];
        Arc::new(Feature::new(FeatureId(id), Geometry::Polygon(vec![ring])))
    }

    /// Loads each tile with one square inset into its extent.
    fn load(source: &mut MemoryTileSource, coords: &[TileCoord]) {
        let grid = source.tile_grid().clone();
        for &coord in coords {
            let id = u64::from(coord.z) * 1000 + coord.y as u64 * 100 + coord.x as u64;
            let feature = square(id, grid.tile_coord_extent(coord).buffered(-8.0));
            source.set_loaded(coord, vec![feature]);
        }
    }

    /// The four z2 tiles covering a frame centered on the grid.
    fn center_tiles() -> Vec<TileCoord> {
        TileRange::new(1, 2, 1, 2).coords(2).collect()
    }

    fn frame(index: u64, resolution: f64) -> FrameState {
        FrameState::new(index, Coord::new(512.0, 512.0), resolution, 0.0, 1.0, [512, 512])
    }

    fn layer() -> LayerProperties {
        LayerProperties::new().with_style(Style::fill(Color::WHITE))
    }

    struct Harness {
        renderer: TileLayerRenderer,
        source: MemoryTileSource,
        backend: SoftwareBackend,
        layer: LayerProperties,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_options(LayerOptions::default())
        }

        fn with_options(options: LayerOptions) -> Self {
            Self {
                renderer: TileLayerRenderer::new(options),
                source: MemoryTileSource::new(grid()),
                backend: SoftwareBackend::new(),
                layer: layer(),
            }
        }

        fn prepare(&mut self, frame: &mut FrameState) -> bool {
            self.renderer.prepare_frame(frame, &self.layer, &mut self.source, &mut self.backend)
        }

        fn compose(&mut self, frame: &FrameState) {
            self.renderer.compose_frame(frame, &self.layer, &self.source, &mut self.backend);
        }
    }

    /// Area of the viewport covered by the selected tiles, each expanded to the
    /// finest selected zoom.
    fn covered_area(grid: &TileGrid, selected: &[TileCoord], view: Extent) -> f64 {
        let Some(finest) = selected.iter().map(|c| c.z).max() else { return 0.0 };
        let mut cells: HashSet<TileCoord> = HashSet::new();
        for &coord in selected {
            if let Some(range) = grid.tile_range_for_extent_and_z(grid.tile_coord_extent(coord), finest) {
                cells.extend(range.coords(finest));
            }
        }
        cells.iter().map(|&c| grid.tile_coord_extent(c).intersection(view).area()).sum()
    }

    // ── cache reuse ───────────────────────────────────────────────────────

    #[test]
    fn unchanged_tiles_are_not_rebuilt() {
        let mut h = Harness::new();
        load(&mut h.source, &center_tiles());

        let mut f1 = frame(1, 1.0);
        assert!(h.prepare(&mut f1));
        assert_eq!(h.renderer.stats().groups_built, 4);
        assert_eq!(h.renderer.stats().triangulations, 4);
        h.compose(&f1);
        assert_eq!(h.renderer.stats().tiles_drawn, 4);

        let uploads = h.backend.upload_count();
        let mut f2 = frame(2, 1.0);
        assert!(h.prepare(&mut f2));
        assert_eq!(h.renderer.stats().groups_built, 0);
        assert_eq!(h.renderer.stats().triangulations, 0);
        assert_eq!(h.backend.upload_count(), uploads);
    }

    #[test]
    fn revision_resolution_and_dirty_force_rebuilds() {
        let mut h = Harness::new();
        load(&mut h.source, &center_tiles());
        h.prepare(&mut frame(1, 1.0));

        h.layer.set_style(Some(Style::fill(Color::BLACK).into()));
        h.prepare(&mut frame(2, 1.0));
        assert_eq!(h.renderer.stats().groups_built, 4);

        h.prepare(&mut frame(3, 0.9));
        assert_eq!(h.renderer.stats().groups_built, 4, "resolution stamp changed");

        h.source.mark_dirty(TileCoord::new(2, 1, 1));
        h.prepare(&mut frame(4, 0.9));
        assert_eq!(h.renderer.stats().groups_built, 1);
        assert_eq!(h.renderer.stats().triangulations, 1);
    }

    #[test]
    fn tile_without_styles_is_processed_once() {
        let mut h = Harness::new();
        h.layer.set_style(Some(StyleSource::function(|_, _| Vec::new())));
        load(&mut h.source, &center_tiles());

        h.prepare(&mut frame(1, 1.0));
        assert_eq!(h.renderer.stats().groups_built, 4);
        assert_eq!(h.renderer.stats().features_batched, 0);
        h.prepare(&mut frame(2, 1.0));
        assert_eq!(h.renderer.stats().groups_built, 0);
    }

    // ── tile selection ────────────────────────────────────────────────────

    #[test]
    fn idle_tiles_are_wanted_and_nothing_is_drawn() {
        let mut h = Harness::new();
        let mut f = frame(1, 1.0);
        assert!(h.prepare(&mut f));
        assert!(h.renderer.rendered_tiles().is_empty());
        let mut wanted = f.wanted_tiles.clone();
        wanted.sort();
        let mut expected = center_tiles();
        expected.sort();
        assert_eq!(wanted, expected);
    }

    #[test]
    fn coverage_has_no_gaps_for_any_availability() {
        let view = frame(0, 1.0).extent;
        let all_loaded = center_tiles();
        let patterns: Vec<(&str, Vec<TileCoord>)> = vec![
            ("target idle, root loaded", vec![TileCoord::new(0, 0, 0)]),
            (
                "partially loaded",
                vec![TileCoord::new(0, 0, 0), TileCoord::new(2, 1, 1), TileCoord::new(2, 2, 2)],
            ),
            ("all loaded", all_loaded),
            ("children only", TileRange::new(2, 5, 2, 5).coords(3).collect()),
        ];

        for (name, loaded) in patterns {
            let mut h = Harness::new();
            load(&mut h.source, &loaded);
            let mut f = frame(1, 1.0);
            assert!(h.prepare(&mut f), "{name}");

            let selected = h.renderer.rendered_tiles();
            let area = covered_area(&grid(), selected, view);
            assert!((area - view.area()).abs() < 1e-6, "{name}: covered {area} of {}", view.area());
            assert_eq!(f.used_tiles, selected, "{name}");
        }
    }

    #[test]
    fn tiles_are_ordered_coarse_to_fine() {
        let mut h = Harness::new();
        load(&mut h.source, &[TileCoord::new(2, 1, 1), TileCoord::new(0, 0, 0)]);
        h.prepare(&mut frame(1, 1.0));
        let zooms: Vec<u32> = h.renderer.rendered_tiles().iter().map(|c| c.z).collect();
        assert_eq!(zooms, vec![0, 2]);
    }

    #[test]
    fn error_tiles_follow_the_interim_policy() {
        let failed = TileCoord::new(2, 1, 1);
        let parent = TileCoord::new(1, 0, 0);
        let others: Vec<TileCoord> = center_tiles().into_iter().filter(|&c| c != failed).collect();

        for interim in [true, false] {
            let mut h = Harness::with_options(LayerOptions {
                use_interim_tiles_on_error: interim,
                ..LayerOptions::default()
            });
            load(&mut h.source, &others);
            load(&mut h.source, &[parent]);
            h.source.set_state(failed, TileState::Error);

            h.prepare(&mut frame(1, 1.0));
            let rendered = h.renderer.rendered_tiles();
            assert_eq!(rendered.contains(&parent), interim);
            assert_eq!(rendered.contains(&failed), !interim);
        }
    }

    #[test]
    fn empty_extent_draws_nothing() {
        let mut h = Harness::new();
        load(&mut h.source, &center_tiles());
        let mut f = FrameState::new(1, Coord::new(512.0, 512.0), 1.0, 0.0, 1.0, [0, 0]);
        assert!(!h.prepare(&mut f));
        assert!(h.renderer.rendered_tiles().is_empty());

        let mut outside = FrameState::new(2, Coord::new(5000.0, 5000.0), 1.0, 0.0, 1.0, [100, 100]);
        assert!(!h.prepare(&mut outside));
    }

    // ── errors ────────────────────────────────────────────────────────────

    #[test]
    fn batch_failure_is_scoped_to_its_tile() {
        let mut h = Harness::new();
        h.backend = SoftwareBackend::with_wide_indices(false);
        let grid = grid();

        let big = TileCoord::new(2, 1, 1);
        let e = grid.tile_coord_extent(big);
        let triangles: Vec<Arc<Feature>> = (0..21_900u64)
            .map(|i| {
                let x = e.min_x + (i % 200) as f64;
                let y = e.min_y + (i / 200) as f64;
                let ring = vec![Coord::new(x, y), Coord::new(x + 0.5, y), Coord::new(x, y + 0.5)];
                Arc::new(Feature::new(FeatureId(i), Geometry::Polygon(vec![ring])))
            })
            .collect();
        let others: Vec<TileCoord> = center_tiles().into_iter().filter(|&c| c != big).collect();
        load(&mut h.source, &others);
        h.source.set_loaded(big, triangles);

        h.prepare(&mut frame(1, 1.0));
        let errors = h.renderer.last_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, big);
        assert!(matches!(errors[0].1, ReplayError::IndexRangeExceeded { .. }));
        assert!(h.source.cached_tile(big).unwrap().replay_state.replay_group.is_none());
        for coord in &others {
            assert!(h.source.cached_tile(*coord).unwrap().replay_state.replay_group.is_some());
        }
        assert_eq!(h.backend.live_buffers(), 6, "failed tile left nothing behind");

        h.prepare(&mut frame(2, 1.0));
        assert_eq!(h.renderer.stats().groups_built, 0, "failed tile is not retried");
    }

    // ── release ───────────────────────────────────────────────────────────

    #[test]
    fn evicted_tiles_are_released_a_frame_later() {
        let mut h = Harness::new();
        load(&mut h.source, &center_tiles());
        h.prepare(&mut frame(1, 1.0));
        assert_eq!(h.backend.live_buffers(), 8);

        h.source.expire_cache(0, &HashSet::new());
        h.prepare(&mut frame(2, 1.0));
        assert_eq!(h.backend.live_buffers(), 8, "still referenced by frame 1");
        assert_eq!(h.renderer.pending_releases(), 4);

        h.prepare(&mut frame(3, 1.0));
        assert_eq!(h.backend.live_buffers(), 0);
    }

    #[test]
    fn replaced_groups_are_released_a_frame_later() {
        let mut h = Harness::new();
        load(&mut h.source, &center_tiles());
        h.prepare(&mut frame(1, 1.0));
        h.layer.changed();
        h.prepare(&mut frame(2, 1.0));
        assert_eq!(h.backend.live_buffers(), 16);
        h.prepare(&mut frame(3, 1.0));
        assert_eq!(h.backend.live_buffers(), 8);
    }

    // ── compose ───────────────────────────────────────────────────────────

    #[test]
    fn unrotated_compose_scissors_each_tile() {
        let mut h = Harness::new();
        load(&mut h.source, &center_tiles());
        let mut f = frame(1, 1.0);
        h.prepare(&mut f);
        h.compose(&f);

        let scissors: Vec<Option<ScissorRect>> = h.backend.frame_draws().map(|d| d.scissor).collect();
        assert_eq!(scissors.len(), 4);
        assert!(scissors.contains(&Some(ScissorRect { x: 0, y: 0, width: 256, height: 256 })));
        assert!(scissors.contains(&Some(ScissorRect { x: 256, y: 256, width: 256, height: 256 })));

        h.backend.clear_log();
        let mut rotated = FrameState::new(2, Coord::new(512.0, 512.0), 1.0, 0.3, 1.0, [512, 512]);
        h.prepare(&mut rotated);
        h.compose(&rotated);
        assert!(h.backend.frame_draws().all(|d| d.scissor.is_none()));
    }

    // ── hit detection ─────────────────────────────────────────────────────

    #[test]
    fn hit_reports_the_tile_feature_under_the_coordinate() {
        let mut h = Harness::new();
        load(&mut h.source, &center_tiles());
        let mut f = frame(1, 1.0);
        h.prepare(&mut f);

        let hit = h
            .renderer
            .for_each_feature_at_coordinate(Coord::new(400.0, 600.0), &f, &h.source, &mut h.backend, |feat| {
                Some(feat.id())
            })
            .unwrap();
        assert_eq!(hit, Some(FeatureId(2000 + 100 + 1)));

        let gap = Coord::new(512.0, 600.0);
        assert!(!h.renderer.has_feature_at_coordinate(gap, &f, &h.source, &mut h.backend).unwrap());
    }

    #[test]
    fn feature_shared_by_tiles_is_reported_once() {
        let mut h = Harness::new();
        let shared = square(77, Extent::new(300.0, 300.0, 700.0, 700.0));
        for coord in center_tiles() {
            h.source.set_loaded(coord, vec![shared.clone()]);
        }
        let mut f = frame(1, 1.0);
        h.prepare(&mut f);

        let mut hits = Vec::new();
        h.renderer
            .for_each_feature_at_coordinate::<()>(Coord::new(512.0, 512.0), &f, &h.source, &mut h.backend, |feat| {
                hits.push(feat.id());
                None
            })
            .unwrap();
        assert_eq!(hits, vec![FeatureId(77)]);
    }

    #[test]
    fn skipped_features_are_neither_drawn_nor_hit() {
        let mut h = Harness::new();
        load(&mut h.source, &center_tiles());
        let skip = FeatureId(2000 + 100 + 1);
        let mut f = frame(1, 1.0).with_skipped([skip]);
        h.prepare(&mut f);
        h.compose(&f);

        assert_eq!(h.backend.frame_draws().count(), 3);
        assert!(!h.renderer.has_feature_at_coordinate(Coord::new(400.0, 600.0), &f, &h.source, &mut h.backend).unwrap());
    }

    #[test]
    fn point_and_line_hit_away_from_their_exact_geometry() {
        let mut h = Harness::new();
        h.layer.set_style(Some(Style::fill(Color::WHITE).with_stroke(Color::BLACK, 4.0).into()));
        let point = Arc::new(Feature::new(FeatureId(1), Geometry::Point(Coord::new(400.0, 600.0))));
        let line = Arc::new(Feature::new(
            FeatureId(2),
            Geometry::LineString(vec![Coord::new(270.0, 700.0), Coord::new(500.0, 700.0)]),
        ));
        h.source.set_loaded(TileCoord::new(2, 1, 1), vec![point, line]);
        let mut f = frame(1, 1.0);
        h.prepare(&mut f);

        let mut hit_at = |x: f64, y: f64| {
            h.renderer
                .for_each_feature_at_coordinate(Coord::new(x, y), &f, &h.source, &mut h.backend, |feat| {
                    Some(feat.id())
                })
                .unwrap()
        };
        assert_eq!(hit_at(401.5, 601.5), Some(FeatureId(1)), "inside the 6 px sprite");
        assert_eq!(hit_at(380.0, 701.0), Some(FeatureId(2)), "within half the 4 px line width");
        assert_eq!(hit_at(380.0, 710.0), None);
    }

    #[test]
    fn render_order_sorts_features_and_forces_rebuild() {
        let red = Color::new(1.0, 0.0, 0.0, 1.0);
        let blue = Color::new(0.0, 0.0, 1.0, 1.0);
        let coord = TileCoord::new(2, 1, 1);
        let area = Extent::new(300.0, 550.0, 450.0, 700.0);
        let styled = |id: u64, color: Color| {
            let plain = square(id, area);
            Arc::new(Feature::new(plain.id(), plain.geometry().clone()).with_style(Style::fill(color)))
        };

        let mut h = Harness::new();
        h.source.set_loaded(coord, vec![styled(1, red), styled(2, blue)]);
        let at = Coord::new(400.0, 600.0);

        let mut f1 = frame(1, 1.0);
        h.prepare(&mut f1);
        h.compose(&f1);
        let first_vertex_color = |backend: &SoftwareBackend| {
            let draw = backend.frame_draws().next().unwrap();
            backend.vertex_data(draw.vertex_buffer).unwrap()[2..6].to_vec()
        };
        assert_eq!(first_vertex_color(&h.backend), red.to_array().to_vec());
        let top = h.renderer.for_each_feature_at_coordinate(at, &f1, &h.source, &mut h.backend, |f| Some(f.id()));
        assert_eq!(top.unwrap(), Some(FeatureId(2)), "last drawn is on top");

        let descending = RenderOrder::new(|a, b| b.id().0.cmp(&a.id().0));
        let order_id = descending.id();
        h.layer.set_render_order(Some(descending));
        let mut f2 = frame(2, 1.0);
        h.prepare(&mut f2);
        assert_eq!(h.renderer.stats().groups_built, 1);
        let state = &h.source.cached_tile(coord).unwrap().replay_state;
        assert_eq!(state.rendered_render_order, Some(order_id));

        h.backend.clear_log();
        h.compose(&f2);
        assert_eq!(first_vertex_color(&h.backend), blue.to_array().to_vec());
        let top = h.renderer.for_each_feature_at_coordinate(at, &f2, &h.source, &mut h.backend, |f| Some(f.id()));
        assert_eq!(top.unwrap(), Some(FeatureId(1)));

        let mut f3 = frame(3, 1.0);
        h.prepare(&mut f3);
        assert_eq!(h.renderer.stats().groups_built, 0, "same order instance is reused");
    }
}
