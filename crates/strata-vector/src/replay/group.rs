//! Replay group: every replay of one tile plus GPU hit detection.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use strata_engine::coords::{Coord, Extent};
use strata_engine::render::{BlendMode, GpuError, ReleaseFn, RenderBackend};

use super::{FeatureRange, HitProbe, Replay, ReplayKind, ReplayParams};
use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::feature::{Feature, FeatureId, Style};
use crate::frame::view_transform;

/// A hit-detection query against a 1x1 target centered on `coordinate`.
#[derive(Debug, Clone)]
pub struct HitQuery<'a> {
    pub coordinate: Coord,
    /// Map units per CSS pixel.
    pub resolution: f64,
    pub rotation: f64,
    pub pixel_ratio: f32,
    /// Only features whose extent intersects this are drawn.
    pub hit_extent: Option<Extent>,
    pub skipped: &'a HashSet<FeatureId>,
}

impl<'a> HitQuery<'a> {
    fn params(&self) -> ReplayParams<'a> {
        // One physical pixel spans `resolution / pixel_ratio` map units.
        let css_size = 1.0 / self.pixel_ratio as f64;
        ReplayParams {
            frame_transform: view_transform(self.coordinate, self.resolution, self.rotation, [css_size; 2]),
            viewport_px: [1.0, 1.0],
            pixel_ratio: self.pixel_ratio,
            opacity: 1.0,
            skipped: self.skipped,
            blend: BlendMode::Additive,
            scissor: None,
        }
    }
}

/// All replays of one tile, keyed by kind and created on first use.
#[derive(Debug)]
pub struct ReplayGroup {
    origin: Coord,
    max_extent: Extent,
    config: ReplayConfig,
    replays: BTreeMap<ReplayKind, Replay>,
    finished: bool,
}

impl ReplayGroup {
    /// `origin` is the local frame vertices are stored in; `max_extent` bounds
    /// the content (the tile extent).
    pub fn new(origin: Coord, max_extent: Extent, config: ReplayConfig) -> Self {
        Self {
            origin,
            max_extent,
            config,
            replays: BTreeMap::new(),
            finished: false,
        }
    }

    #[inline]
    pub fn origin(&self) -> Coord {
        self.origin
    }

    #[inline]
    pub fn max_extent(&self) -> Extent {
        self.max_extent
    }

    /// Appends `feature` with one resolved style to the replay of its kind.
    pub fn add_feature(&mut self, feature: &Arc<Feature>, style: &Style) -> Result<(), ReplayError> {
        if self.finished {
            return Err(ReplayError::AppendAfterFinish);
        }
        if style.is_empty() {
            return Ok(());
        }
        let kind = feature.geometry().replay_kind();
        let (origin, config) = (self.origin, &self.config);
        self.replays
            .entry(kind)
            .or_insert_with(|| Replay::new(kind, origin, config))
            .add(feature, feature.geometry(), style)
    }

    /// Uploads every replay. Must be called exactly once, before any draw.
    pub fn finish(&mut self, backend: &mut dyn RenderBackend) -> Result<(), ReplayError> {
        if self.finished {
            return Err(ReplayError::AlreadyFinished);
        }
        self.finished = true;
        for replay in self.replays.values_mut() {
            replay.finish(backend)?;
        }
        Ok(())
    }

    /// Whether any replay was ever created.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.replays.is_empty()
    }

    /// Draws every replay in kind order.
    pub fn replay(&self, backend: &mut dyn RenderBackend, params: &ReplayParams<'_>) {
        for kind in ReplayKind::ORDERED {
            if let Some(replay) = self.replays.get(&kind) {
                replay.replay(backend, params);
            }
        }
    }

    /// A closure releasing every GPU buffer of this group. Run it only once no
    /// in-flight frame references the group.
    pub fn delete_resources_function(&self) -> ReleaseFn {
        let ids: Vec<_> = self.replays.values().flat_map(Replay::release_ids).collect();
        Box::new(move |backend: &mut dyn RenderBackend| {
            for id in ids {
                backend.release_buffer(id);
            }
        })
    }

    /// Ring sets triangulated while building this group.
    pub fn triangulation_count(&self) -> usize {
        self.replays.values().map(Replay::triangulation_count).sum()
    }

    /// Features batched in this group, counted once per replay they appear in.
    pub fn feature_count(&self) -> usize {
        self.replays.values().map(|r| r.feature_ranges().len()).sum()
    }

    /// Draws candidate features one at a time into the hit target, topmost
    /// first, and calls `callback` for each one that covers the probed pixel.
    ///
    /// Iteration stops at the first `Some` returned by `callback`. The hit
    /// target is unbound again before returning, also on error.
    pub fn for_each_feature_at_coordinate<T>(
        &self,
        backend: &mut dyn RenderBackend,
        query: &HitQuery<'_>,
        mut callback: impl FnMut(&Arc<Feature>) -> Option<T>,
    ) -> Result<Option<T>, GpuError> {
        if self.replays.is_empty() {
            return Ok(None);
        }
        let params = query.params();

        backend.bind_hit_target()?;
        let mut probe = |backend: &mut dyn RenderBackend, range: &FeatureRange| -> Result<Option<T>, GpuError> {
            let pixel = backend.read_pixel()?;
            if pixel == [0; 4] {
                return Ok(None);
            }
            Ok(range.feature.upgrade().and_then(|feature| callback(&feature)))
        };
        let result = self.probe_kinds(backend, &params, query.hit_extent, &mut probe);
        backend.unbind_hit_target();
        result
    }

    fn probe_kinds<T>(
        &self,
        backend: &mut dyn RenderBackend,
        params: &ReplayParams<'_>,
        hit_extent: Option<Extent>,
        probe: &mut HitProbe<'_, T>,
    ) -> Result<Option<T>, GpuError> {
        for kind in ReplayKind::HIT_ORDER {
            let Some(replay) = self.replays.get(&kind) else { continue };
            if let Some(hit) = replay.replay_one_by_one(backend, params, hit_extent, probe)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    pub fn has_feature_at_coordinate(
        &self,
        backend: &mut dyn RenderBackend,
        query: &HitQuery<'_>,
    ) -> Result<bool, GpuError> {
        Ok(self.for_each_feature_at_coordinate(backend, query, |_| Some(()))?.is_some())
    }
}
