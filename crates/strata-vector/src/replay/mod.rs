//! Per-geometry-kind batch compilers.
//!
//! Each replay appends one kind of geometry to its own [`VertexBatch`],
//! remembers which element range belongs to which feature, uploads once on
//! `finish`, and then draws either everything at once or one feature at a time
//! for hit detection.
//!
//! Convention:
//! - Vertices are stored relative to the replay origin (the tile center) as f32.
//! - The origin translation is folded into the per-draw transform in f64.

mod group;
mod line_string;
mod point;
mod polygon;

use std::collections::HashSet;
use std::ops::Range;
use std::sync::{Arc, Weak};

use strata_engine::coords::{Coord, Extent, Transform2D};
use strata_engine::render::{
    BlendMode, BufferId, DrawCall, DrawUniforms, GpuError, Primitive, RenderBackend, ScissorRect,
};

use crate::batch::BatchBuffers;
use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::feature::{Feature, FeatureId, Style};
use crate::geometry::Geometry;

pub use group::{HitQuery, ReplayGroup};
pub use line_string::LineStringReplay;
pub use point::PointReplay;
pub use polygon::PolygonReplay;

/// Replay kinds, declared in bulk draw order: later kinds draw over earlier ones.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ReplayKind {
    Polygon,
    LineString,
    Point,
}

impl ReplayKind {
    /// Bulk draw order.
    pub const ORDERED: [ReplayKind; 3] = [ReplayKind::Polygon, ReplayKind::LineString, ReplayKind::Point];

    /// Hit detection probe order, topmost kind first.
    pub const HIT_ORDER: [ReplayKind; 3] = [ReplayKind::Point, ReplayKind::LineString, ReplayKind::Polygon];
}

/// Element range one feature occupies in a batch.
///
/// `start..end` counts indices for indexed batches and vertices otherwise.
#[derive(Debug, Clone)]
pub struct FeatureRange {
    pub start: u32,
    pub end: u32,
    pub feature: Weak<Feature>,
    pub id: FeatureId,
    pub extent: Extent,
}

impl FeatureRange {
    pub(crate) fn new(feature: &Arc<Feature>, start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            feature: Arc::downgrade(feature),
            id: feature.id(),
            extent: feature.extent(),
        }
    }

    #[inline]
    pub fn elements(&self) -> Range<u32> {
        self.start..self.end
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether hit detection should draw this feature at all.
    pub(crate) fn is_candidate(&self, skipped: &HashSet<FeatureId>, hit_extent: Option<Extent>) -> bool {
        !skipped.contains(&self.id) && hit_extent.is_none_or(|probe| self.extent.intersects(probe))
    }
}

/// Parameters shared by every draw of one replay pass.
#[derive(Debug, Clone)]
pub struct ReplayParams<'a> {
    /// Map coordinates to clip space.
    pub frame_transform: Transform2D,
    /// Target size in physical pixels.
    pub viewport_px: [f32; 2],
    pub pixel_ratio: f32,
    pub opacity: f32,
    pub skipped: &'a HashSet<FeatureId>,
    pub blend: BlendMode,
    pub scissor: Option<ScissorRect>,
}

impl ReplayParams<'_> {
    /// Uniforms for vertices stored relative to `origin`.
    pub fn uniforms(&self, origin: Coord, line_width: f32) -> DrawUniforms {
        let transform = Transform2D::translate(origin.x, origin.y).then(self.frame_transform);
        DrawUniforms {
            transform: transform.to_mat4_f32(),
            viewport_px: self.viewport_px,
            opacity: self.opacity,
            line_width,
            pixel_ratio: self.pixel_ratio,
            ..DrawUniforms::default()
        }
    }
}

/// Hit detection callback: runs after a feature was drawn into the cleared hit
/// target and decides whether iteration stops.
pub type HitProbe<'f, T> = dyn FnMut(&mut dyn RenderBackend, &FeatureRange) -> Result<Option<T>, GpuError> + 'f;

/// Closed dispatch over the replay kinds.
#[derive(Debug)]
pub enum Replay {
    Point(PointReplay),
    LineString(LineStringReplay),
    Polygon(PolygonReplay),
}

impl Replay {
    pub fn new(kind: ReplayKind, origin: Coord, config: &ReplayConfig) -> Self {
        match kind {
            ReplayKind::Point => Replay::Point(PointReplay::new(origin, config)),
            ReplayKind::LineString => Replay::LineString(LineStringReplay::new(origin, config)),
            ReplayKind::Polygon => Replay::Polygon(PolygonReplay::new(origin, config)),
        }
    }

    pub fn kind(&self) -> ReplayKind {
        match self {
            Replay::Point(_) => ReplayKind::Point,
            Replay::LineString(_) => ReplayKind::LineString,
            Replay::Polygon(_) => ReplayKind::Polygon,
        }
    }

    pub fn add(&mut self, feature: &Arc<Feature>, geometry: &Geometry, style: &Style) -> Result<(), ReplayError> {
        match self {
            Replay::Point(r) => r.add(feature, geometry, style),
            Replay::LineString(r) => r.add(feature, geometry, style),
            Replay::Polygon(r) => r.add(feature, geometry, style),
        }
    }

    pub fn finish(&mut self, backend: &mut dyn RenderBackend) -> Result<(), ReplayError> {
        match self {
            Replay::Point(r) => r.finish(backend),
            Replay::LineString(r) => r.finish(backend),
            Replay::Polygon(r) => r.finish(backend),
        }
    }

    pub fn replay(&self, backend: &mut dyn RenderBackend, params: &ReplayParams<'_>) {
        match self {
            Replay::Point(r) => r.replay(backend, params),
            Replay::LineString(r) => r.replay(backend, params),
            Replay::Polygon(r) => r.replay(backend, params),
        }
    }

    pub fn replay_one_by_one<T>(
        &self,
        backend: &mut dyn RenderBackend,
        params: &ReplayParams<'_>,
        hit_extent: Option<Extent>,
        probe: &mut HitProbe<'_, T>,
    ) -> Result<Option<T>, GpuError> {
        match self {
            Replay::Point(r) => r.replay_one_by_one(backend, params, hit_extent, probe),
            Replay::LineString(r) => r.replay_one_by_one(backend, params, hit_extent, probe),
            Replay::Polygon(r) => r.replay_one_by_one(backend, params, hit_extent, probe),
        }
    }

    pub fn release_ids(&self) -> Vec<BufferId> {
        match self {
            Replay::Point(r) => r.release_ids(),
            Replay::LineString(r) => r.release_ids(),
            Replay::Polygon(r) => r.release_ids(),
        }
    }

    pub fn feature_ranges(&self) -> &[FeatureRange] {
        match self {
            Replay::Point(r) => r.feature_ranges(),
            Replay::LineString(r) => r.feature_ranges(),
            Replay::Polygon(r) => r.feature_ranges(),
        }
    }

    pub fn triangulation_count(&self) -> usize {
        match self {
            Replay::Polygon(r) => r.triangulation_count(),
            Replay::Point(_) | Replay::LineString(_) => 0,
        }
    }
}

// ── shared draw helpers ───────────────────────────────────────────────────

/// Position relative to `origin` as the f32 pair stored in vertices.
#[inline]
pub(crate) fn local_xy(c: Coord, origin: Coord) -> [f32; 2] {
    [(c.x - origin.x) as f32, (c.y - origin.y) as f32]
}

pub(crate) fn issue_draw(
    backend: &mut dyn RenderBackend,
    primitive: Primitive,
    buffers: BatchBuffers,
    elements: Range<u32>,
    uniforms: DrawUniforms,
    params: &ReplayParams<'_>,
) {
    if elements.is_empty() {
        return;
    }
    backend.draw(&DrawCall {
        primitive,
        vertex_buffer: buffers.vertex,
        index_buffer: buffers.index,
        elements,
        uniforms,
        blend: params.blend,
        scissor: params.scissor,
    });
}

/// Element spans to draw in bulk, in insertion order, with skipped features cut
/// out and neighbouring ranges merged.
pub(crate) fn visible_spans(ranges: &[FeatureRange], total: u32, skipped: &HashSet<FeatureId>) -> Vec<Range<u32>> {
    if skipped.is_empty() {
        return if total > 0 { vec![0..total] } else { Vec::new() };
    }

    let mut spans: Vec<Range<u32>> = Vec::new();
    for range in ranges.iter().filter(|r| !r.is_empty()) {
        if skipped.contains(&range.id) {
            continue;
        }
        match spans.last_mut() {
            Some(last) if last.end == range.start => last.end = range.end,
            _ => spans.push(range.elements()),
        }
    }
    spans
}
