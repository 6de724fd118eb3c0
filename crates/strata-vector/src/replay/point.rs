use std::sync::Arc;

use strata_engine::coords::{Coord, Extent};
use strata_engine::render::{BufferId, GpuError, Primitive, RenderBackend, POINT_VERTEX_STRIDE};

use super::{issue_draw, local_xy, visible_spans, FeatureRange, HitProbe, ReplayParams};
use crate::batch::VertexBatch;
use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::feature::{Feature, Style};
use crate::geometry::Geometry;

/// Batches points as one sprite vertex each: `x, y, r, g, b, a, size`.
#[derive(Debug)]
pub struct PointReplay {
    origin: Coord,
    point_size: f32,
    batch: VertexBatch,
    ranges: Vec<FeatureRange>,
    warned_unsupported: bool,
}

impl PointReplay {
    pub fn new(origin: Coord, config: &ReplayConfig) -> Self {
        Self {
            origin,
            point_size: config.point_size,
            batch: VertexBatch::new("strata-point-replay", POINT_VERTEX_STRIDE),
            ranges: Vec::new(),
            warned_unsupported: false,
        }
    }

    /// Appends every point of `geometry` in the style's fill color, falling back
    /// to the stroke color. A style with neither adds nothing.
    pub fn add(&mut self, feature: &Arc<Feature>, geometry: &Geometry, style: &Style) -> Result<(), ReplayError> {
        let color = match (&style.fill, &style.stroke) {
            (Some(fill), _) => fill.color,
            (None, Some(stroke)) => stroke.color,
            (None, None) => return Ok(()),
        };

        let points: &[Coord] = match geometry {
            Geometry::Point(c) => std::slice::from_ref(c),
            Geometry::MultiPoint(cs) => cs,
            _ => {
                if !self.warned_unsupported {
                    log::debug!("point replay ignores {:?} geometry", geometry.kind());
                    self.warned_unsupported = true;
                }
                return Ok(());
            }
        };

        let start = self.batch.vertex_count();
        let [r, g, b, a] = color.to_array();
        for &c in points.iter().filter(|c| c.is_finite()) {
            let [x, y] = local_xy(c, self.origin);
            self.batch.push_vertex(&[x, y, r, g, b, a, self.point_size])?;
        }
        let end = self.batch.vertex_count();
        if end > start {
            self.ranges.push(FeatureRange::new(feature, start, end));
        }
        Ok(())
    }

    pub fn finish(&mut self, backend: &mut dyn RenderBackend) -> Result<(), ReplayError> {
        self.batch.finish(backend)
    }

    pub fn replay(&self, backend: &mut dyn RenderBackend, params: &ReplayParams<'_>) {
        let Some(buffers) = self.batch.buffers() else { return };
        let uniforms = params.uniforms(self.origin, 1.0);
        for span in visible_spans(&self.ranges, self.batch.vertex_count(), params.skipped) {
            issue_draw(backend, Primitive::Points, buffers, span, uniforms, params);
        }
    }

    pub fn replay_one_by_one<T>(
        &self,
        backend: &mut dyn RenderBackend,
        params: &ReplayParams<'_>,
        hit_extent: Option<Extent>,
        probe: &mut HitProbe<'_, T>,
    ) -> Result<Option<T>, GpuError> {
        let Some(buffers) = self.batch.buffers() else { return Ok(None) };
        let uniforms = params.uniforms(self.origin, 1.0);
        for range in self.ranges.iter().rev() {
            if !range.is_candidate(params.skipped, hit_extent) {
                continue;
            }
            backend.clear_target();
            issue_draw(backend, Primitive::Points, buffers, range.elements(), uniforms, params);
            if let Some(hit) = probe(backend, range)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    pub fn release_ids(&self) -> Vec<BufferId> {
        self.batch.release_ids()
    }

    pub fn feature_ranges(&self) -> &[FeatureRange] {
        &self.ranges
    }

    pub fn vertex_count(&self) -> u32 {
        self.batch.vertex_count()
    }
}
