use std::sync::Arc;

use strata_engine::coords::{Coord, Extent};
use strata_engine::paint::Color;
use strata_engine::render::{BufferId, GpuError, Primitive, RenderBackend, COLORED_VERTEX_STRIDE};

use super::{issue_draw, local_xy, visible_spans, FeatureRange, HitProbe, ReplayParams};
use crate::batch::VertexBatch;
use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::feature::{Feature, Style};
use crate::geometry::{open_ring, Geometry};

/// Batches paths as independent segments, two vertices per coordinate pair.
///
/// Vertex color is the stroke color current at append time. The line width is
/// one value for the whole batch: the last stroke width seen, else the
/// configured default.
#[derive(Debug)]
pub struct LineStringReplay {
    origin: Coord,
    line_width: f32,
    batch: VertexBatch,
    ranges: Vec<FeatureRange>,
    warned_unsupported: bool,
}

impl LineStringReplay {
    pub fn new(origin: Coord, config: &ReplayConfig) -> Self {
        Self {
            origin,
            line_width: config.line_width,
            batch: VertexBatch::new("strata-line-replay", COLORED_VERTEX_STRIDE),
            ranges: Vec::new(),
            warned_unsupported: false,
        }
    }

    pub fn add(&mut self, feature: &Arc<Feature>, geometry: &Geometry, style: &Style) -> Result<(), ReplayError> {
        let Some(stroke) = style.stroke else { return Ok(()) };
        self.line_width = stroke.width;

        let start = self.batch.vertex_count();
        match geometry {
            Geometry::LineString(path) => self.push_path(path, false, stroke.color)?,
            Geometry::MultiLineString(paths) => {
                for path in paths {
                    self.push_path(path, false, stroke.color)?;
                }
            }
            _ => {
                if !self.warned_unsupported {
                    log::debug!("line replay ignores {:?} geometry", geometry.kind());
                    self.warned_unsupported = true;
                }
                return Ok(());
            }
        }
        self.close_range(feature, start);
        Ok(())
    }

    /// Appends polygon rings as closed outlines for one feature.
    ///
    /// Returns the vertex range written.
    pub(crate) fn add_rings(
        &mut self,
        feature: &Arc<Feature>,
        rings: &[Vec<Coord>],
        color: Color,
    ) -> Result<std::ops::Range<u32>, ReplayError> {
        let start = self.batch.vertex_count();
        for ring in rings {
            self.push_path(open_ring(ring), true, color)?;
        }
        self.close_range(feature, start);
        Ok(start..self.batch.vertex_count())
    }

    fn close_range(&mut self, feature: &Arc<Feature>, start: u32) {
        let end = self.batch.vertex_count();
        if end > start {
            self.ranges.push(FeatureRange::new(feature, start, end));
        }
    }

    fn push_path(&mut self, path: &[Coord], closed: bool, color: Color) -> Result<(), ReplayError> {
        if path.iter().any(|c| !c.is_finite()) {
            // A non-finite coordinate breaks the path; its neighbours are not joined.
            for run in path.split(|c| !c.is_finite()) {
                self.push_run(run, false, color)?;
            }
            return Ok(());
        }
        self.push_run(path, closed, color)
    }

    fn push_run(&mut self, path: &[Coord], closed: bool, color: Color) -> Result<(), ReplayError> {
        if path.len() < 2 {
            return Ok(());
        }
        let [r, g, b, a] = color.to_array();
        let origin = self.origin;
        let push = |batch: &mut VertexBatch, p: Coord, q: Coord| -> Result<(), ReplayError> {
            let [px, py] = local_xy(p, origin);
            let [qx, qy] = local_xy(q, origin);
            batch.push_vertex(&[px, py, r, g, b, a])?;
            batch.push_vertex(&[qx, qy, r, g, b, a])?;
            Ok(())
        };

        for pair in path.windows(2) {
            push(&mut self.batch, pair[0], pair[1])?;
        }
        if closed && path.len() > 2 {
            push(&mut self.batch, path[path.len() - 1], path[0])?;
        }
        Ok(())
    }

    /// Overrides the color of every pending vertex.
    pub(crate) fn set_color(&mut self, color: Color) {
        for (k, channel) in color.to_array().into_iter().enumerate() {
            self.batch.fill_attribute(2 + k, channel);
        }
    }

    pub(crate) fn set_line_width(&mut self, width: f32) {
        self.line_width = width;
    }

    #[inline]
    pub fn line_width(&self) -> f32 {
        self.line_width
    }

    pub fn finish(&mut self, backend: &mut dyn RenderBackend) -> Result<(), ReplayError> {
        self.batch.finish(backend)
    }

    pub fn replay(&self, backend: &mut dyn RenderBackend, params: &ReplayParams<'_>) {
        let Some(buffers) = self.batch.buffers() else { return };
        let uniforms = params.uniforms(self.origin, self.line_width);
        for span in visible_spans(&self.ranges, self.batch.vertex_count(), params.skipped) {
            issue_draw(backend, Primitive::Segments, buffers, span, uniforms, params);
        }
    }

    /// Draws a single vertex range, used by the polygon outline.
    pub(crate) fn draw_range(
        &self,
        backend: &mut dyn RenderBackend,
        params: &ReplayParams<'_>,
        elements: std::ops::Range<u32>,
    ) {
        let Some(buffers) = self.batch.buffers() else { return };
        let uniforms = params.uniforms(self.origin, self.line_width);
        issue_draw(backend, Primitive::Segments, buffers, elements, uniforms, params);
    }

    pub fn replay_one_by_one<T>(
        &self,
        backend: &mut dyn RenderBackend,
        params: &ReplayParams<'_>,
        hit_extent: Option<Extent>,
        probe: &mut HitProbe<'_, T>,
    ) -> Result<Option<T>, GpuError> {
        if self.batch.buffers().is_none() {
            return Ok(None);
        }
        for range in self.ranges.iter().rev() {
            if !range.is_candidate(params.skipped, hit_extent) {
                continue;
            }
            backend.clear_target();
            self.draw_range(backend, params, range.elements());
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

    pub(crate) fn is_finished(&self) -> bool {
        self.batch.is_finished()
    }
}
