use std::ops::Range;
use std::sync::Arc;

use strata_engine::coords::{Coord, Extent};
use strata_engine::paint::Color;
use strata_engine::render::{BufferId, GpuError, Primitive, RenderBackend, COLORED_VERTEX_STRIDE};

use super::line_string::LineStringReplay;
use super::{issue_draw, visible_spans, FeatureRange, HitProbe, ReplayParams};
use crate::batch::VertexBatch;
use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::feature::{Feature, Stroke, Style};
use crate::geometry::{open_ring, Geometry};
use crate::triangulate::triangulate;

/// Batches filled polygons as one indexed triangle list plus a nested
/// [`LineStringReplay`] for outlines.
///
/// Fill color is per feature. Outline color and width are per batch: the last
/// stroke added wins at `finish`, and with no stroke in the whole batch the
/// outlines are dropped.
#[derive(Debug)]
pub struct PolygonReplay {
    origin: Coord,
    config: ReplayConfig,
    batch: VertexBatch,
    /// Index ranges of the bodies, one per feature.
    ranges: Vec<FeatureRange>,
    /// Outline vertex ranges, parallel to `ranges`.
    outline_ranges: Vec<Range<u32>>,
    outline: LineStringReplay,
    outline_stroke: Option<Stroke>,
    triangulations: usize,
    warned_unsupported: bool,
}

impl PolygonReplay {
    pub fn new(origin: Coord, config: &ReplayConfig) -> Self {
        Self {
            origin,
            config: config.clone(),
            batch: VertexBatch::new("strata-polygon-replay", COLORED_VERTEX_STRIDE),
            ranges: Vec::new(),
            outline_ranges: Vec::new(),
            outline: LineStringReplay::new(origin, config),
            outline_stroke: None,
            triangulations: 0,
            warned_unsupported: false,
        }
    }

    pub fn add(&mut self, feature: &Arc<Feature>, geometry: &Geometry, style: &Style) -> Result<(), ReplayError> {
        let polygons: Vec<&[Vec<Coord>]> = match geometry {
            Geometry::Polygon(rings) => vec![rings.as_slice()],
            Geometry::MultiPolygon(polygons) => polygons.iter().map(Vec::as_slice).collect(),
            _ => {
                if !self.warned_unsupported {
                    log::debug!("polygon replay ignores {:?} geometry", geometry.kind());
                    self.warned_unsupported = true;
                }
                return Ok(());
            }
        };
        if let Some(stroke) = style.stroke {
            self.outline_stroke = Some(stroke);
        }

        let start = self.batch.index_count();
        if let Some(fill) = style.fill {
            for rings in &polygons {
                self.push_body(feature, rings, fill.color)?;
            }
        }
        let end = self.batch.index_count();

        // Color is assigned batch-wide at finish.
        let rings: Vec<Vec<Coord>> = polygons
            .iter()
            .flat_map(|p| p.iter())
            .filter(|ring| {
                let open = open_ring(ring);
                open.len() >= 3 && open.iter().all(|c| c.is_finite())
            })
            .cloned()
            .collect();
        let outline = self.outline.add_rings(feature, &rings, Color::TRANSPARENT)?;

        if end > start || !outline.is_empty() {
            self.ranges.push(FeatureRange::new(feature, start, end));
            self.outline_ranges.push(outline);
        }
        Ok(())
    }

    /// Triangulates one ring set in the local frame and appends it.
    ///
    /// A ring set the triangulator rejects is skipped for this feature only.
    fn push_body(&mut self, feature: &Feature, rings: &[Vec<Coord>], color: Color) -> Result<(), ReplayError> {
        let mut local: Vec<Coord> = Vec::new();
        let mut hole_starts: Vec<usize> = Vec::new();
        for (k, ring) in rings.iter().enumerate() {
            let ring = open_ring(ring);
            if ring.len() < 3 || ring.iter().any(|c| !c.is_finite()) {
                if k == 0 {
                    log::debug!("feature {:?}: degenerate outer ring, body skipped", feature.id());
                    return Ok(());
                }
                continue;
            }
            if k > 0 {
                hole_starts.push(local.len());
            }
            local.extend(ring.iter().map(|&c| c - self.origin));
        }

        let mut indices = Vec::new();
        self.triangulations += 1;
        if let Err(err) = triangulate(&local, &hole_starts, &mut indices) {
            log::debug!("feature {:?}: {err}, body skipped", feature.id());
            return Ok(());
        }

        let base = self.batch.vertex_count();
        let [r, g, b, a] = color.to_array();
        for c in &local {
            self.batch.push_vertex(&[c.x as f32, c.y as f32, r, g, b, a])?;
        }
        let offset: Vec<u32> = indices.iter().map(|&i| i + base).collect();
        self.batch.push_indices(&offset)
    }

    pub fn finish(&mut self, backend: &mut dyn RenderBackend) -> Result<(), ReplayError> {
        match self.outline_stroke {
            Some(stroke) => {
                self.outline.set_color(stroke.color);
                self.outline.set_line_width(stroke.width);
            }
            None => {
                self.outline = LineStringReplay::new(self.origin, &self.config);
                for range in &mut self.outline_ranges {
                    *range = 0..0;
                }
            }
        }
        self.batch.finish(backend)?;
        self.outline.finish(backend)
    }

    pub fn replay(&self, backend: &mut dyn RenderBackend, params: &ReplayParams<'_>) {
        if let Some(buffers) = self.batch.buffers() {
            let uniforms = params.uniforms(self.origin, 1.0);
            for span in visible_spans(&self.ranges, self.batch.index_count(), params.skipped) {
                issue_draw(backend, Primitive::Triangles, buffers, span, uniforms, params);
            }
        }
        if self.outline.is_finished() {
            self.outline.replay(backend, params);
        }
    }

    pub fn replay_one_by_one<T>(
        &self,
        backend: &mut dyn RenderBackend,
        params: &ReplayParams<'_>,
        hit_extent: Option<Extent>,
        probe: &mut HitProbe<'_, T>,
    ) -> Result<Option<T>, GpuError> {
        let buffers = self.batch.buffers();
        let uniforms = params.uniforms(self.origin, 1.0);
        for (range, outline) in self.ranges.iter().zip(&self.outline_ranges).rev() {
            if !range.is_candidate(params.skipped, hit_extent) {
                continue;
            }
            backend.clear_target();
            if let Some(buffers) = buffers {
                issue_draw(backend, Primitive::Triangles, buffers, range.elements(), uniforms, params);
            }
            self.outline.draw_range(backend, params, outline.clone());
            if let Some(hit) = probe(backend, range)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    pub fn release_ids(&self) -> Vec<BufferId> {
        let mut ids = self.batch.release_ids();
        ids.extend(self.outline.release_ids());
        ids
    }

    pub fn feature_ranges(&self) -> &[FeatureRange] {
        &self.ranges
    }

    /// Ring sets handed to the triangulator so far.
    pub fn triangulation_count(&self) -> usize {
        self.triangulations
    }

    pub fn vertex_count(&self) -> u32 {
        self.batch.vertex_count()
    }

    pub fn index_count(&self) -> u32 {
        self.batch.index_count()
    }

    pub fn outline(&self) -> &LineStringReplay {
        &self.outline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureId;
    use strata_engine::render::testing::SoftwareBackend;

    fn c(x: f64, y: f64) -> Coord {
        Coord::new(x, y)
    }

    fn square_with_hole() -> Geometry {
        Geometry::Polygon(vec![
            vec![c(0.0, 0.0), c(4.0, 0.0), c(4.0, 4.0), c(0.0, 4.0), c(0.0, 0.0)],
            vec![c(1.0, 1.0), c(3.0, 1.0), c(2.0, 3.0), c(1.0, 1.0)],
        ])
    }

    fn add(replay: &mut PolygonReplay, id: u64, geometry: Geometry, style: Style) -> Arc<Feature> {
        let feature = Arc::new(Feature::new(FeatureId(id), geometry));
        replay.add(&feature, feature.geometry(), &style).unwrap();
        feature
    }

    #[test]
    fn square_with_triangular_hole_has_seven_vertices() {
        let mut replay = PolygonReplay::new(c(2.0, 2.0), &ReplayConfig::default());
        add(&mut replay, 1, square_with_hole(), Style::fill(Color::WHITE));

        assert_eq!(replay.vertex_count(), 7);
        assert_eq!(replay.index_count() % 3, 0);
        let triangles = replay.index_count() / 3;
        assert!(triangles >= 4, "got {triangles} triangles");
        assert_eq!(replay.triangulation_count(), 1);
    }

    #[test]
    fn vertices_are_stored_relative_to_origin() {
        let origin = c(1_000_000.0, 2_000_000.0);
        let mut replay = PolygonReplay::new(origin, &ReplayConfig::default());
        let ring = vec![origin, c(origin.x + 1.0, origin.y), c(origin.x, origin.y + 1.0)];
        add(&mut replay, 1, Geometry::Polygon(vec![ring]), Style::fill(Color::WHITE));

        let mut backend = SoftwareBackend::new();
        replay.finish(&mut backend).unwrap();
        let id = replay.batch.buffers().unwrap().vertex;
        let data = backend.vertex_data(id).unwrap();
        let xs: Vec<f32> = data.chunks_exact(COLORED_VERTEX_STRIDE).map(|v| v[0]).collect();
        assert!(xs.iter().all(|x| x.abs() <= 1.0));
    }

    #[test]
    fn degenerate_feature_is_skipped_and_batch_continues() {
        let mut replay = PolygonReplay::new(Coord::zero(), &ReplayConfig::default());
        add(
            &mut replay,
            1,
            Geometry::Polygon(vec![vec![c(0.0, 0.0), c(1.0, 1.0)]]),
            Style::fill(Color::WHITE),
        );
        add(&mut replay, 2, square_with_hole(), Style::fill(Color::WHITE));

        assert_eq!(replay.vertex_count(), 7);
        assert_eq!(replay.feature_ranges().len(), 1);
        assert_eq!(replay.feature_ranges()[0].id, FeatureId(2));
    }

    #[test]
    fn indices_are_offset_by_running_vertex_count() {
        let mut replay = PolygonReplay::new(Coord::zero(), &ReplayConfig::default());
        let tri = || Geometry::Polygon(vec![vec![c(0.0, 0.0), c(1.0, 0.0), c(0.0, 1.0)]]);
        add(&mut replay, 1, tri(), Style::fill(Color::WHITE));
        add(&mut replay, 2, tri(), Style::fill(Color::WHITE));

        assert_eq!(replay.feature_ranges()[1].elements(), 3..6);
        let mut backend = SoftwareBackend::new();
        replay.finish(&mut backend).unwrap();
        let (ib, _) = replay.batch.buffers().unwrap().index.unwrap();
        let indices = backend.index_data(ib).unwrap().0;
        assert!(indices[3..].iter().all(|&i| (3..6).contains(&i)));
    }

    #[test]
    fn multi_polygon_bodies_share_one_feature_range() {
        let mut replay = PolygonReplay::new(Coord::zero(), &ReplayConfig::default());
        let unit = |x: f64| vec![c(x, 0.0), c(x + 1.0, 0.0), c(x + 1.0, 1.0), c(x, 1.0)];
        add(
            &mut replay,
            5,
            Geometry::MultiPolygon(vec![vec![unit(0.0)], vec![unit(3.0)]]),
            Style::fill(Color::WHITE),
        );

        assert_eq!(replay.vertex_count(), 8);
        assert_eq!(replay.index_count(), 12);
        assert_eq!(replay.triangulation_count(), 2);
        assert_eq!(replay.feature_ranges().len(), 1);
        assert_eq!(replay.feature_ranges()[0].elements(), 0..12);
    }

    // ── outlines ──────────────────────────────────────────────────────────

    #[test]
    fn non_finite_ring_is_left_out_of_the_outline() {
        let mut replay = PolygonReplay::new(Coord::zero(), &ReplayConfig::default());
        let outer = vec![c(0.0, 0.0), c(4.0, 0.0), c(4.0, 4.0), c(0.0, 4.0)];
        let hole = vec![c(1.0, 1.0), c(f64::NAN, 1.0), c(2.0, 3.0)];
        add(
            &mut replay,
            1,
            Geometry::Polygon(vec![outer, hole]),
            Style::fill(Color::WHITE).with_stroke(Color::BLACK, 1.0),
        );
        assert_eq!(replay.outline().vertex_count(), 8, "outer ring edges only");

        let mut backend = SoftwareBackend::new();
        replay.finish(&mut backend).unwrap();
        for id in replay.release_ids() {
            if let Some(data) = backend.vertex_data(id) {
                assert!(data.iter().all(|v| v.is_finite()));
            }
        }
    }

    #[test]
    fn last_stroke_colors_every_outline() {
        let mut replay = PolygonReplay::new(Coord::zero(), &ReplayConfig::default());
        let red = Color::new(1.0, 0.0, 0.0, 1.0);
        let blue = Color::new(0.0, 0.0, 1.0, 1.0);
        add(&mut replay, 1, square_with_hole(), Style::fill(Color::WHITE).with_stroke(red, 2.0));
        add(&mut replay, 2, square_with_hole(), Style::stroke(blue, 4.0));

        let mut backend = SoftwareBackend::new();
        replay.finish(&mut backend).unwrap();
        assert_eq!(replay.outline().line_width(), 4.0);
        let id = replay.outline().release_ids()[0];
        for record in backend.vertex_data(id).unwrap().chunks_exact(COLORED_VERTEX_STRIDE) {
            assert_eq!(&record[2..], &blue.to_array());
        }
    }

    #[test]
    fn outlines_dropped_without_any_stroke() {
        let mut replay = PolygonReplay::new(Coord::zero(), &ReplayConfig::default());
        add(&mut replay, 1, square_with_hole(), Style::fill(Color::WHITE));

        let mut backend = SoftwareBackend::new();
        replay.finish(&mut backend).unwrap();
        assert!(replay.outline().release_ids().is_empty());
        assert_eq!(backend.upload_count(), 2, "body vertices and indices only");
    }

    #[test]
    fn replay_draws_body_then_outline() {
        let mut replay = PolygonReplay::new(Coord::zero(), &ReplayConfig::default());
        add(&mut replay, 1, square_with_hole(), Style::fill(Color::WHITE).with_stroke(Color::BLACK, 1.0));
        let mut backend = SoftwareBackend::new();
        replay.finish(&mut backend).unwrap();

        let skipped = Default::default();
        let params = ReplayParams {
            frame_transform: strata_engine::coords::Transform2D::identity(),
            viewport_px: [256.0, 256.0],
            pixel_ratio: 1.0,
            opacity: 1.0,
            skipped: &skipped,
            blend: strata_engine::render::BlendMode::Alpha,
            scissor: None,
        };
        replay.replay(&mut backend, &params);
        let primitives: Vec<Primitive> = backend.frame_draws().map(|d| d.primitive).collect();
        assert_eq!(primitives, vec![Primitive::Triangles, Primitive::Segments]);
    }
}
