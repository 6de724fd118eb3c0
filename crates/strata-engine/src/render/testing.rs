//! CPU stand-in for the GPU, for tests that must run without an adapter.
//!
//! `SoftwareBackend` keeps uploaded buffer contents, records every draw, and
//! rasterizes the 1x1 hit target by sampling the center of the viewport
//! (clip-space origin):
//! - triangles: inclusive point-in-triangle test
//! - segments: distance to the segment within half the line width
//! - points: inside the half-size square
//!
//! Coverage blends the premultiplied vertex color with the draw's blend mode so
//! readbacks behave like the real hit target.

use slotmap::SlotMap;

use super::{
    BlendMode, BufferId, DrawCall, GpuError, IndexData, IndexWidth, Primitive, RenderBackend,
};

#[derive(Debug, Clone)]
enum SoftBuffer {
    Vertices(Vec<f32>),
    Indices(Vec<u32>, IndexWidth),
}

/// Where a recorded draw was sent.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DrawTarget {
    Frame,
    Hit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub target: DrawTarget,
    pub call: DrawCall,
}

#[derive(Debug)]
pub struct SoftwareBackend {
    wide_indices: bool,
    buffers: SlotMap<BufferId, SoftBuffer>,
    draws: Vec<RecordedDraw>,
    uploads: usize,
    releases: usize,
    hit_bound: bool,
    hit_pixel: [f32; 4],
    hit_clears: usize,
    hit_reads: usize,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::with_wide_indices(true)
    }

    pub fn with_wide_indices(wide_indices: bool) -> Self {
        Self {
            wide_indices,
            buffers: SlotMap::with_key(),
            draws: Vec::new(),
            uploads: 0,
            releases: 0,
            hit_bound: false,
            hit_pixel: [0.0; 4],
            hit_clears: 0,
            hit_reads: 0,
        }
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn frame_draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.draws
            .iter()
            .filter(|d| d.target == DrawTarget::Frame)
            .map(|d| &d.call)
    }

    pub fn clear_log(&mut self) {
        self.draws.clear();
    }

    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    pub fn release_count(&self) -> usize {
        self.releases
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn hit_clears(&self) -> usize {
        self.hit_clears
    }

    pub fn hit_reads(&self) -> usize {
        self.hit_reads
    }

    pub fn is_live(&self, id: BufferId) -> bool {
        self.buffers.contains_key(id)
    }

    pub fn vertex_data(&self, id: BufferId) -> Option<&[f32]> {
        match self.buffers.get(id)? {
            SoftBuffer::Vertices(v) => Some(v),
            SoftBuffer::Indices(..) => None,
        }
    }

    pub fn index_data(&self, id: BufferId) -> Option<(&[u32], IndexWidth)> {
        match self.buffers.get(id)? {
            SoftBuffer::Indices(i, width) => Some((i, *width)),
            SoftBuffer::Vertices(_) => None,
        }
    }

    fn rasterize(&mut self, call: &DrawCall) {
        let Some(vertices) = self.vertex_data(call.vertex_buffer) else { return };
        let stride = call.primitive.vertex_stride();
        let u = &call.uniforms;
        let vertex = |i: u32| -> Option<([f32; 2], [f32; 4], f32)> {
            let base = i as usize * stride;
            let v = vertices.get(base..base + stride)?;
            let size = if stride > 6 { v[6] } else { 0.0 };
            Some((u.to_clip(v[0], v[1]), [v[2], v[3], v[4], v[5]], size))
        };
        // Clip units per pixel along each axis.
        let px = [2.0 / u.viewport_px[0], 2.0 / u.viewport_px[1]];

        let mut coverage: Vec<[f32; 4]> = Vec::new();
        match call.primitive {
            Primitive::Triangles => {
                let Some((index_buffer, _)) = call.index_buffer else { return };
                let Some((indices, _)) = self.index_data(index_buffer) else { return };
                let start = call.elements.start as usize;
                let end = (call.elements.end as usize).min(indices.len());
                for tri in indices.get(start..end).unwrap_or(&[]).chunks_exact(3) {
                    let (Some(a), Some(b), Some(c)) =
                        (vertex(tri[0]), vertex(tri[1]), vertex(tri[2]))
                    else {
                        continue;
                    };
                    if triangle_covers_origin(a.0, b.0, c.0) {
                        coverage.push(a.1);
                    }
                }
            }
            Primitive::Segments => {
                let half = 0.5 * u.line_width * u.pixel_ratio;
                let mut i = call.elements.start;
                while i + 1 < call.elements.end {
                    if let (Some(a), Some(b)) = (vertex(i), vertex(i + 1)) {
                        let pa = [a.0[0] / px[0], a.0[1] / px[1]];
                        let pb = [b.0[0] / px[0], b.0[1] / px[1]];
                        if distance_to_segment(pa, pb) <= half {
                            coverage.push(a.1);
                        }
                    }
                    i += 2;
                }
            }
            Primitive::Points => {
                for i in call.elements.clone() {
                    let Some((clip, color, size)) = vertex(i) else { continue };
                    let half = 0.5 * size * u.pixel_ratio;
                    if (clip[0] / px[0]).abs() <= half && (clip[1] / px[1]).abs() <= half {
                        coverage.push(color);
                    }
                }
            }
        }

        for color in coverage {
            let a = color[3] * u.opacity;
            let src = [color[0] * a, color[1] * a, color[2] * a, a];
            let dst = self.hit_pixel;
            self.hit_pixel = match call.blend {
                BlendMode::Additive => core::array::from_fn(|k| (src[k] + dst[k]).min(1.0)),
                BlendMode::Alpha => core::array::from_fn(|k| src[k] + dst[k] * (1.0 - a)),
            };
        }
    }
}

fn triangle_covers_origin(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> bool {
    let edge = |p: [f32; 2], q: [f32; 2]| (q[0] - p[0]) * (0.0 - p[1]) - (q[1] - p[1]) * (0.0 - p[0]);
    let d0 = edge(a, b);
    let d1 = edge(b, c);
    let d2 = edge(c, a);
    let has_neg = d0 < 0.0 || d1 < 0.0 || d2 < 0.0;
    let has_pos = d0 > 0.0 || d1 > 0.0 || d2 > 0.0;
    !(has_neg && has_pos)
}

fn distance_to_segment(a: [f32; 2], b: [f32; 2]) -> f32 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let len2 = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if len2 > 0.0 {
        ((-a[0]) * ab[0] + (-a[1]) * ab[1]) / len2
    } else {
        0.0
    }
    .clamp(0.0, 1.0);
    let closest = [a[0] + ab[0] * t, a[1] + ab[1] * t];
    (closest[0] * closest[0] + closest[1] * closest[1]).sqrt()
}

impl RenderBackend for SoftwareBackend {
    fn supports_wide_indices(&self) -> bool {
        self.wide_indices
    }

    fn create_vertex_buffer(&mut self, _label: &str, data: &[f32]) -> Result<BufferId, GpuError> {
        self.uploads += 1;
        Ok(self.buffers.insert(SoftBuffer::Vertices(data.to_vec())))
    }

    fn create_index_buffer(
        &mut self,
        _label: &str,
        data: IndexData<'_>,
    ) -> Result<BufferId, GpuError> {
        let (indices, width) = match data {
            IndexData::U16(d) => (d.iter().map(|&i| i as u32).collect(), IndexWidth::U16),
            IndexData::U32(d) => {
                if !self.wide_indices {
                    return Err(GpuError::WideIndicesUnsupported);
                }
                (d.to_vec(), IndexWidth::U32)
            }
        };
        self.uploads += 1;
        Ok(self.buffers.insert(SoftBuffer::Indices(indices, width)))
    }

    fn release_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(id).is_some() {
            self.releases += 1;
        }
    }

    fn bind_hit_target(&mut self) -> Result<(), GpuError> {
        self.hit_bound = true;
        Ok(())
    }

    fn unbind_hit_target(&mut self) {
        self.hit_bound = false;
    }

    fn clear_target(&mut self) {
        if self.hit_bound {
            self.hit_pixel = [0.0; 4];
            self.hit_clears += 1;
        }
    }

    fn draw(&mut self, call: &DrawCall) {
        let target = if self.hit_bound { DrawTarget::Hit } else { DrawTarget::Frame };
        self.draws.push(RecordedDraw {
            target,
            call: call.clone(),
        });
        if self.hit_bound {
            self.rasterize(call);
        }
    }

    fn read_pixel(&mut self) -> Result<[u8; 4], GpuError> {
        if !self.hit_bound {
            return Err(GpuError::HitTargetNotBound);
        }
        self.hit_reads += 1;
        Ok(self.hit_pixel.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
    }
}
