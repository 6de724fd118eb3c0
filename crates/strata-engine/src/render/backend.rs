//! Backend contract between batch compilers and the GPU.
//!
//! Replays only ever talk to a `RenderBackend`: they upload packed buffers once,
//! issue `DrawCall`s, and, for hit detection, drive the 1x1 offscreen target.
//! The trait is object safe so deferred release closures can take
//! `&mut dyn RenderBackend`.

use core::ops::Range;

use bytemuck::{Pod, Zeroable};

use super::GpuError;

slotmap::new_key_type! {
    /// Generational handle to a GPU buffer owned by a backend arena.
    ///
    /// A released id is stale forever; it never aliases a newer buffer.
    pub struct BufferId;
}

/// Floats per vertex for `Triangles` and `Segments`: `x, y, r, g, b, a`.
pub const COLORED_VERTEX_STRIDE: usize = 6;

/// Floats per vertex for `Points`: `x, y, r, g, b, a, size`.
pub const POINT_VERTEX_STRIDE: usize = 7;

/// Primitive assembly for a draw call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Primitive {
    /// Indexed triangle list; `elements` is a range into the index buffer.
    Triangles,
    /// Independent line segments, two consecutive vertices each; `elements` is a
    /// vertex range. Drawn `line_width` pixels wide.
    Segments,
    /// One square sprite per vertex; `elements` is a vertex range. The size comes
    /// from the vertex.
    Points,
}

impl Primitive {
    #[inline]
    pub const fn vertex_stride(self) -> usize {
        match self {
            Primitive::Triangles | Primitive::Segments => COLORED_VERTEX_STRIDE,
            Primitive::Points => POINT_VERTEX_STRIDE,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendMode {
    /// Premultiplied source-over.
    Alpha,
    /// `src + dst`; any covered pixel ends up non-zero regardless of color.
    Additive,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    #[inline]
    pub const fn max_index(self) -> u32 {
        match self {
            IndexWidth::U16 => u16::MAX as u32,
            IndexWidth::U32 => u32::MAX,
        }
    }

    #[inline]
    pub const fn wgpu_format(self) -> wgpu::IndexFormat {
        match self {
            IndexWidth::U16 => wgpu::IndexFormat::Uint16,
            IndexWidth::U32 => wgpu::IndexFormat::Uint32,
        }
    }
}

/// Index payload for [`RenderBackend::create_index_buffer`].
#[derive(Debug, Copy, Clone)]
pub enum IndexData<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    #[inline]
    pub fn width(&self) -> IndexWidth {
        match self {
            IndexData::U16(_) => IndexWidth::U16,
            IndexData::U32(_) => IndexWidth::U32,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            IndexData::U16(d) => d.len(),
            IndexData::U32(d) => d.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(d) => bytemuck::cast_slice(d),
            IndexData::U32(d) => bytemuck::cast_slice(d),
        }
    }
}

/// Scissor rect in physical pixels.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Per-draw uniform block. Layout matches `Uniforms` in `shaders/vector.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    /// Local vertex position to clip space, column-major.
    pub transform: [[f32; 4]; 4],
    /// Target size in pixels.
    pub viewport_px: [f32; 2],
    pub opacity: f32,
    pub line_width: f32,
    pub pixel_ratio: f32,
    pub _pad: [f32; 3], // 16-byte alignment
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            transform: crate::coords::Transform2D::identity().to_mat4_f32(),
            viewport_px: [1.0, 1.0],
            opacity: 1.0,
            line_width: 1.0,
            pixel_ratio: 1.0,
            _pad: [0.0; 3],
        }
    }
}

impl DrawUniforms {
    /// Maps a local vertex position to clip space, as the vertex stage does.
    #[inline]
    pub fn to_clip(&self, x: f32, y: f32) -> [f32; 2] {
        let m = &self.transform;
        [
            m[0][0] * x + m[1][0] * y + m[3][0],
            m[0][1] * x + m[1][1] * y + m[3][1],
        ]
    }
}

/// A single draw against the currently bound target.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub primitive: Primitive,
    pub vertex_buffer: BufferId,
    pub index_buffer: Option<(BufferId, IndexWidth)>,
    pub elements: Range<u32>,
    pub uniforms: DrawUniforms,
    pub blend: BlendMode,
    /// `None` draws to the whole target.
    pub scissor: Option<ScissorRect>,
}

/// GPU operations a batch needs.
///
/// Draws go to the frame target unless the hit target is bound. Rendering is
/// single-threaded and frame-synchronous; no method may be called re-entrantly.
pub trait RenderBackend {
    /// Whether 32-bit index buffers may be created.
    fn supports_wide_indices(&self) -> bool;

    fn create_vertex_buffer(&mut self, label: &str, data: &[f32]) -> Result<BufferId, GpuError>;

    fn create_index_buffer(&mut self, label: &str, data: IndexData<'_>)
        -> Result<BufferId, GpuError>;

    /// Frees the buffer. Stale ids are ignored.
    fn release_buffer(&mut self, id: BufferId);

    /// Routes subsequent clears, draws, and reads to the 1x1 hit target.
    fn bind_hit_target(&mut self) -> Result<(), GpuError>;

    /// Routes subsequent draws back to the frame target.
    fn unbind_hit_target(&mut self);

    /// Clears the bound target to transparent black.
    fn clear_target(&mut self);

    fn draw(&mut self, call: &DrawCall);

    /// Reads back the single hit-target pixel as RGBA8.
    fn read_pixel(&mut self) -> Result<[u8; 4], GpuError>;
}
