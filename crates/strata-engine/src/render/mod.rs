//! GPU rendering subsystem.
//!
//! Batches talk to the GPU only through [`RenderBackend`]. The wgpu
//! implementation owns pipelines and a generational buffer arena; the software
//! implementation (feature `test-helpers`) stands in for it in tests.
//!
//! Convention:
//! - Vertex positions are f32 in a batch-local frame near the origin.
//! - A per-draw f32 matrix (composed in f64) maps them to clip space.

mod backend;
mod ctx;
mod error;
mod pipeline;
mod release;
mod wgpu_backend;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use backend::{
    BlendMode, BufferId, DrawCall, DrawUniforms, IndexData, IndexWidth, Primitive, RenderBackend,
    ScissorRect, COLORED_VERTEX_STRIDE, POINT_VERTEX_STRIDE,
};
pub use ctx::{RenderCtx, RenderTarget};
pub use error::GpuError;
pub use release::{ReleaseFn, ReleaseQueue};
pub use wgpu_backend::WgpuBackend;
