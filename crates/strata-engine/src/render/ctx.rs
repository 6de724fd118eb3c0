use crate::coords::Viewport;
use crate::device::OffscreenTarget;

/// What a frame pass needs to know about its color target.
///
/// The backend owns device and queue; the format selects the pipeline variant.
#[derive(Debug, Copy, Clone)]
pub struct RenderCtx {
    pub target_format: wgpu::TextureFormat,
    pub viewport: Viewport, // physical px
}

impl RenderCtx {
    #[inline]
    pub fn new(target_format: wgpu::TextureFormat, viewport: Viewport) -> Self {
        Self { target_format, viewport }
    }

    /// Context covering the whole of `target`.
    pub fn for_offscreen(target: &OffscreenTarget, target_format: wgpu::TextureFormat) -> Self {
        Self::new(target_format, Viewport::new(target.width as f32, target.height as f32))
    }
}

/// Encoder plus the view frame draws are recorded into.
pub struct RenderTarget<'a> {
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub color_view: &'a wgpu::TextureView,
}

impl<'a> RenderTarget<'a> {
    #[inline]
    pub fn new(encoder: &'a mut wgpu::CommandEncoder, color_view: &'a wgpu::TextureView) -> Self {
        Self { encoder, color_view }
    }
}
