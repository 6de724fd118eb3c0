use crate::feature::{RenderOrder, StyleSource};

/// Layer attributes the renderer reads each frame.
///
/// Changing the style or the render order bumps the revision, which
/// invalidates every cached tile batch of the layer.
#[derive(Debug, Clone)]
pub struct LayerProperties {
    style: Option<StyleSource>,
    render_order: Option<RenderOrder>,
    opacity: f32,
    revision: u64,
}

impl Default for LayerProperties {
    fn default() -> Self {
        Self {
            style: None,
            render_order: None,
            opacity: 1.0,
            revision: 0,
        }
    }
}

impl LayerProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style(mut self, style: impl Into<StyleSource>) -> Self {
        self.set_style(Some(style.into()));
        self
    }

    #[inline]
    pub fn style(&self) -> Option<&StyleSource> {
        self.style.as_ref()
    }

    pub fn set_style(&mut self, style: Option<StyleSource>) {
        self.style = style;
        self.changed();
    }

    #[inline]
    pub fn render_order(&self) -> Option<&RenderOrder> {
        self.render_order.as_ref()
    }

    pub fn set_render_order(&mut self, render_order: Option<RenderOrder>) {
        self.render_order = render_order;
        self.changed();
    }

    #[inline]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Opacity is a draw parameter; cached batches stay valid.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Marks layer content as changed.
    pub fn changed(&mut self) {
        self.revision += 1;
    }
}
