//! Color model shared between styles and renderers.
//!
//! Colors are straight (non-premultiplied) RGBA in `[0, 1]`. The fragment stage
//! premultiplies before blending.

pub mod color;

pub use color::Color;
