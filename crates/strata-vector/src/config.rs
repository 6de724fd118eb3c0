/// Batch-wide rendering constants.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    /// Line width in CSS pixels for every segment in the batch.
    pub line_width: f32,

    /// Point sprite size in CSS pixels, written into each point vertex.
    pub point_size: f32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            point_size: 6.0,
        }
    }
}

/// Options for a vector tile layer renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerOptions {
    /// When `true`, an `Error` tile is not drawable and is substituted by
    /// ancestors/descendants like a loading tile. When `false` it is drawn as
    /// an empty terminal tile.
    pub use_interim_tiles_on_error: bool,

    /// Hit detection tolerance in CSS pixels around the probed coordinate.
    pub hit_tolerance: f32,

    /// Margin in CSS pixels added around the probed coordinate when picking
    /// hit candidates. Must cover the largest point sprite or line half-width;
    /// the pixel readback decides the actual hit.
    pub render_buffer: f32,

    pub replay: ReplayConfig,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            use_interim_tiles_on_error: true,
            hit_tolerance: 0.0,
            render_buffer: 100.0,
            replay: ReplayConfig::default(),
        }
    }
}
