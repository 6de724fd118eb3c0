//! Features and their styling.

use core::cmp::Ordering;
use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use strata_engine::coords::Extent;
use strata_engine::paint::Color;

use crate::geometry::Geometry;

/// Stable unique feature identity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FeatureId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Fill {
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Stroke {
    pub color: Color,
    /// Width in CSS pixels. Polygon outlines use one width for the whole batch.
    pub width: f32,
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Style {
    pub fill: Option<Fill>,
    pub stroke: Option<Stroke>,
}

impl Style {
    #[inline]
    pub fn fill(color: Color) -> Self {
        Self {
            fill: Some(Fill { color }),
            stroke: None,
        }
    }

    #[inline]
    pub fn stroke(color: Color, width: f32) -> Self {
        Self {
            fill: None,
            stroke: Some(Stroke { color, width }),
        }
    }

    #[inline]
    pub fn with_stroke(self, color: Color, width: f32) -> Self {
        Self {
            stroke: Some(Stroke { color, width }),
            ..self
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fill.is_none() && self.stroke.is_none()
    }
}

/// Resolves the styles of a feature at a view resolution.
pub type StyleFunction = Arc<dyn Fn(&Feature, f64) -> Vec<Style> + Send + Sync>;

/// Either fixed styles or a function evaluated per feature and resolution.
#[derive(Clone)]
pub enum StyleSource {
    Static(Vec<Style>),
    Function(StyleFunction),
}

impl StyleSource {
    pub fn function(f: impl Fn(&Feature, f64) -> Vec<Style> + Send + Sync + 'static) -> Self {
        StyleSource::Function(Arc::new(f))
    }

    pub fn resolve(&self, feature: &Feature, resolution: f64) -> Vec<Style> {
        match self {
            StyleSource::Static(styles) => styles.clone(),
            StyleSource::Function(f) => f(feature, resolution),
        }
    }
}

impl From<Style> for StyleSource {
    fn from(style: Style) -> Self {
        StyleSource::Static(vec![style])
    }
}

impl fmt::Debug for StyleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleSource::Static(styles) => f.debug_tuple("Static").field(styles).finish(),
            StyleSource::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A feature: identity, geometry, and an optional feature-level style.
///
/// Tiles own features as `Arc<Feature>`; replays only keep weak references.
#[derive(Debug, Clone)]
pub struct Feature {
    id: FeatureId,
    geometry: Geometry,
    style: Option<StyleSource>,
    extent: Extent,
}

impl Feature {
    pub fn new(id: FeatureId, geometry: Geometry) -> Self {
        let extent = geometry.extent();
        Self {
            id,
            geometry,
            style: None,
            extent,
        }
    }

    pub fn with_style(mut self, style: impl Into<StyleSource>) -> Self {
        self.style = Some(style.into());
        self
    }

    #[inline]
    pub fn id(&self) -> FeatureId {
        self.id
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn style(&self) -> Option<&StyleSource> {
        self.style.as_ref()
    }

    #[inline]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Feature style first, else `layer_default`. Neither yields no styles.
    pub fn resolve_styles(&self, layer_default: Option<&StyleSource>, resolution: f64) -> Vec<Style> {
        match self.style.as_ref().or(layer_default) {
            Some(source) => source.resolve(self, resolution),
            None => Vec::new(),
        }
    }
}

static NEXT_RENDER_ORDER_ID: AtomicU64 = AtomicU64::new(1);

/// Comparator ordering features inside a tile batch.
///
/// Two render orders are equal only if they are the same instance (or a clone
/// of it); the id serves as the render-order stamp for cached batches.
#[derive(Clone)]
pub struct RenderOrder {
    id: u64,
    compare: Arc<dyn Fn(&Feature, &Feature) -> Ordering + Send + Sync>,
}

impl RenderOrder {
    pub fn new(compare: impl Fn(&Feature, &Feature) -> Ordering + Send + Sync + 'static) -> Self {
        Self {
            id: NEXT_RENDER_ORDER_ID.fetch_add(1, AtomicOrdering::Relaxed),
            compare: Arc::new(compare),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn compare(&self, a: &Feature, b: &Feature) -> Ordering {
        (self.compare)(a, b)
    }
}

impl PartialEq for RenderOrder {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for RenderOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOrder").field("id", &self.id).finish_non_exhaustive()
    }
}
