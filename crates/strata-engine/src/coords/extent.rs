use super::Coord;

/// Axis-aligned bounding box in map units, inclusive on all edges.
///
/// An extent with `max < min` on either axis is empty. [`Extent::empty`] is the
/// identity for [`Extent::extend_coord`] and [`Extent::extend`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Self::empty()
    }
}

impl Extent {
    #[inline]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    #[inline]
    pub const fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// Smallest extent containing every coordinate; empty for no coordinates.
    pub fn from_coords<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> Self {
        let mut extent = Self::empty();
        for c in coords {
            extent.extend_coord(*c);
        }
        extent
    }

    /// Extent of `size` pixels centered at `center`, at `resolution` map units per pixel.
    pub fn around(center: Coord, resolution: f64, size: [f64; 2]) -> Self {
        let dx = resolution * size[0] / 2.0;
        let dy = resolution * size[1] / 2.0;
        Self::new(center.x - dx, center.y - dy, center.x + dx, center.y + dy)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    /// True for a non-empty extent with positive width and height.
    #[inline]
    pub fn has_area(self) -> bool {
        self.max_x > self.min_x && self.max_y > self.min_y
    }

    #[inline]
    pub fn width(self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(self) -> f64 {
        self.max_y - self.min_y
    }

    #[inline]
    pub fn area(self) -> f64 {
        if self.is_empty() { 0.0 } else { self.width() * self.height() }
    }

    #[inline]
    pub fn center(self) -> Coord {
        Coord::new((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    #[inline]
    pub fn top_left(self) -> Coord {
        Coord::new(self.min_x, self.max_y)
    }

    #[inline]
    pub fn contains_coord(self, c: Coord) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }

    #[inline]
    pub fn contains_extent(self, other: Extent) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Closed intersection test: touching edges intersect.
    #[inline]
    pub fn intersects(self, other: Extent) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn intersection(self, other: Extent) -> Extent {
        if !self.intersects(other) {
            return Extent::empty();
        }
        Extent::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        )
    }

    #[inline]
    pub fn extend_coord(&mut self, c: Coord) {
        self.min_x = self.min_x.min(c.x);
        self.min_y = self.min_y.min(c.y);
        self.max_x = self.max_x.max(c.x);
        self.max_y = self.max_y.max(c.y);
    }

    #[inline]
    pub fn extend(&mut self, other: Extent) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Grows the extent by `amount` on every side.
    #[inline]
    pub fn buffered(self, amount: f64) -> Extent {
        Extent::new(
            self.min_x - amount,
            self.min_y - amount,
            self.max_x + amount,
            self.max_y + amount,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Extent {
        Extent::new(min_x, min_y, max_x, max_y)
    }

    // ── emptiness ─────────────────────────────────────────────────────────

    #[test]
    fn empty_extent_is_empty() {
        assert!(Extent::empty().is_empty());
        assert_eq!(Extent::empty().area(), 0.0);
    }

    #[test]
    fn degenerate_extent_is_not_empty_but_has_no_area() {
        let point = e(1.0, 1.0, 1.0, 1.0);
        assert!(!point.is_empty());
        assert!(!point.has_area());
    }

    #[test]
    fn from_coords_bounds_all_points() {
        let coords = [Coord::new(3.0, -1.0), Coord::new(-2.0, 4.0), Coord::new(0.0, 0.0)];
        assert_eq!(Extent::from_coords(&coords), e(-2.0, -1.0, 3.0, 4.0));
    }

    // ── containment ───────────────────────────────────────────────────────

    #[test]
    fn contains_coord_is_inclusive() {
        let ext = e(0.0, 0.0, 10.0, 10.0);
        assert!(ext.contains_coord(Coord::new(0.0, 0.0)));
        assert!(ext.contains_coord(Coord::new(10.0, 10.0)));
        assert!(!ext.contains_coord(Coord::new(10.1, 5.0)));
    }

    #[test]
    fn contains_extent_nested() {
        let outer = e(0.0, 0.0, 100.0, 100.0);
        assert!(outer.contains_extent(e(10.0, 10.0, 20.0, 20.0)));
        assert!(!outer.contains_extent(e(90.0, 90.0, 110.0, 95.0)));
    }

    // ── intersection ──────────────────────────────────────────────────────

    #[test]
    fn touching_edges_intersect() {
        let a = e(0.0, 0.0, 10.0, 10.0);
        let b = e(10.0, 0.0, 20.0, 10.0);
        assert!(a.intersects(b));
        assert!(!a.intersection(b).has_area());
    }

    #[test]
    fn intersection_of_overlapping() {
        let a = e(0.0, 0.0, 10.0, 10.0);
        let b = e(5.0, 5.0, 15.0, 15.0);
        assert_eq!(a.intersection(b), e(5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = e(0.0, 0.0, 5.0, 5.0);
        let b = e(20.0, 20.0, 25.0, 25.0);
        assert!(!a.intersects(b));
        assert!(a.intersection(b).is_empty());
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn around_centers_on_coordinate() {
        let ext = Extent::around(Coord::new(100.0, 50.0), 2.0, [10.0, 4.0]);
        assert_eq!(ext, e(90.0, 46.0, 110.0, 54.0));
        assert_eq!(ext.center(), Coord::new(100.0, 50.0));
    }

    #[test]
    fn buffered_grows_every_side() {
        assert_eq!(e(0.0, 0.0, 1.0, 1.0).buffered(0.5), e(-0.5, -0.5, 1.5, 1.5));
    }
}
