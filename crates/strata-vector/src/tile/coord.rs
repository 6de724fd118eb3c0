use std::fmt;

/// Tile address: zoom level plus column and row. Rows grow downwards from the
/// grid origin.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TileCoord {
    pub z: u32,
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    #[inline]
    pub const fn new(z: u32, x: i32, y: i32) -> Self {
        Self { z, x, y }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Inclusive rectangle of tile columns and rows at one zoom level.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TileRange {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl TileRange {
    #[inline]
    pub const fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_y <= y && y <= self.max_y
    }

    #[inline]
    pub fn contains_coord(&self, coord: TileCoord) -> bool {
        self.contains(coord.x, coord.y)
    }

    pub fn contains_range(&self, other: &TileRange) -> bool {
        self.min_x <= other.min_x && other.max_x <= self.max_x && self.min_y <= other.min_y && other.max_y <= self.max_y
    }

    pub fn intersects(&self, other: &TileRange) -> bool {
        self.min_x <= other.max_x && self.max_x >= other.min_x && self.min_y <= other.max_y && self.max_y >= other.min_y
    }

    /// Intersection, or `None` when disjoint.
    pub fn intersection(&self, other: &TileRange) -> Option<TileRange> {
        self.intersects(other).then(|| TileRange {
            min_x: self.min_x.max(other.min_x),
            max_x: self.max_x.min(other.max_x),
            min_y: self.min_y.max(other.min_y),
            max_y: self.max_y.min(other.max_y),
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x + 1).max(0) as u32
    }

    #[inline]
    pub fn height(&self) -> u32 {
        (self.max_y - self.min_y + 1).max(0) as u32
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Grows the range to include column `x`, row `y`.
    pub fn extend(&mut self, x: i32, y: i32) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    /// Row-major iteration over `(x, y)`.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + use<> {
        let TileRange { min_x, max_x, min_y, max_y } = *self;
        (min_y..=max_y).flat_map(move |y| (min_x..=max_x).map(move |x| (x, y)))
    }

    /// Tile coordinates of this range at zoom `z`.
    pub fn coords(&self, z: u32) -> impl Iterator<Item = TileCoord> + use<> {
        self.iter().map(move |(x, y)| TileCoord::new(z, x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_relations() {
        let outer = TileRange::new(0, 3, 0, 3);
        let inner = TileRange::new(1, 2, 1, 2);
        let far = TileRange::new(5, 6, 0, 0);
        assert!(outer.contains_range(&inner));
        assert!(!inner.contains_range(&outer));
        assert!(outer.intersects(&inner));
        assert!(!outer.intersects(&far));
        assert_eq!(outer.intersection(&TileRange::new(2, 9, -1, 1)), Some(TileRange::new(2, 3, 0, 1)));
        assert_eq!(outer.count(), 16);
    }

    #[test]
    fn iter_is_row_major_and_inclusive() {
        let cells: Vec<_> = TileRange::new(1, 2, 5, 6).iter().collect();
        assert_eq!(cells, vec![(1, 5), (2, 5), (1, 6), (2, 6)]);
    }

    #[test]
    fn extend_grows_to_include() {
        let mut range = TileRange::new(2, 2, 2, 2);
        range.extend(0, 4);
        assert_eq!(range, TileRange::new(0, 2, 2, 4));
        assert_eq!(TileCoord::new(3, 1, 2).to_string(), "3/1/2");
    }
}
