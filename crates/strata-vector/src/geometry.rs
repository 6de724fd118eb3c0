//! Vector geometry model.
//!
//! Geometries are immutable once they reach a replay. Polygon rings are listed
//! outer ring first, holes after; a ring may or may not repeat its first point
//! at the end.

use strata_engine::coords::{Coord, Extent};

use crate::replay::ReplayKind;

/// A polygon as an ordered ring set.
pub type Rings = Vec<Vec<Coord>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Rings),
    MultiPolygon(Vec<Rings>),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// The replay that batches this geometry.
    pub fn replay_kind(&self) -> ReplayKind {
        match self.kind() {
            GeometryKind::Point | GeometryKind::MultiPoint => ReplayKind::Point,
            GeometryKind::LineString | GeometryKind::MultiLineString => ReplayKind::LineString,
            GeometryKind::Polygon | GeometryKind::MultiPolygon => ReplayKind::Polygon,
        }
    }

    /// Visits every coordinate in storage order.
    pub fn for_each_coord(&self, mut f: impl FnMut(Coord)) {
        match self {
            Geometry::Point(c) => f(*c),
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => cs.iter().copied().for_each(f),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().copied().for_each(f)
            }
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().flatten().flatten().copied().for_each(f)
            }
        }
    }

    pub fn extent(&self) -> Extent {
        let mut extent = Extent::empty();
        self.for_each_coord(|c| extent.extend_coord(c));
        extent
    }
}

/// Drops the closing point of a ring that repeats its first point.
pub fn open_ring(ring: &[Coord]) -> &[Coord] {
    match ring {
        [first, .., last] if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

/// Shoelace area; positive for counter-clockwise rings (+Y up).
pub fn signed_ring_area(ring: &[Coord]) -> f64 {
    let ring = open_ring(ring);
    if ring.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        twice += a.cross(b);
    }
    twice / 2.0
}

/// Outer ring area minus hole areas.
pub fn polygon_area(rings: &[Vec<Coord>]) -> f64 {
    let mut iter = rings.iter();
    let Some(outer) = iter.next() else { return 0.0 };
    let holes: f64 = iter.map(|h| signed_ring_area(h).abs()).sum();
    signed_ring_area(outer).abs() - holes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord {
        Coord::new(x, y)
    }

    #[test]
    fn ring_orientation_sign() {
        let ccw = [c(0.0, 0.0), c(4.0, 0.0), c(4.0, 4.0), c(0.0, 4.0)];
        let cw: Vec<Coord> = ccw.iter().rev().copied().collect();
        assert_eq!(signed_ring_area(&ccw), 16.0);
        assert_eq!(signed_ring_area(&cw), -16.0);
    }

    #[test]
    fn closing_point_is_ignored() {
        let closed = [c(0.0, 0.0), c(2.0, 0.0), c(2.0, 2.0), c(0.0, 0.0)];
        assert_eq!(open_ring(&closed).len(), 3);
        assert_eq!(signed_ring_area(&closed), 2.0);
    }

    #[test]
    fn polygon_area_subtracts_holes() {
        let rings = vec![
            vec![c(0.0, 0.0), c(4.0, 0.0), c(4.0, 4.0), c(0.0, 4.0)],
            vec![c(1.0, 1.0), c(1.0, 3.0), c(3.0, 1.0)],
        ];
        assert_eq!(polygon_area(&rings), 14.0);
    }

    #[test]
    fn extent_spans_all_parts() {
        let g = Geometry::MultiLineString(vec![
            vec![c(-1.0, 0.0), c(0.0, 5.0)],
            vec![c(3.0, -2.0)],
        ]);
        assert_eq!(g.extent(), Extent::new(-1.0, -2.0, 3.0, 5.0));
        assert_eq!(g.replay_kind(), ReplayKind::LineString);
    }
}
