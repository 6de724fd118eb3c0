//! Ear-clipping triangulation of polygons with holes.
//!
//! Vertices live in a circular doubly linked list (indices into a node arena).
//! Holes are merged into the outer ring through bridge edges, leftmost hole
//! first, and ears are clipped in three escalating passes:
//! 1. plain ear clipping
//! 2. after filtering duplicate and collinear points
//! 3. after curing local self-intersections, then splitting the remainder along
//!    a valid diagonal and recursing into both halves
//!
//! Orientation follows the usual y-up convention: the outer ring is walked
//! counter-clockwise and holes clockwise regardless of their input order.
//! `area(p, q, r)` below is negative for a left (convex) turn.

use strata_engine::coords::Coord;

use crate::error::TriangulationError;

#[derive(Debug, Clone, Copy)]
struct Node {
    /// Index into the caller's vertex array.
    i: u32,
    x: f64,
    y: f64,
    prev: usize,
    next: usize,
}

struct Linked<'a> {
    nodes: Vec<Node>,
    triangles: &'a mut Vec<u32>,
}

/// Triangulates one polygon.
///
/// `vertices` holds the outer ring followed by every hole; `hole_starts[k]` is
/// the index in `vertices` where hole `k` begins. Rings must be open (no
/// repeated closing point). Emitted indices refer to `vertices` and are
/// appended to `out`. Returns the number of triangles appended.
///
/// On error `out` is left exactly as it was passed in.
pub fn triangulate(
    vertices: &[Coord],
    hole_starts: &[usize],
    out: &mut Vec<u32>,
) -> Result<usize, TriangulationError> {
    let outer_len = hole_starts.first().copied().unwrap_or(vertices.len());
    let outer = &vertices[..outer_len.min(vertices.len())];
    if outer.len() < 3 || ring_area(outer) == 0.0 {
        return Err(TriangulationError::DegenerateRing { points: distinct_points(outer) });
    }

    let before = out.len();
    let mut list = Linked {
        nodes: Vec::with_capacity(vertices.len() * 3 / 2 + 8),
        triangles: out,
    };

    let Some(mut outer_node) = list.linked_list(vertices, 0, outer_len, true) else {
        return Err(TriangulationError::DegenerateRing { points: outer.len() });
    };
    if list.next(outer_node) == list.prev(outer_node) {
        return Err(TriangulationError::DegenerateRing { points: 2 });
    }

    if !hole_starts.is_empty() {
        outer_node = list.eliminate_holes(vertices, hole_starts, outer_node);
    }

    if let Err(err) = list.earcut_linked(outer_node, Pass::Plain) {
        out.truncate(before);
        return Err(err);
    }

    Ok((out.len() - before) / 3)
}

fn ring_area(ring: &[Coord]) -> f64 {
    let mut sum = 0.0;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        sum += (ring[j].x - ring[i].x) * (ring[i].y + ring[j].y);
        j = i;
    }
    sum
}

fn distinct_points(ring: &[Coord]) -> usize {
    let mut seen: Vec<Coord> = Vec::with_capacity(ring.len());
    for c in ring {
        if !seen.contains(c) {
            seen.push(*c);
        }
    }
    seen.len()
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Pass {
    Plain,
    Filtered,
    Cured,
}

impl Linked<'_> {
    // ── list plumbing ─────────────────────────────────────────────────────

    #[inline]
    fn next(&self, p: usize) -> usize {
        self.nodes[p].next
    }

    #[inline]
    fn prev(&self, p: usize) -> usize {
        self.nodes[p].prev
    }

    #[inline]
    fn xy(&self, p: usize) -> (f64, f64) {
        (self.nodes[p].x, self.nodes[p].y)
    }

    fn insert_node(&mut self, i: u32, c: Coord, last: Option<usize>) -> usize {
        let p = self.nodes.len();
        match last {
            None => self.nodes.push(Node { i, x: c.x, y: c.y, prev: p, next: p }),
            Some(last) => {
                let next = self.nodes[last].next;
                self.nodes.push(Node { i, x: c.x, y: c.y, prev: last, next });
                self.nodes[next].prev = p;
                self.nodes[last].next = p;
            }
        }
        p
    }

    fn remove_node(&mut self, p: usize) {
        let Node { prev, next, .. } = self.nodes[p];
        self.nodes[next].prev = prev;
        self.nodes[prev].next = next;
    }

    fn equals(&self, a: usize, b: usize) -> bool {
        self.nodes[a].x == self.nodes[b].x && self.nodes[a].y == self.nodes[b].y
    }

    /// Signed turn of `p -> q -> r`; negative is a left turn.
    fn area(&self, p: usize, q: usize, r: usize) -> f64 {
        let (px, py) = self.xy(p);
        let (qx, qy) = self.xy(q);
        let (rx, ry) = self.xy(r);
        (qy - py) * (rx - qx) - (qx - px) * (ry - qy)
    }

    /// Builds a ring from `vertices[start..end]` in the requested orientation.
    fn linked_list(&mut self, vertices: &[Coord], start: usize, end: usize, ccw: bool) -> Option<usize> {
        let ring = &vertices[start..end];
        if ring.is_empty() {
            return None;
        }
        let mut last = None;
        if ccw == (ring_area(ring) > 0.0) {
            for (k, c) in ring.iter().enumerate() {
                last = Some(self.insert_node((start + k) as u32, *c, last));
            }
        } else {
            for (k, c) in ring.iter().enumerate().rev() {
                last = Some(self.insert_node((start + k) as u32, *c, last));
            }
        }

        let last = last?;
        if last != self.next(last) && self.equals(last, self.next(last)) {
            let next = self.next(last);
            self.remove_node(last);
            return Some(next);
        }
        Some(last)
    }

    /// Removes duplicate and collinear points between `start` and `end`.
    fn filter_points(&mut self, start: usize, end: Option<usize>) -> usize {
        let mut end = end.unwrap_or(start);
        let mut p = start;
        loop {
            let mut again = false;
            let (prev, next) = (self.prev(p), self.next(p));
            if self.equals(p, next) || self.area(prev, p, next) == 0.0 {
                self.remove_node(p);
                p = prev;
                end = prev;
                if p == self.next(p) {
                    break;
                }
                again = true;
            } else {
                p = next;
            }
            if !again && p == end {
                break;
            }
        }
        end
    }

    // ── ear clipping ──────────────────────────────────────────────────────

    fn earcut_linked(&mut self, start: usize, pass: Pass) -> Result<(), TriangulationError> {
        let mut ear = start;
        let mut stop = ear;

        while self.prev(ear) != self.next(ear) {
            let prev = self.prev(ear);
            let next = self.next(ear);

            if self.is_ear(ear) {
                self.triangles
                    .extend_from_slice(&[self.nodes[prev].i, self.nodes[ear].i, self.nodes[next].i]);
                self.remove_node(ear);
                // Skipping the next vertex leads to fewer sliver triangles.
                ear = self.next(next);
                stop = ear;
                continue;
            }

            ear = next;

            if ear == stop {
                return match pass {
                    Pass::Plain => {
                        let filtered = self.filter_points(ear, None);
                        self.earcut_linked(filtered, Pass::Filtered)
                    }
                    Pass::Filtered => {
                        let filtered = self.filter_points(ear, None);
                        let cured = self.cure_local_intersections(filtered);
                        self.earcut_linked(cured, Pass::Cured)
                    }
                    Pass::Cured => self.split_earcut(ear),
                };
            }
        }
        Ok(())
    }

    fn is_ear(&self, ear: usize) -> bool {
        let a = self.prev(ear);
        let b = ear;
        let c = self.next(ear);
        if self.area(a, b, c) >= 0.0 {
            return false; // reflex, can't be an ear
        }

        let (ax, ay) = self.xy(a);
        let (bx, by) = self.xy(b);
        let (cx, cy) = self.xy(c);
        let (x0, x1) = (ax.min(bx).min(cx), ax.max(bx).max(cx));
        let (y0, y1) = (ay.min(by).min(cy), ay.max(by).max(cy));

        let mut p = self.next(c);
        while p != a {
            let (px, py) = self.xy(p);
            if px >= x0
                && px <= x1
                && py >= y0
                && py <= y1
                && !(px == ax && py == ay)
                && point_in_triangle((ax, ay), (bx, by), (cx, cy), (px, py))
                && self.area(self.prev(p), p, self.next(p)) >= 0.0
            {
                return false;
            }
            p = self.next(p);
        }
        true
    }

    /// Clips the triangle at each spot where two neighbouring edges cross.
    fn cure_local_intersections(&mut self, start: usize) -> usize {
        let mut start = start;
        let mut p = start;
        loop {
            let a = self.prev(p);
            let p_next = self.next(p);
            let b = self.next(p_next);

            if !self.equals(a, b)
                && self.intersects(a, p, p_next, b)
                && self.locally_inside(a, b)
                && self.locally_inside(b, a)
            {
                self.triangles
                    .extend_from_slice(&[self.nodes[a].i, self.nodes[p].i, self.nodes[b].i]);
                self.remove_node(p);
                self.remove_node(p_next);
                p = b;
                start = b;
            }
            p = self.next(p);
            if p == start {
                break;
            }
        }
        self.filter_points(p, None)
    }

    /// Splits the ring along a valid diagonal and triangulates both halves.
    fn split_earcut(&mut self, start: usize) -> Result<(), TriangulationError> {
        let mut a = start;
        loop {
            let mut b = self.next(self.next(a));
            while b != self.prev(a) {
                if self.nodes[a].i != self.nodes[b].i && self.is_valid_diagonal(a, b) {
                    let c = self.split_polygon(a, b);
                    let a_next = self.next(a);
                    let a = self.filter_points(a, Some(a_next));
                    let c_next = self.next(c);
                    let c = self.filter_points(c, Some(c_next));
                    self.earcut_linked(a, Pass::Plain)?;
                    return self.earcut_linked(c, Pass::Plain);
                }
                b = self.next(b);
            }
            a = self.next(a);
            if a == start {
                break;
            }
        }
        Err(TriangulationError::NoEar { remaining: self.ring_len(start) })
    }

    fn ring_len(&self, start: usize) -> usize {
        let mut n = 1;
        let mut p = self.next(start);
        while p != start {
            n += 1;
            p = self.next(p);
        }
        n
    }

    // ── holes ─────────────────────────────────────────────────────────────

    fn eliminate_holes(&mut self, vertices: &[Coord], hole_starts: &[usize], outer: usize) -> usize {
        let mut queue = Vec::with_capacity(hole_starts.len());
        for (k, &start) in hole_starts.iter().enumerate() {
            let end = hole_starts.get(k + 1).copied().unwrap_or(vertices.len());
            if end <= start {
                continue;
            }
            if let Some(list) = self.linked_list(vertices, start, end, false) {
                queue.push(self.leftmost(list));
            }
        }
        queue.sort_by(|&a, &b| {
            let (ax, ay) = self.xy(a);
            let (bx, by) = self.xy(b);
            ax.total_cmp(&bx).then(ay.total_cmp(&by))
        });

        let mut outer = outer;
        for hole in queue {
            outer = self.eliminate_hole(hole, outer);
        }
        outer
    }

    fn eliminate_hole(&mut self, hole: usize, outer: usize) -> usize {
        let Some(bridge) = self.find_hole_bridge(hole, outer) else {
            return outer;
        };
        let bridge_reverse = self.split_polygon(bridge, hole);

        // Filter collinear points around the cuts.
        let next = self.next(bridge_reverse);
        self.filter_points(bridge_reverse, Some(next));
        let next = self.next(bridge);
        self.filter_points(bridge, Some(next))
    }

    /// Finds an outer vertex visible from the hole's leftmost point.
    fn find_hole_bridge(&self, hole: usize, outer: usize) -> Option<usize> {
        let (hx, hy) = self.xy(hole);
        let mut qx = f64::NEG_INFINITY;
        let mut m = None;

        // Cast a ray to the left; the crossed segment's left endpoint is a
        // candidate connection.
        let mut p = outer;
        loop {
            let next = self.next(p);
            let (px, py) = self.xy(p);
            let (nx, ny) = self.xy(next);
            if hy <= py && hy >= ny && ny != py {
                let x = px + (hy - py) * (nx - px) / (ny - py);
                if x <= hx && x > qx {
                    qx = x;
                    m = Some(if px < nx { p } else { next });
                    if x == hx {
                        // Hole touches the outer segment.
                        return m;
                    }
                }
            }
            p = next;
            if p == outer {
                break;
            }
        }

        let mut m = m?;

        // Points inside the triangle (hole point, ray hit, candidate) would block
        // the bridge; pick the one with the smallest angle to the ray instead.
        let stop = m;
        let (mx, my) = self.xy(m);
        let mut tan_min = f64::INFINITY;
        p = m;
        loop {
            let (px, py) = self.xy(p);
            let a = if hy < my { (hx, hy) } else { (qx, hy) };
            let c = if hy < my { (qx, hy) } else { (hx, hy) };
            if hx >= px && px >= mx && hx != px && point_in_triangle(a, (mx, my), c, (px, py)) {
                let tan = (hy - py).abs() / (hx - px);
                let (cur_x, _) = self.xy(m);
                if self.locally_inside(p, hole)
                    && (tan < tan_min
                        || (tan == tan_min
                            && (px > cur_x || (px == cur_x && self.sector_contains_sector(m, p)))))
                {
                    m = p;
                    tan_min = tan;
                }
            }
            p = self.next(p);
            if p == stop {
                break;
            }
        }

        Some(m)
    }

    fn leftmost(&self, start: usize) -> usize {
        let mut p = start;
        let mut leftmost = start;
        loop {
            let (px, py) = self.xy(p);
            let (lx, ly) = self.xy(leftmost);
            if px < lx || (px == lx && py < ly) {
                leftmost = p;
            }
            p = self.next(p);
            if p == start {
                break;
            }
        }
        leftmost
    }

    fn sector_contains_sector(&self, m: usize, p: usize) -> bool {
        self.area(self.prev(m), m, self.prev(p)) < 0.0 && self.area(self.next(p), m, self.prev(m)) < 0.0
    }

    /// Links `a` to `b` with a two-way edge, cloning both; returns `b`'s clone.
    fn split_polygon(&mut self, a: usize, b: usize) -> usize {
        let a2 = self.nodes.len();
        let b2 = a2 + 1;
        let an = self.next(a);
        let bp = self.prev(b);

        let na = self.nodes[a];
        let nb = self.nodes[b];
        self.nodes.push(Node { next: an, prev: b2, ..na });
        self.nodes.push(Node { next: a2, prev: bp, ..nb });

        self.nodes[a].next = b;
        self.nodes[b].prev = a;
        self.nodes[an].prev = a2;
        self.nodes[bp].next = b2;

        b2
    }

    // ── diagonals ─────────────────────────────────────────────────────────

    fn is_valid_diagonal(&self, a: usize, b: usize) -> bool {
        let (a_prev, a_next) = (self.prev(a), self.next(a));
        let (b_prev, b_next) = (self.prev(b), self.next(b));
        self.nodes[a_next].i != self.nodes[b].i
            && self.nodes[a_prev].i != self.nodes[b].i
            && !self.intersects_polygon(a, b)
            && ((self.locally_inside(a, b)
                && self.locally_inside(b, a)
                && self.middle_inside(a, b)
                && (self.area(a_prev, a, b_prev) != 0.0 || self.area(a, b_prev, b) != 0.0))
                || (self.equals(a, b)
                    && self.area(a_prev, a, a_next) > 0.0
                    && self.area(b_prev, b, b_next) > 0.0))
    }

    fn intersects(&self, p1: usize, q1: usize, p2: usize, q2: usize) -> bool {
        let o1 = sign(self.area(p1, q1, p2));
        let o2 = sign(self.area(p1, q1, q2));
        let o3 = sign(self.area(p2, q2, p1));
        let o4 = sign(self.area(p2, q2, q1));

        if o1 != o2 && o3 != o4 {
            return true;
        }
        (o1 == 0 && self.on_segment(p1, p2, q1))
            || (o2 == 0 && self.on_segment(p1, q2, q1))
            || (o3 == 0 && self.on_segment(p2, p1, q2))
            || (o4 == 0 && self.on_segment(p2, q1, q2))
    }

    /// For collinear `p, q, r`: whether `q` lies on segment `pr`.
    fn on_segment(&self, p: usize, q: usize, r: usize) -> bool {
        let (px, py) = self.xy(p);
        let (qx, qy) = self.xy(q);
        let (rx, ry) = self.xy(r);
        qx <= px.max(rx) && qx >= px.min(rx) && qy <= py.max(ry) && qy >= py.min(ry)
    }

    fn intersects_polygon(&self, a: usize, b: usize) -> bool {
        let (ai, bi) = (self.nodes[a].i, self.nodes[b].i);
        let mut p = a;
        loop {
            let next = self.next(p);
            let (pi, ni) = (self.nodes[p].i, self.nodes[next].i);
            if pi != ai && ni != ai && pi != bi && ni != bi && self.intersects(p, next, a, b) {
                return true;
            }
            p = next;
            if p == a {
                return false;
            }
        }
    }

    fn locally_inside(&self, a: usize, b: usize) -> bool {
        let (a_prev, a_next) = (self.prev(a), self.next(a));
        if self.area(a_prev, a, a_next) < 0.0 {
            self.area(a, b, a_next) >= 0.0 && self.area(a, a_prev, b) >= 0.0
        } else {
            self.area(a, b, a_prev) < 0.0 || self.area(a, a_next, b) < 0.0
        }
    }

    fn middle_inside(&self, a: usize, b: usize) -> bool {
        let (ax, ay) = self.xy(a);
        let (bx, by) = self.xy(b);
        let (mx, my) = ((ax + bx) / 2.0, (ay + by) / 2.0);
        let mut inside = false;
        let mut p = a;
        loop {
            let next = self.next(p);
            let (px, py) = self.xy(p);
            let (nx, ny) = self.xy(next);
            if ((py > my) != (ny > my)) && ny != py && (mx < (nx - px) * (my - py) / (ny - py) + px) {
                inside = !inside;
            }
            p = next;
            if p == a {
                return inside;
            }
        }
    }
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

fn point_in_triangle(a: (f64, f64), b: (f64, f64), c: (f64, f64), p: (f64, f64)) -> bool {
    let (ax, ay) = a;
    let (bx, by) = b;
    let (cx, cy) = c;
    let (px, py) = p;
    (cx - px) * (ay - py) >= (ax - px) * (cy - py)
        && (ax - px) * (by - py) >= (bx - px) * (ay - py)
        && (bx - px) * (cy - py) >= (cx - px) * (by - py)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::polygon_area;

    fn c(x: f64, y: f64) -> Coord {
        Coord::new(x, y)
    }

    fn triangles_area(vertices: &[Coord], indices: &[u32]) -> f64 {
        indices
            .chunks_exact(3)
            .map(|t| {
                let (a, b, c) = (vertices[t[0] as usize], vertices[t[1] as usize], vertices[t[2] as usize]);
                ((b - a).cross(c - a) / 2.0).abs()
            })
            .sum()
    }

    fn assert_area_matches(rings: Vec<Vec<Coord>>) -> Vec<u32> {
        let mut vertices = Vec::new();
        let mut holes = Vec::new();
        for (k, ring) in rings.iter().enumerate() {
            if k > 0 {
                holes.push(vertices.len());
            }
            vertices.extend_from_slice(ring);
        }
        let mut out = Vec::new();
        let count = triangulate(&vertices, &holes, &mut out).expect("triangulates");
        assert_eq!(out.len(), count * 3);
        let expected = polygon_area(&rings);
        let got = triangles_area(&vertices, &out);
        assert!((expected - got).abs() < 1e-9, "expected area {expected}, got {got}");
        out
    }

    // ── simple polygons ───────────────────────────────────────────────────

    #[test]
    fn square_yields_two_triangles() {
        let out = assert_area_matches(vec![vec![c(0.0, 0.0), c(4.0, 0.0), c(4.0, 4.0), c(0.0, 4.0)]]);
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn clockwise_input_is_normalized() {
        let out = assert_area_matches(vec![vec![c(0.0, 4.0), c(4.0, 4.0), c(4.0, 0.0), c(0.0, 0.0)]]);
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn concave_polygon_area_is_preserved() {
        // An "L" shape.
        assert_area_matches(vec![vec![
            c(0.0, 0.0),
            c(6.0, 0.0),
            c(6.0, 2.0),
            c(2.0, 2.0),
            c(2.0, 6.0),
            c(0.0, 6.0),
        ]]);
    }

    #[test]
    fn collinear_points_are_dropped() {
        let out = assert_area_matches(vec![vec![
            c(0.0, 0.0),
            c(2.0, 0.0),
            c(4.0, 0.0),
            c(4.0, 4.0),
            c(0.0, 4.0),
        ]]);
        assert_eq!(out.len(), 6);
    }

    // ── holes ─────────────────────────────────────────────────────────────

    #[test]
    fn square_with_triangular_hole() {
        let out = assert_area_matches(vec![
            vec![c(0.0, 0.0), c(4.0, 0.0), c(4.0, 4.0), c(0.0, 4.0)],
            vec![c(1.0, 1.0), c(3.0, 1.0), c(2.0, 3.0)],
        ]);
        assert_eq!(out.len() % 3, 0);
        assert!(out.iter().all(|&i| i < 7));
        let used: std::collections::HashSet<u32> = out.iter().copied().collect();
        assert_eq!(used.len(), 7, "every outer and hole vertex takes part");
    }

    #[test]
    fn two_holes() {
        assert_area_matches(vec![
            vec![c(0.0, 0.0), c(10.0, 0.0), c(10.0, 10.0), c(0.0, 10.0)],
            vec![c(1.0, 1.0), c(1.0, 4.0), c(4.0, 4.0), c(4.0, 1.0)],
            vec![c(6.0, 6.0), c(9.0, 6.0), c(9.0, 9.0), c(6.0, 9.0)],
        ]);
    }

    // ── degenerate input ──────────────────────────────────────────────────

    #[test]
    fn two_point_ring_is_rejected() {
        let mut out = vec![9];
        let err = triangulate(&[c(0.0, 0.0), c(1.0, 1.0)], &[], &mut out).unwrap_err();
        assert_eq!(err, TriangulationError::DegenerateRing { points: 2 });
        assert_eq!(out, vec![9], "output untouched on error");
    }

    #[test]
    fn zero_area_ring_is_rejected() {
        let mut out = Vec::new();
        let err = triangulate(&[c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0)], &[], &mut out);
        assert!(matches!(err, Err(TriangulationError::DegenerateRing { .. })));
    }
}
