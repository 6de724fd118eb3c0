use super::Coord;

/// 2D affine transform in f64.
///
/// Maps `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`, stored as `[a, b, c, d, e, f]`.
/// Composition happens in f64; only the final matrix is narrowed to f32 for the
/// shader, which keeps precision when map coordinates are far from the origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform2D(pub [f64; 6]);

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform2D {
    #[inline]
    pub const fn identity() -> Self {
        Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }

    #[inline]
    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    #[inline]
    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self([sx, 0.0, 0.0, sy, 0.0, 0.0])
    }

    /// Counter-clockwise rotation by `angle` radians.
    #[inline]
    pub fn rotate(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self([cos, sin, -sin, cos, 0.0, 0.0])
    }

    /// Returns the transform that applies `self` first, then `next`.
    pub fn then(self, next: Transform2D) -> Transform2D {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = next.0;
        Transform2D([
            a2 * a1 + c2 * b1,
            b2 * a1 + d2 * b1,
            a2 * c1 + c2 * d1,
            b2 * c1 + d2 * d1,
            a2 * e1 + c2 * f1 + e2,
            b2 * e1 + d2 * f1 + f2,
        ])
    }

    #[inline]
    pub fn apply(self, p: Coord) -> Coord {
        let [a, b, c, d, e, f] = self.0;
        Coord::new(a * p.x + c * p.y + e, b * p.x + d * p.y + f)
    }

    #[inline]
    pub fn determinant(self) -> f64 {
        let [a, b, c, d, ..] = self.0;
        a * d - b * c
    }

    /// Inverse transform; `None` for a singular matrix.
    pub fn invert(self) -> Option<Transform2D> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let [a, b, c, d, e, f] = self.0;
        Some(Transform2D([
            d / det,
            -b / det,
            -c / det,
            a / det,
            (c * f - d * e) / det,
            -(a * f - b * e) / det,
        ]))
    }

    /// Column-major 4x4 matrix for WGSL `mat4x4<f32>` uniforms.
    pub fn to_mat4_f32(self) -> [[f32; 4]; 4] {
        let [a, b, c, d, e, f] = self.0.map(|v| v as f32);
        [
            [a, b, 0.0, 0.0],
            [c, d, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [e, f, 0.0, 1.0],
        ]
    }
}
