// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Affine placement transforms

use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// 4x4 affine transform stored column-major
///
/// Element `(row, col)` lives at `m[col * 4 + row]`, the layout nalgebra's
/// `Matrix4::from_column_slice` expects.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub m: [f64; 16],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        m: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Identity transform
    pub fn identity() -> Self {
        Self::IDENTITY
    }

    /// Pure translation
    pub fn translation(t: [f64; 3]) -> Self {
        let mut out = Self::IDENTITY;
        out.m[12] = t[0];
        out.m[13] = t[1];
        out.m[14] = t[2];
        out
    }

    /// Build a placement from an origin, a Z axis and an X reference direction
    ///
    /// The X direction is re-orthogonalised against Z. Degenerate inputs fall
    /// back to the global axes.
    pub fn from_axes(origin: [f64; 3], axis: Option<[f64; 3]>, ref_direction: Option<[f64; 3]>) -> Self {
        let z = axis
            .and_then(normalize)
            .unwrap_or([0.0, 0.0, 1.0]);
        let mut x = ref_direction
            .and_then(normalize)
            .unwrap_or([1.0, 0.0, 0.0]);
        if norm(cross(z, x)) < 1e-12 {
            x = if z[0].abs() < 0.9 {
                [1.0, 0.0, 0.0]
            } else {
                [0.0, 1.0, 0.0]
            };
        }
        let y = normalize(cross(z, x)).unwrap_or([0.0, 1.0, 0.0]);
        let x = normalize(cross(y, z)).unwrap_or([1.0, 0.0, 0.0]);

        Self {
            m: [
                x[0], x[1], x[2], 0.0, //
                y[0], y[1], y[2], 0.0, //
                z[0], z[1], z[2], 0.0, //
                origin[0], origin[1], origin[2], 1.0,
            ],
        }
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> f64 {
        self.m[col * 4 + row]
    }

    /// Apply to a point
    pub fn transform_point(&self, p: [f64; 3]) -> [f64; 3] {
        [
            self.at(0, 0) * p[0] + self.at(0, 1) * p[1] + self.at(0, 2) * p[2] + self.at(0, 3),
            self.at(1, 0) * p[0] + self.at(1, 1) * p[1] + self.at(1, 2) * p[2] + self.at(1, 3),
            self.at(2, 0) * p[0] + self.at(2, 1) * p[1] + self.at(2, 2) * p[2] + self.at(2, 3),
        ]
    }

    /// Apply to a direction (translation ignored)
    pub fn transform_vector(&self, v: [f64; 3]) -> [f64; 3] {
        [
            self.at(0, 0) * v[0] + self.at(0, 1) * v[1] + self.at(0, 2) * v[2],
            self.at(1, 0) * v[0] + self.at(1, 1) * v[1] + self.at(1, 2) * v[2],
            self.at(2, 0) * v[0] + self.at(2, 1) * v[1] + self.at(2, 2) * v[2],
        ]
    }

    /// Translation part
    pub fn origin(&self) -> [f64; 3] {
        [self.m[12], self.m[13], self.m[14]]
    }

    /// First column (local X axis in parent coordinates)
    pub fn x_axis(&self) -> [f64; 3] {
        [self.m[0], self.m[1], self.m[2]]
    }

    /// Third column (local Z axis in parent coordinates)
    pub fn z_axis(&self) -> [f64; 3] {
        [self.m[8], self.m[9], self.m[10]]
    }

    /// Determinant of the linear 3x3 part
    pub fn determinant(&self) -> f64 {
        let a = |r, c| self.at(r, c);
        a(0, 0) * (a(1, 1) * a(2, 2) - a(1, 2) * a(2, 1))
            - a(0, 1) * (a(1, 0) * a(2, 2) - a(1, 2) * a(2, 0))
            + a(0, 2) * (a(1, 0) * a(2, 1) - a(1, 1) * a(2, 0))
    }

    /// Inverse of an affine transform, `None` when singular
    pub fn inverse(&self) -> Option<Transform> {
        let det = self.determinant();
        if det.abs() < 1e-15 {
            return None;
        }
        let a = |r, c| self.at(r, c);
        // Adjugate of the 3x3 block divided by the determinant
        let inv = [
            [
                (a(1, 1) * a(2, 2) - a(1, 2) * a(2, 1)) / det,
                (a(0, 2) * a(2, 1) - a(0, 1) * a(2, 2)) / det,
                (a(0, 1) * a(1, 2) - a(0, 2) * a(1, 1)) / det,
            ],
            [
                (a(1, 2) * a(2, 0) - a(1, 0) * a(2, 2)) / det,
                (a(0, 0) * a(2, 2) - a(0, 2) * a(2, 0)) / det,
                (a(0, 2) * a(1, 0) - a(0, 0) * a(1, 2)) / det,
            ],
            [
                (a(1, 0) * a(2, 1) - a(1, 1) * a(2, 0)) / det,
                (a(0, 1) * a(2, 0) - a(0, 0) * a(2, 1)) / det,
                (a(0, 0) * a(1, 1) - a(0, 1) * a(1, 0)) / det,
            ],
        ];
        let t = self.origin();
        let mut out = Self::IDENTITY;
        for row in 0..3 {
            for col in 0..3 {
                out.m[col * 4 + row] = inv[row][col];
            }
            out.m[12 + row] = -(inv[row][0] * t[0] + inv[row][1] * t[1] + inv[row][2] * t[2]);
        }
        Some(out)
    }

    /// Check closeness to identity
    pub fn is_identity(&self, eps: f64) -> bool {
        self.m
            .iter()
            .zip(Self::IDENTITY.m.iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        let mut out = [0.0; 16];
        for col in 0..4 {
            for row in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += self.m[k * 4 + row] * rhs.m[col * 4 + k];
                }
                out[col * 4 + row] = sum;
            }
        }
        Transform { m: out }
    }
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn normalize(v: [f64; 3]) -> Option<[f64; 3]> {
    let n = norm(v);
    if n < 1e-12 {
        None
    } else {
        Some([v[0] / n, v[1] / n, v[2] / n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_axes_rotates_and_translates() {
        // Z up, X along global Y: a 90° rotation about Z
        let t = Transform::from_axes([10.0, 0.0, 0.0], Some([0.0, 0.0, 1.0]), Some([0.0, 1.0, 0.0]));
        let p = t.transform_point([1.0, 0.0, 0.0]);
        assert_relative_eq!(p[0], 10.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Transform::from_axes([1.0, 2.0, 3.0], Some([0.0, 1.0, 0.0]), Some([1.0, 0.0, 0.0]));
        let inv = t.inverse().unwrap();
        assert!((t * inv).is_identity(1e-12));
        assert!((inv * t).is_identity(1e-12));
    }

    #[test]
    fn test_composition_order() {
        let move_x = Transform::translation([5.0, 0.0, 0.0]);
        let rot = Transform::from_axes([0.0; 3], None, Some([0.0, 1.0, 0.0]));
        // rotate first, then translate
        let p = (move_x * rot).transform_point([1.0, 0.0, 0.0]);
        assert_relative_eq!(p[0], 5.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_axes_fall_back() {
        let t = Transform::from_axes([0.0; 3], Some([0.0, 0.0, 0.0]), Some([0.0, 0.0, 1.0]));
        assert_relative_eq!(t.determinant(), 1.0, epsilon = 1e-12);
    }
}
