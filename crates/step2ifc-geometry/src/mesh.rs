// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Indexed triangle mesh

use nalgebra::{Matrix4, Point3};
use rustc_hash::FxHashMap;
use step2ifc_model::{BoundingBox, Transform};

/// Triangle mesh with flattened positions
///
/// Triangles wind counter-clockwise seen from outside the solid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions (flattened: [x0,y0,z0, x1,y1,z1, ...])
    pub positions: Vec<f64>,
    /// Triangle indices, three per triangle
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mesh over an existing vertex pool
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let mut positions = Vec::with_capacity(points.len() * 3);
        for p in points {
            positions.extend_from_slice(&[p.x, p.y, p.z]);
        }
        Self {
            positions,
            indices: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn point(&self, index: usize) -> [f64; 3] {
        let i = index * 3;
        [self.positions[i], self.positions[i + 1], self.positions[i + 2]]
    }

    pub fn add_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    /// Triangles as vertex index triples
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Copy with every position mapped through `transform`
    pub fn transformed(&self, transform: &Transform) -> TriangleMesh {
        let matrix = Matrix4::from_column_slice(&transform.m);
        let mut positions = Vec::with_capacity(self.positions.len());
        for chunk in self.positions.chunks_exact(3) {
            let p = matrix.transform_point(&Point3::new(chunk[0], chunk[1], chunk[2]));
            positions.extend_from_slice(&[p.x, p.y, p.z]);
        }
        TriangleMesh {
            positions,
            indices: self.indices.clone(),
        }
    }

    /// Append another mesh
    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.vertex_count() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.indices.extend(other.indices.iter().map(|i| i + offset));
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let used = self.used_vertices();
        BoundingBox::from_points(used.into_iter().map(|i| self.point(i)))
    }

    /// Signed volume, positive for outward winding
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .map(|[a, b, c]| {
                let (a, b, c) = (
                    self.point(a as usize),
                    self.point(b as usize),
                    self.point(c as usize),
                );
                tetra_volume(a, b, c)
            })
            .sum()
    }

    /// Volume centroid, falling back to the bounding box centre for flat meshes
    pub fn centroid(&self) -> Option<[f64; 3]> {
        let bbox = self.bounding_box()?;
        let mut total = 0.0;
        let mut acc = [0.0; 3];
        for [a, b, c] in self.triangles() {
            let (a, b, c) = (
                self.point(a as usize),
                self.point(b as usize),
                self.point(c as usize),
            );
            let v = tetra_volume(a, b, c);
            total += v;
            for k in 0..3 {
                acc[k] += v * (a[k] + b[k] + c[k]) / 4.0;
            }
        }

        let scale = bbox.size().iter().fold(0.0f64, |m, s| m.max(*s));
        if total.abs() <= 1e-12 * scale.powi(3).max(f64::MIN_POSITIVE) {
            return Some([
                (bbox.min[0] + bbox.max[0]) / 2.0,
                (bbox.min[1] + bbox.max[1]) / 2.0,
                (bbox.min[2] + bbox.max[2]) / 2.0,
            ]);
        }
        Some([acc[0] / total, acc[1] / total, acc[2] / total])
    }

    /// Every undirected edge is shared by exactly two triangles in opposite directions
    pub fn is_closed(&self) -> bool {
        if self.is_empty() {
            return false;
        }
        let mut edges: FxHashMap<(u32, u32), (u32, u32)> = FxHashMap::default();
        for [a, b, c] in self.triangles() {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                if u < v {
                    edges.entry((u, v)).or_default().0 += 1;
                } else {
                    edges.entry((v, u)).or_default().1 += 1;
                }
            }
        }
        edges.values().all(|&uses| uses == (1, 1))
    }

    fn used_vertices(&self) -> Vec<usize> {
        let mut used: Vec<usize> = self.indices.iter().map(|&i| i as usize).collect();
        used.sort_unstable();
        used.dedup();
        used
    }
}

fn tetra_volume(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    let cross = [
        b[1] * c[2] - b[2] * c[1],
        b[2] * c[0] - b[0] * c[2],
        b[0] * c[1] - b[1] * c[0],
    ];
    (a[0] * cross[0] + a[1] * cross[1] + a[2] * cross[2]) / 6.0
}
