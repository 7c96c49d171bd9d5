// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polygonal boundary representation
//!
//! Faces are planar polygons over a shared vertex pool. Each face lists its
//! loops outer first; hole loops run opposite to the outer loop.

use crate::curve::ChordTolerance;
use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;

/// Role of a shell within a shape
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellKind {
    /// Outer boundary of a solid; normals point away from the material
    Closed,
    /// Cavity of a solid; normals point into the cavity
    Void,
    /// Surface patch; never bounds a solid
    Open,
}

/// Planar face bounded by vertex loops, outer loop first
#[derive(Clone, Debug, PartialEq)]
pub struct Face {
    pub bounds: Vec<Vec<usize>>,
}

impl Face {
    /// Reverse the winding of every loop
    pub fn flip(&mut self) {
        for bound in &mut self.bounds {
            bound.reverse();
        }
    }

    /// Directed edges of every loop
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.bounds.iter().flat_map(|bound| {
            let n = bound.len();
            (0..n)
                .map(move |i| (bound[i], bound[(i + 1) % n]))
                .filter(|(a, b)| a != b)
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Shell {
    pub kind: ShellKind,
    pub faces: Vec<Face>,
}

impl Shell {
    pub fn flip(&mut self) {
        for face in &mut self.faces {
            face.flip();
        }
    }
}

/// Boundary representation of one part in its own coordinates
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shape {
    pub vertices: Vec<Point3<f64>>,
    pub shells: Vec<Shell>,
}

impl Shape {
    pub fn face_count(&self) -> usize {
        self.shells.iter().map(|s| s.faces.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.face_count() == 0
    }

    /// Points of a loop
    pub fn loop_points(&self, bound: &[usize]) -> Vec<Point3<f64>> {
        bound.iter().map(|&i| self.vertices[i]).collect()
    }

    /// Area vector of a loop (Newell); half its norm is the loop area
    pub fn loop_area_vector(&self, bound: &[usize]) -> Vector3<f64> {
        newell(&self.loop_points(bound))
    }

    /// Signed volume enclosed by one shell
    ///
    /// Sums signed tetrahedra from the origin over a fan of every loop, so
    /// non-convex faces and holes contribute correctly.
    pub fn shell_volume(&self, shell: &Shell) -> f64 {
        let mut volume = 0.0;
        for face in &shell.faces {
            for bound in &face.bounds {
                if bound.len() < 3 {
                    continue;
                }
                let p0 = self.vertices[bound[0]].coords;
                for i in 1..bound.len() - 1 {
                    let p1 = self.vertices[bound[i]].coords;
                    let p2 = self.vertices[bound[i + 1]].coords;
                    volume += p0.dot(&p1.cross(&p2));
                }
            }
        }
        volume / 6.0
    }
}

/// Newell area vector of a closed polygon (twice the area, along the normal)
pub fn newell(points: &[Point3<f64>]) -> Vector3<f64> {
    let n = points.len();
    let mut normal = Vector3::<f64>::zeros();
    for i in 0..n {
        let current = &points[i];
        let next = &points[(i + 1) % n];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal
}

/// Accumulates shells while pooling exactly coincident points
#[derive(Default)]
pub struct ShapeBuilder {
    shape: Shape,
    lookup: FxHashMap<[u64; 3], usize>,
    chords: ChordTolerance,
}

impl ShapeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder whose curved edges are split into chords per `chords`
    pub fn with_chords(chords: ChordTolerance) -> Self {
        Self {
            chords,
            ..Self::default()
        }
    }

    pub fn chords(&self) -> ChordTolerance {
        self.chords
    }

    /// Index of a point, reusing an existing vertex at identical coordinates
    pub fn vertex(&mut self, p: [f64; 3]) -> usize {
        // + 0.0 folds -0.0 into 0.0
        let key = [(p[0] + 0.0).to_bits(), (p[1] + 0.0).to_bits(), (p[2] + 0.0).to_bits()];
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }
        let index = self.shape.vertices.len();
        self.shape.vertices.push(Point3::new(p[0], p[1], p[2]));
        self.lookup.insert(key, index);
        index
    }

    pub fn push_shell(&mut self, shell: Shell) {
        self.shape.shells.push(shell);
    }

    /// Points already pooled, for ordering loops before they become faces
    pub fn points(&self) -> &[Point3<f64>] {
        &self.shape.vertices
    }

    pub fn finish(self) -> Shape {
        self.shape
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::cuboid;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_builder_pools_identical_points() {
        let mut b = ShapeBuilder::new();
        let a = b.vertex([1.0, 0.0, 0.0]);
        let c = b.vertex([1.0, -0.0, 0.0]);
        let d = b.vertex([1.0, 0.0, 1e-9]);
        assert_eq!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_cuboid_volume_positive() {
        let shape = cuboid([0.0, 0.0, 0.0], [2.0, 3.0, 4.0]);
        assert_eq!(shape.face_count(), 6);
        assert_relative_eq!(shape.shell_volume(&shape.shells[0]), 24.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flip_negates_volume() {
        let mut shape = cuboid([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]);
        shape.shells[0].flip();
        assert_relative_eq!(shape.shell_volume(&shape.shells[0]), -1.0, epsilon = 1e-9);
    }
}
