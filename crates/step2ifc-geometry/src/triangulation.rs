// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polygon triangulation utilities
//!
//! Wrapper around earcutr for 2D polygon triangulation, plus face and shape
//! tessellation on top of it.

use crate::mesh::TriangleMesh;
use crate::shape::{newell, Face, Shape};
use crate::{GeometryError, Point2, Point3, Result, Vector3};

/// Check if a polygon is convex (all cross products have same sign)
#[inline]
fn is_convex(points: &[Point2<f64>]) -> bool {
    if points.len() < 3 {
        return false;
    }

    let n = points.len();
    let mut sign = 0i8;

    for i in 0..n {
        let p0 = &points[i];
        let p1 = &points[(i + 1) % n];
        let p2 = &points[(i + 2) % n];

        let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);

        if cross.abs() > 1e-10 {
            let current_sign = if cross > 0.0 { 1i8 } else { -1i8 };
            if sign == 0 {
                sign = current_sign;
            } else if sign != current_sign {
                return false;
            }
        }
    }

    true
}

/// Simple fan triangulation for convex polygons
#[inline]
fn fan_triangulate(n: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity((n - 2) * 3);
    for i in 1..n - 1 {
        indices.push(0);
        indices.push(i);
        indices.push(i + 1);
    }
    indices
}

/// Triangulate a simple polygon (no holes)
/// Returns triangle indices into the input points
#[inline]
pub fn triangulate_polygon(points: &[Point2<f64>]) -> Result<Vec<usize>> {
    let n = points.len();

    if n < 3 {
        return Err(GeometryError::triangulation(
            "Need at least 3 points to triangulate",
        ));
    }

    if n == 3 {
        return Ok(vec![0, 1, 2]);
    }

    if is_convex(points) {
        return Ok(fan_triangulate(n));
    }

    let mut vertices = Vec::with_capacity(n * 2);
    for p in points {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    earcutr::earcut(&vertices, &[], 2).map_err(|e| GeometryError::triangulation(format!("{:?}", e)))
}

/// Triangulate a polygon with holes
/// Returns triangle indices into the combined vertex array (outer + all holes)
#[inline]
pub fn triangulate_polygon_with_holes(
    outer: &[Point2<f64>],
    holes: &[Vec<Point2<f64>>],
) -> Result<Vec<usize>> {
    if outer.len() < 3 {
        return Err(GeometryError::triangulation(
            "Need at least 3 points in outer boundary",
        ));
    }

    if holes.is_empty() {
        return triangulate_polygon(outer);
    }

    let total_points: usize = outer.len() + holes.iter().map(|h| h.len()).sum::<usize>();
    let mut vertices = Vec::with_capacity(total_points * 2);

    for p in outer {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    let mut hole_indices = Vec::with_capacity(holes.len());
    for hole in holes {
        hole_indices.push(vertices.len() / 2);
        for p in hole {
            vertices.push(p.x);
            vertices.push(p.y);
        }
    }

    earcutr::earcut(&vertices, &hole_indices, 2)
        .map_err(|e| GeometryError::triangulation(format!("{:?}", e)))
}

/// Project 3D points onto a 2D plane defined by a normal
/// Returns 2D points and the coordinate system (u_axis, v_axis, origin)
#[inline]
pub fn project_to_2d(
    points_3d: &[Point3<f64>],
    normal: &Vector3<f64>,
) -> (Vec<Point2<f64>>, Vector3<f64>, Vector3<f64>, Point3<f64>) {
    if points_3d.is_empty() {
        return (
            Vec::new(),
            Vector3::zeros(),
            Vector3::zeros(),
            Point3::origin(),
        );
    }

    let origin = points_3d[0];

    // Orthonormal basis on the plane; (u, v, normal) is right-handed
    let abs_x = normal.x.abs();
    let abs_y = normal.y.abs();
    let abs_z = normal.z.abs();

    let reference = if abs_x <= abs_y && abs_x <= abs_z {
        Vector3::new(1.0, 0.0, 0.0)
    } else if abs_y <= abs_z {
        Vector3::new(0.0, 1.0, 0.0)
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    };

    let u_axis = normal.cross(&reference).normalize();
    let v_axis = normal.cross(&u_axis).normalize();

    let points_2d = project_to_2d_with_basis(points_3d, &u_axis, &v_axis, &origin);
    (points_2d, u_axis, v_axis, origin)
}

/// Project 3D points using an existing coordinate system
#[inline]
pub fn project_to_2d_with_basis(
    points_3d: &[Point3<f64>],
    u_axis: &Vector3<f64>,
    v_axis: &Vector3<f64>,
    origin: &Point3<f64>,
) -> Vec<Point2<f64>> {
    points_3d
        .iter()
        .map(|p| {
            let v = p - origin;
            Point2::new(v.dot(u_axis), v.dot(v_axis))
        })
        .collect()
}

/// Calculate the unit normal of a polygon from its vertices (Newell's method)
#[inline]
pub fn calculate_polygon_normal(points: &[Point3<f64>]) -> Vector3<f64> {
    if points.len() < 3 {
        return Vector3::new(0.0, 0.0, 1.0);
    }

    let normal = newell(points);
    let len = normal.norm();
    if len > 1e-12 {
        normal / len
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    }
}

/// Triangulate one face into vertex-pool indices
///
/// Triangles are wound to agree with the outer loop's normal. Falls back to a
/// fan over the outer loop when ear clipping fails.
pub fn triangulate_face(shape: &Shape, face: &Face) -> Vec<[usize; 3]> {
    let Some(outer) = face.bounds.first().filter(|b| b.len() >= 3) else {
        return Vec::new();
    };
    let outer_points = shape.loop_points(outer);
    let normal = calculate_polygon_normal(&outer_points);

    let holes: Vec<&Vec<usize>> = face.bounds[1..].iter().filter(|h| h.len() >= 3).collect();
    let mut pool: Vec<usize> = outer.clone();
    for hole in &holes {
        pool.extend(hole.iter().copied());
    }

    let local = if holes.is_empty() && outer.len() == 3 {
        vec![0, 1, 2]
    } else {
        let (outer_2d, u_axis, v_axis, origin) = project_to_2d(&outer_points, &normal);
        let holes_2d: Vec<Vec<Point2<f64>>> = holes
            .iter()
            .map(|h| project_to_2d_with_basis(&shape.loop_points(h), &u_axis, &v_axis, &origin))
            .collect();
        match triangulate_polygon_with_holes(&outer_2d, &holes_2d) {
            Ok(indices) if !indices.is_empty() => indices,
            Ok(_) | Err(_) => {
                log::debug!("Ear clipping failed; using fan over {} points", outer.len());
                fan_triangulate(outer.len())
            }
        }
    };

    local
        .chunks_exact(3)
        .filter_map(|t| {
            let (a, b, c) = (pool[t[0]], pool[t[1]], pool[t[2]]);
            let (pa, pb, pc) = (shape.vertices[a], shape.vertices[b], shape.vertices[c]);
            let tri_normal = (pb - pa).cross(&(pc - pa));
            if tri_normal.norm_squared() == 0.0 {
                return None;
            }
            if tri_normal.dot(&normal) < 0.0 {
                Some([a, c, b])
            } else {
                Some([a, b, c])
            }
        })
        .collect()
}

/// Triangulate every face of a shape over its vertex pool
pub fn triangulate_shape(shape: &Shape) -> TriangleMesh {
    let mut mesh = TriangleMesh::from_points(&shape.vertices);
    for shell in &shape.shells {
        for face in &shell.faces {
            for [a, b, c] in triangulate_face(shape, face) {
                mesh.add_triangle(a as u32, b as u32, c as u32);
            }
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::fixtures::cuboid;
    use crate::shape::{Shell, ShellKind};
    use approx::assert_relative_eq;

    #[test]
    fn test_triangulate_square() {
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];

        let indices = triangulate_polygon(&points).unwrap();
        assert_eq!(indices.len(), 6);
    }

    #[test]
    fn test_triangulate_concave() {
        // L-shape
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ];
        let indices = triangulate_polygon(&points).unwrap();
        assert_eq!(indices.len(), 12);
    }

    #[test]
    fn test_calculate_polygon_normal() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];

        let normal = calculate_polygon_normal(&points);
        assert_relative_eq!(normal.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cuboid_mesh_keeps_outward_winding() {
        let shape = cuboid([0.0, 0.0, 0.0], [1.0, 2.0, 3.0]);
        let mesh = triangulate_shape(&shape);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(mesh.is_closed());
        assert_relative_eq!(mesh.signed_volume(), 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_face_with_hole() {
        let mut shape = Shape::default();
        let outer = [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]];
        let hole = [[1.0, 1.0], [1.0, 3.0], [3.0, 3.0], [3.0, 1.0]];
        for p in outer.iter().chain(hole.iter()) {
            shape.vertices.push(Point3::new(p[0], p[1], 0.0));
        }
        let face = Face {
            bounds: vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]],
        };
        shape.shells.push(Shell {
            kind: ShellKind::Open,
            faces: vec![face.clone()],
        });

        let triangles = triangulate_face(&shape, &face);
        let area: f64 = triangles
            .iter()
            .map(|[a, b, c]| {
                let (pa, pb, pc) = (shape.vertices[*a], shape.vertices[*b], shape.vertices[*c]);
                (pb - pa).cross(&(pc - pa)).z / 2.0
            })
            .sum();
        assert_relative_eq!(area, 12.0, epsilon = 1e-9);
    }
}
