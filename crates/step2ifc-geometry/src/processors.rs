// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Item processors for STEP boundary representations
//!
//! Line, polyline, circle and ellipse edges are supported. Faces may lie on
//! planes, cylinders or cones; a curved face is split along its rulings
//! between the chord points of its two boundary runs.

use crate::curve::{ChordTolerance, Conic, Frame};
use crate::router::ItemProcessor;
use crate::shape::{newell, Face, ShapeBuilder, Shell, ShellKind};
use crate::{GeometryError, Result};
use nalgebra::Point3;
use std::f64::consts::{PI, TAU};
use std::sync::Arc;
use step2ifc_model::{DecodedEntity, EntityId, EntityResolver, StepType};

// ============================================================================
// Solid breps
// ============================================================================

/// MANIFOLD_SOLID_BREP, FACETED_BREP and BREP_WITH_VOIDS
///
/// `(name, outer)` plus `voids` at index 2 for BREP_WITH_VOIDS.
pub struct SolidBrepProcessor;

impl SolidBrepProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SolidBrepProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemProcessor for SolidBrepProcessor {
    fn load(
        &self,
        entity: &DecodedEntity,
        resolver: &dyn EntityResolver,
        builder: &mut ShapeBuilder,
    ) -> Result<()> {
        let outer = entity
            .get_ref(1)
            .ok_or_else(|| GeometryError::invalid_attribute(entity.id, 1, "missing outer shell"))?;
        let reader = TopologyReader { resolver };
        reader.read_shell(outer, ShellKind::Closed, builder)?;

        if entity.step_type == StepType::BrepWithVoids {
            for void in entity.get_refs(2).unwrap_or_default() {
                reader.read_shell(void, ShellKind::Void, builder)?;
            }
        }
        Ok(())
    }

    fn supported_types(&self) -> Vec<StepType> {
        vec![
            StepType::ManifoldSolidBrep,
            StepType::FacetedBrep,
            StepType::BrepWithVoids,
        ]
    }
}

// ============================================================================
// Surface models
// ============================================================================

/// SHELL_BASED_SURFACE_MODEL(name, sbsm_boundary)
///
/// Closed shells in the boundary are kept as solids; open shells stay open.
pub struct SurfaceModelProcessor;

impl SurfaceModelProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SurfaceModelProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemProcessor for SurfaceModelProcessor {
    fn load(
        &self,
        entity: &DecodedEntity,
        resolver: &dyn EntityResolver,
        builder: &mut ShapeBuilder,
    ) -> Result<()> {
        let boundary = entity
            .get_refs(1)
            .ok_or_else(|| GeometryError::invalid_attribute(entity.id, 1, "missing boundary"))?;
        let reader = TopologyReader { resolver };
        for shell_id in boundary {
            let shell = resolver
                .get(shell_id)
                .ok_or_else(|| GeometryError::entity_not_found(shell_id))?;
            let kind = if shell.step_type == StepType::OpenShell {
                ShellKind::Open
            } else {
                ShellKind::Closed
            };
            reader.read_shell(shell_id, kind, builder)?;
        }
        Ok(())
    }

    fn supported_types(&self) -> Vec<StepType> {
        vec![StepType::ShellBasedSurfaceModel]
    }
}


// ============================================================================
// Topology
// ============================================================================

/// Keyword of an entity, or its partial types for a complex instance
fn keyword(entity: &DecodedEntity) -> String {
    if entity.is_complex() {
        let names: Vec<&str> = entity.components.iter().map(|c| c.step_type.name()).collect();
        names.join(" ")
    } else {
        entity.step_type.name().to_string()
    }
}

/// Geometry a face lies on
enum FaceGeometry {
    Planar,
    /// Cylinder or cone about the frame's Z axis
    Ruled { frame: Frame, surface: StepType },
}

/// Vertices and sense of an EDGE_CURVE
struct EdgeSpan {
    start: [f64; 3],
    end: [f64; 3],
    closed: bool,
    same_sense: bool,
}

struct TopologyReader<'a> {
    resolver: &'a dyn EntityResolver,
}

impl TopologyReader<'_> {
    fn get(&self, id: EntityId) -> Result<Arc<DecodedEntity>> {
        self.resolver
            .get(id)
            .ok_or_else(|| GeometryError::entity_not_found(id))
    }

    /// CLOSED_SHELL / OPEN_SHELL `(name, faces)` or
    /// ORIENTED_CLOSED_SHELL `(name, *, element, orientation)`
    fn read_shell(&self, id: EntityId, kind: ShellKind, builder: &mut ShapeBuilder) -> Result<()> {
        let (face_ids, flip) = self.shell_faces(id, 0)?;

        let mut faces = Vec::with_capacity(face_ids.len());
        for face_id in face_ids {
            faces.extend(self.read_face(face_id, flip, builder)?);
        }
        builder.push_shell(Shell { kind, faces });
        Ok(())
    }

    fn shell_faces(&self, id: EntityId, depth: u8) -> Result<(Vec<EntityId>, bool)> {
        let shell = self.get(id)?;
        match shell.step_type {
            StepType::ClosedShell | StepType::OpenShell => {
                let faces = shell
                    .get_refs(1)
                    .ok_or_else(|| GeometryError::invalid_attribute(id, 1, "missing faces"))?;
                Ok((faces, false))
            }
            StepType::OrientedClosedShell if depth < 4 => {
                let element = shell.get_ref(2).ok_or_else(|| {
                    GeometryError::invalid_attribute(id, 2, "missing closed shell element")
                })?;
                let (faces, flip) = self.shell_faces(element, depth + 1)?;
                let same = shell.get_bool(3).unwrap_or(true);
                Ok((faces, flip != !same))
            }
            _ => Err(GeometryError::unsupported_type(keyword(&shell))),
        }
    }

    /// ADVANCED_FACE / FACE_SURFACE `(name, bounds, geometry, same_sense)` or
    /// FACE `(name, bounds)`
    ///
    /// Planar faces come back whole; curved faces as triangles.
    fn read_face(&self, id: EntityId, flip: bool, builder: &mut ShapeBuilder) -> Result<Vec<Face>> {
        let face = self.get(id)?;
        let (geometry, same_sense) = match face.step_type {
            StepType::AdvancedFace | StepType::FaceSurface => {
                let geometry = match face.get_ref(2) {
                    Some(surface) => self.face_geometry(surface)?,
                    None => FaceGeometry::Planar,
                };
                (geometry, face.get_bool(3).unwrap_or(true))
            }
            StepType::Face => (FaceGeometry::Planar, true),
            ref other => {
                log::warn!("Skipping unsupported face {} ({})", id, other.name());
                return Ok(Vec::new());
            }
        };

        let mut outer: Option<Vec<usize>> = None;
        let mut loops: Vec<Vec<usize>> = Vec::new();
        for bound_id in face.get_refs(1).unwrap_or_default() {
            let bound = self.get(bound_id)?;
            let loop_id = bound
                .get_ref(1)
                .ok_or_else(|| GeometryError::invalid_attribute(bound_id, 1, "missing loop"))?;
            let mut indices = self.read_loop(loop_id, builder)?;
            if indices.is_empty() {
                continue;
            }
            if !bound.get_bool(2).unwrap_or(true) {
                indices.reverse();
            }
            if bound.step_type == StepType::FaceOuterBound && outer.is_none() {
                outer = Some(indices);
            } else {
                loops.push(indices);
            }
        }

        let mut faces = match geometry {
            FaceGeometry::Planar => {
                // A lone vertex bounds no area on a plane
                loops.retain(|l| l.len() > 1);

                // Without an explicit outer bound, the largest loop bounds the face
                let outer = match outer {
                    Some(outer) => outer,
                    None => {
                        let points = builder.points();
                        let area = |l: &Vec<usize>| {
                            let pts: Vec<_> = l.iter().map(|&i| points[i]).collect();
                            newell(&pts).norm()
                        };
                        let Some(largest) = (0..loops.len())
                            .max_by(|&a, &b| area(&loops[a]).total_cmp(&area(&loops[b])))
                        else {
                            return Ok(Vec::new());
                        };
                        loops.remove(largest)
                    }
                };
                let mut bounds = Vec::with_capacity(loops.len() + 1);
                bounds.push(outer);
                bounds.extend(loops);
                vec![Face { bounds }]
            }
            FaceGeometry::Ruled { frame, surface } => {
                let mut bounds: Vec<Vec<usize>> = outer.into_iter().collect();
                bounds.extend(loops);
                ruled_faces(&frame, &surface, &bounds, builder.points())?
            }
        };

        if same_sense == flip {
            for face in &mut faces {
                face.flip();
            }
        }
        Ok(faces)
    }

    /// PLANE `(name, position)`, CYLINDRICAL_SURFACE `(name, position, radius)`
    /// or CONICAL_SURFACE `(name, position, radius, semi_angle)`
    fn face_geometry(&self, id: EntityId) -> Result<FaceGeometry> {
        let surface = self.get(id)?;
        match surface.step_type {
            StepType::Plane => Ok(FaceGeometry::Planar),
            StepType::CylindricalSurface | StepType::ConicalSurface => {
                let position = surface
                    .get_ref(1)
                    .ok_or_else(|| GeometryError::invalid_attribute(id, 1, "missing position"))?;
                Ok(FaceGeometry::Ruled {
                    frame: self.frame(position)?,
                    surface: surface.step_type.clone(),
                })
            }
            _ => Err(GeometryError::unsupported_type(keyword(&surface))),
        }
    }

    /// POLY_LOOP `(name, polygon)`, EDGE_LOOP `(name, edge_list)` or
    /// VERTEX_LOOP `(name, loop_vertex)`
    fn read_loop(&self, id: EntityId, builder: &mut ShapeBuilder) -> Result<Vec<usize>> {
        let entity = self.get(id)?;
        let mut indices = match entity.step_type {
            StepType::PolyLoop => {
                let mut indices = Vec::new();
                for point in entity.get_refs(1).unwrap_or_default() {
                    indices.push(builder.vertex(self.point(point)?));
                }
                indices
            }
            StepType::EdgeLoop => {
                let chords = builder.chords();
                let mut indices = Vec::new();
                for edge in entity.get_refs(1).unwrap_or_default() {
                    for p in self.edge_points(edge, &chords)? {
                        indices.push(builder.vertex(p));
                    }
                }
                indices
            }
            StepType::VertexLoop => match entity.get_ref(1) {
                Some(vertex) => vec![builder.vertex(self.vertex_point(vertex)?)],
                None => Vec::new(),
            },
            _ => Vec::new(),
        };

        indices.dedup();
        while indices.len() > 1 && indices.first() == indices.last() {
            indices.pop();
        }
        Ok(indices)
    }

    /// Points of an ORIENTED_EDGE `(name, *, *, edge_element, orientation)` or
    /// of a bare EDGE_CURVE `(name, start, end, geometry, same_sense)` in
    /// traversal order, without the final vertex
    fn edge_points(&self, id: EntityId, chords: &ChordTolerance) -> Result<Vec<[f64; 3]>> {
        let edge = self.get(id)?;
        let (curve_id, forward) = match edge.step_type {
            StepType::OrientedEdge => (
                edge.get_ref(3).ok_or_else(|| {
                    GeometryError::invalid_attribute(id, 3, "missing edge element")
                })?,
                edge.get_bool(4).unwrap_or(true),
            ),
            _ => (id, true),
        };

        let curve = self.get(curve_id)?;
        let vertex = |index: usize| {
            curve
                .get_ref(index)
                .ok_or_else(|| GeometryError::invalid_attribute(curve_id, index, "missing vertex"))
        };
        let (start_id, end_id) = (vertex(1)?, vertex(2)?);
        let span = EdgeSpan {
            start: self.vertex_point(start_id)?,
            end: self.vertex_point(end_id)?,
            closed: start_id == end_id,
            same_sense: curve.get_bool(4).unwrap_or(true),
        };
        let interior = match curve.get_ref(3) {
            Some(geometry) => self.curve_interior(geometry, &span, chords, 0)?,
            None => Vec::new(),
        };

        let mut points = Vec::with_capacity(interior.len() + 1);
        if forward {
            points.push(span.start);
            points.extend(interior);
        } else {
            points.push(span.end);
            points.extend(interior.into_iter().rev());
        }
        Ok(points)
    }

    /// Chord points of an edge's curve strictly between its vertices, from
    /// start to end
    fn curve_interior(
        &self,
        id: EntityId,
        span: &EdgeSpan,
        chords: &ChordTolerance,
        depth: u8,
    ) -> Result<Vec<[f64; 3]>> {
        let curve = self.get(id)?;
        let number = |index: usize, what: &str| {
            curve
                .get_float(index)
                .ok_or_else(|| GeometryError::invalid_attribute(id, index, format!("missing {}", what)))
        };
        let position = || {
            curve
                .get_ref(1)
                .ok_or_else(|| GeometryError::invalid_attribute(id, 1, "missing position"))
        };

        let conic = match curve.step_type {
            StepType::Line => return Ok(Vec::new()),
            StepType::Polyline => {
                let mut points = Vec::new();
                for point in curve.get_refs(1).unwrap_or_default() {
                    points.push(self.point(point)?);
                }
                if !span.same_sense {
                    points.reverse();
                }
                // The first and last polyline points are the edge vertices
                if points.len() < 3 {
                    return Ok(Vec::new());
                }
                return Ok(points[1..points.len() - 1].to_vec());
            }
            StepType::SurfaceCurve | StepType::SeamCurve if depth < 4 => {
                let curve_3d = curve
                    .get_ref(1)
                    .ok_or_else(|| GeometryError::invalid_attribute(id, 1, "missing 3D curve"))?;
                return self.curve_interior(curve_3d, span, chords, depth + 1);
            }
            StepType::Circle => Conic::circle(self.frame(position()?)?, number(2, "radius")?),
            StepType::Ellipse => Conic::ellipse(
                self.frame(position()?)?,
                number(2, "first semi axis")?,
                number(3, "second semi axis")?,
            ),
            _ => return Err(GeometryError::unsupported_type(keyword(&curve))),
        };

        Ok(conic.interior(span.start, span.end, span.closed, span.same_sense, chords))
    }

    /// AXIS2_PLACEMENT_3D `(name, location, axis, ref_direction)`
    fn frame(&self, id: EntityId) -> Result<Frame> {
        let placement = self.get(id)?;
        if placement.step_type != StepType::Axis2Placement3d {
            return Err(GeometryError::unsupported_type(keyword(&placement)));
        }
        let location = placement
            .get_ref(1)
            .ok_or_else(|| GeometryError::invalid_attribute(id, 1, "missing location"))?;
        let axis = placement.get_ref(2).map(|d| self.point(d)).transpose()?;
        let ref_direction = placement.get_ref(3).map(|d| self.point(d)).transpose()?;
        Ok(Frame::from_axes(self.point(location)?, axis, ref_direction))
    }

    /// VERTEX_POINT `(name, vertex_geometry)`
    fn vertex_point(&self, id: EntityId) -> Result<[f64; 3]> {
        let vertex = self.get(id)?;
        let point = vertex
            .get_ref(1)
            .ok_or_else(|| GeometryError::invalid_attribute(id, 1, "missing vertex geometry"))?;
        self.point(point)
    }

    /// CARTESIAN_POINT `(name, coordinates)` or DIRECTION `(name, ratios)`
    fn point(&self, id: EntityId) -> Result<[f64; 3]> {
        let point = self.get(id)?;
        let coords = point
            .get_list(1)
            .ok_or_else(|| GeometryError::invalid_attribute(id, 1, "missing coordinates"))?;
        let get = |i: usize| coords.get(i).and_then(|v| v.as_float());
        match (get(0), get(1)) {
            (Some(x), Some(y)) => Ok([x, y, get(2).unwrap_or(0.0)]),
            _ => Err(GeometryError::invalid_attribute(id, 1, "non-numeric coordinates")),
        }
    }
}

// ============================================================================
// Ruled faces
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Level {
    Low,
    High,
}

/// Angle folded into `[-PI, PI)`
fn wrap(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Angles along a run without jumps, starting near `reference`
fn unwrapped(run: &[usize], reference: f64, angle: impl Fn(usize) -> f64) -> Vec<f64> {
    let mut previous = reference;
    run.iter()
        .map(|&i| {
            previous += wrap(angle(i) - previous);
            previous
        })
        .collect()
}

/// Triangles of a cylindrical or conical face
///
/// The face must be bounded by one run of points at each end of its height
/// range: either a single loop whose runs are joined by ruling edges, or a
/// separate loop per end. Triangles follow the loop winding.
fn ruled_faces(
    frame: &Frame,
    surface: &StepType,
    bounds: &[Vec<usize>],
    points: &[Point3<f64>],
) -> Result<Vec<Face>> {
    let unsupported = || GeometryError::unsupported_type(surface.name());
    let height = |i: usize| frame.height_of(&points[i]);
    let angle = |i: usize| frame.angle_of(&points[i]);

    let (low, high) = bounds
        .iter()
        .flatten()
        .map(|&i| height(i))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), h| (lo.min(h), hi.max(h)));
    let tolerance = 1e-6 * (high - low).max(1.0);
    if high - low <= tolerance {
        return Ok(Vec::new());
    }
    let level = |i: usize| {
        let h = height(i);
        if (h - low).abs() <= tolerance {
            Some(Level::Low)
        } else if (high - h).abs() <= tolerance {
            Some(Level::High)
        } else {
            None
        }
    };
    let uniform = |l: &[usize]| {
        let first = l.first().and_then(|&i| level(i))?;
        l.iter().all(|&i| level(i) == Some(first)).then_some(first)
    };

    // Both runs end up in the same direction around the axis
    let (bottom, top) = match bounds {
        [single] => {
            let levels = single
                .iter()
                .map(|&i| level(i).ok_or_else(unsupported))
                .collect::<Result<Vec<_>>>()?;
            let n = single.len();
            let start = (0..n)
                .find(|&k| levels[k] != levels[(k + n - 1) % n])
                .ok_or_else(unsupported)?;

            let mut runs: Vec<(Level, Vec<usize>)> = Vec::new();
            for k in 0..n {
                let at = (start + k) % n;
                match runs.last_mut() {
                    Some((current, run)) if *current == levels[at] => run.push(single[at]),
                    _ => runs.push((levels[at], vec![single[at]])),
                }
            }
            match runs.as_slice() {
                [(Level::Low, b), (Level::High, t)] | [(Level::High, t), (Level::Low, b)] => {
                    (b.clone(), t.iter().rev().copied().collect::<Vec<_>>())
                }
                _ => return Err(unsupported()),
            }
        }
        [first, second] => {
            let (low_loop, high_loop) = match (uniform(first.as_slice()), uniform(second.as_slice())) {
                (Some(Level::Low), Some(Level::High)) => (first, second),
                (Some(Level::High), Some(Level::Low)) => (second, first),
                _ => return Err(unsupported()),
            };
            let mut bottom = low_loop.clone();
            bottom.push(low_loop[0]);

            // Start the top run on the ruling through the bottom's start
            let mut top: Vec<usize> = high_loop.iter().rev().copied().collect();
            let reference = angle(bottom[0]);
            let nearest = (0..top.len())
                .min_by(|&a, &b| {
                    wrap(angle(top[a]) - reference)
                        .abs()
                        .total_cmp(&wrap(angle(top[b]) - reference).abs())
                })
                .unwrap_or(0);
            top.rotate_left(nearest);
            top.push(top[0]);
            (bottom, top)
        }
        _ => return Err(unsupported()),
    };

    let mut ub = unwrapped(&bottom, angle(bottom[0]), angle);
    let mut ut = unwrapped(&top, ub[0], angle);
    let span = |u: &[f64]| u[u.len() - 1] - u[0];
    if span(&ub) + span(&ut) < 0.0 {
        ub.iter_mut().for_each(|u| *u = -*u);
        ut.iter_mut().for_each(|u| *u = -*u);
    }

    let mut faces = Vec::with_capacity(bottom.len() + top.len());
    let (mut i, mut j) = (0, 0);
    while i + 1 < bottom.len() || j + 1 < top.len() {
        let advance_bottom = j + 1 == top.len() || (i + 1 < bottom.len() && ub[i + 1] <= ut[j + 1]);
        let triangle = if advance_bottom {
            i += 1;
            [bottom[i - 1], bottom[i], top[j]]
        } else {
            j += 1;
            [bottom[i], top[j], top[j - 1]]
        };
        if triangle[0] != triangle[1] && triangle[1] != triangle[2] && triangle[0] != triangle[2] {
            faces.push(Face {
                bounds: vec![triangle.to_vec()],
            });
        }
    }
    Ok(faces)
}
