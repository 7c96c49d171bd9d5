// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology validation and healing
//!
//! A healing pass runs, in order: sewing, degenerate-face removal, face
//! reorientation and shell inversion. Each step only acts on the defect that
//! validation reports for it, so healing a valid shape is a no-op.

use crate::shape::{newell, Shape, Shell, ShellKind};
use nalgebra::Point3;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use step2ifc_model::{Defect, RepairAction, ValidityStatus};

/// Result of [`heal`]
#[derive(Clone, Debug, PartialEq)]
pub struct HealReport {
    pub status: ValidityStatus,
    pub repairs: Vec<RepairAction>,
    /// Defects left after the last pass
    pub defects: Vec<Defect>,
    pub passes: u32,
}

/// Heal `shape` in place with at most `max_passes` passes
pub fn heal(shape: &mut Shape, max_passes: u32, tolerance: f64) -> HealReport {
    let mut repairs = Vec::new();
    let mut passes = 0;
    while passes < max_passes {
        let actions = heal_pass(shape, tolerance);
        if actions.is_empty() {
            break;
        }
        passes += 1;
        repairs.extend(actions);
    }

    let defects = validate(shape, tolerance);
    let status = if !defects.is_empty() {
        ValidityStatus::Invalid
    } else if repairs.is_empty() {
        ValidityStatus::Ok
    } else {
        ValidityStatus::Repaired
    };

    HealReport {
        status,
        repairs,
        defects,
        passes,
    }
}

/// One healing pass; returns the repairs performed
pub fn heal_pass(shape: &mut Shape, tolerance: f64) -> Vec<RepairAction> {
    let mut actions = Vec::new();

    let merged = sew(shape, tolerance);
    if merged > 0 {
        actions.push(RepairAction::Sewed {
            merged_vertices: merged,
        });
    }

    let removed = remove_degenerate(shape, tolerance);
    if removed > 0 {
        actions.push(RepairAction::RemovedDegenerateFaces { count: removed });
    }

    let reoriented: usize = shape.shells.iter_mut().map(reorient_shell).sum();
    if reoriented > 0 {
        actions.push(RepairAction::ReorientedFaces { count: reoriented });
    }

    for index in 0..shape.shells.len() {
        if is_inverted(shape, &shape.shells[index]) {
            shape.shells[index].flip();
            actions.push(RepairAction::InvertedShell { shell: index });
        }
    }

    actions
}

/// List the defects of `shape` without modifying it
pub fn validate(shape: &Shape, tolerance: f64) -> Vec<Defect> {
    let mut defects = Vec::new();
    if shape.is_empty() {
        defects.push(Defect::Empty);
        return defects;
    }

    let unsewn = sew_map(shape, tolerance).1;
    if unsewn > 0 {
        defects.push(Defect::UnsewnVertices { count: unsewn });
    }

    let degenerate: usize = shape
        .shells
        .iter()
        .flat_map(|s| s.faces.iter())
        .flat_map(|f| f.bounds.iter())
        .filter(|b| is_degenerate_loop(&shape.vertices, b, tolerance))
        .count();
    if degenerate > 0 {
        defects.push(Defect::DegenerateFaces { count: degenerate });
    }

    for (index, shell) in shape.shells.iter().enumerate() {
        if shell.kind == ShellKind::Open {
            defects.push(Defect::OpenShell { shell: index });
            continue;
        }

        let stats = edge_stats(shell);
        if stats.open > 0 {
            defects.push(Defect::OpenEdges {
                shell: index,
                count: stats.open,
            });
        }
        if stats.non_manifold > 0 {
            defects.push(Defect::NonManifoldEdges {
                shell: index,
                count: stats.non_manifold,
            });
        }
        if stats.same_direction > 0 {
            defects.push(Defect::InconsistentOrientation {
                shell: index,
                count: stats.same_direction,
            });
        }
        if is_inverted(shape, shell) {
            defects.push(Defect::InvertedShell { shell: index });
        }
    }

    defects
}

// ============================================================================
// Sewing
// ============================================================================

/// Grid cell of a point at the sewing tolerance
fn cell(p: &Point3<f64>, tolerance: f64) -> [i64; 3] {
    [
        (p.x / tolerance).round() as i64,
        (p.y / tolerance).round() as i64,
        (p.z / tolerance).round() as i64,
    ]
}

/// Representative of every vertex, and how many referenced vertices would merge
fn sew_map(shape: &Shape, tolerance: f64) -> (Vec<usize>, usize) {
    let mut referenced = vec![false; shape.vertices.len()];
    for face in shape.shells.iter().flat_map(|s| s.faces.iter()) {
        for &i in face.bounds.iter().flatten() {
            referenced[i] = true;
        }
    }

    let mut map: Vec<usize> = (0..shape.vertices.len()).collect();
    let mut cells: FxHashMap<[i64; 3], usize> = FxHashMap::default();
    let mut merged = 0;
    for (i, p) in shape.vertices.iter().enumerate() {
        if !referenced[i] {
            continue;
        }
        let rep = *cells.entry(cell(p, tolerance)).or_insert(i);
        if rep != i {
            map[i] = rep;
            merged += 1;
        }
    }
    (map, merged)
}

/// Merge coincident vertices; returns the number merged
fn sew(shape: &mut Shape, tolerance: f64) -> usize {
    let (map, merged) = sew_map(shape, tolerance);
    if merged == 0 {
        return 0;
    }
    for shell in &mut shape.shells {
        for face in &mut shell.faces {
            for bound in &mut face.bounds {
                for i in bound.iter_mut() {
                    *i = map[*i];
                }
                bound.dedup();
                while bound.len() > 1 && bound.first() == bound.last() {
                    bound.pop();
                }
            }
        }
    }
    merged
}

// ============================================================================
// Degenerate faces
// ============================================================================

fn is_degenerate_loop(vertices: &[Point3<f64>], bound: &[usize], tolerance: f64) -> bool {
    if bound.len() < 3 {
        return true;
    }
    let points: Vec<Point3<f64>> = bound.iter().map(|&i| vertices[i]).collect();
    newell(&points).norm() / 2.0 < tolerance * tolerance
}

/// Drop faces whose outer loop has no area and hole loops without area
fn remove_degenerate(shape: &mut Shape, tolerance: f64) -> usize {
    let mut removed = 0;
    let vertices = &shape.vertices;

    for shell in shape.shells.iter_mut() {
        shell.faces.retain_mut(|face| {
            let outer_ok = face
                .bounds
                .first()
                .is_some_and(|outer| !is_degenerate_loop(vertices, outer, tolerance));
            if !outer_ok {
                removed += 1;
                return false;
            }
            let before = face.bounds.len();
            let mut first = true;
            face.bounds.retain(|b| {
                let keep = first || !is_degenerate_loop(vertices, b, tolerance);
                first = false;
                keep
            });
            removed += before - face.bounds.len();
            true
        });
    }

    removed
}

// ============================================================================
// Orientation
// ============================================================================

#[derive(Default)]
struct EdgeStats {
    open: usize,
    non_manifold: usize,
    same_direction: usize,
}

/// Undirected edge -> (face, traversed low-to-high)
fn edge_uses(shell: &Shell) -> FxHashMap<(usize, usize), Vec<(usize, bool)>> {
    let mut uses: FxHashMap<(usize, usize), Vec<(usize, bool)>> = FxHashMap::default();
    for (f, face) in shell.faces.iter().enumerate() {
        for (a, b) in face.edges() {
            let key = (a.min(b), a.max(b));
            uses.entry(key).or_default().push((f, a < b));
        }
    }
    uses
}

fn edge_stats(shell: &Shell) -> EdgeStats {
    let mut stats = EdgeStats::default();
    for uses in edge_uses(shell).values() {
        match uses.len() {
            1 => stats.open += 1,
            2 if uses[0].1 == uses[1].1 => stats.same_direction += 1,
            2 => {}
            _ => stats.non_manifold += 1,
        }
    }
    stats
}

/// Make face windings agree across manifold edges; returns faces flipped
///
/// Within each connected patch the smaller of the two orientation classes is
/// flipped.
fn reorient_shell(shell: &mut Shell) -> usize {
    let n = shell.faces.len();
    let uses = edge_uses(shell);

    // face -> (neighbour, must flip relative to face)
    let mut adjacency: Vec<Vec<(usize, bool)>> = vec![Vec::new(); n];
    for pair in uses.values().filter(|u| u.len() == 2) {
        let ((f, fd), (g, gd)) = (pair[0], pair[1]);
        if f == g {
            continue;
        }
        adjacency[f].push((g, fd == gd));
        adjacency[g].push((f, fd == gd));
    }

    let mut parity: Vec<Option<bool>> = vec![None; n];
    let mut to_flip = Vec::new();
    for seed in 0..n {
        if parity[seed].is_some() {
            continue;
        }
        parity[seed] = Some(false);
        let mut component = vec![seed];
        let mut queue = VecDeque::from([seed]);
        while let Some(f) = queue.pop_front() {
            let pf = parity[f].unwrap_or(false);
            for &(g, differs) in &adjacency[f] {
                if parity[g].is_none() {
                    parity[g] = Some(pf ^ differs);
                    component.push(g);
                    queue.push_back(g);
                }
            }
        }

        let flipped: Vec<usize> = component
            .iter()
            .copied()
            .filter(|&f| parity[f] == Some(true))
            .collect();
        if flipped.len() * 2 > component.len() {
            to_flip.extend(component.iter().copied().filter(|&f| parity[f] == Some(false)));
        } else {
            to_flip.extend(flipped);
        }
    }

    for &f in &to_flip {
        shell.faces[f].flip();
    }
    to_flip.len()
}

/// Closed shell pointing inward, or void shell pointing outward
fn is_inverted(shape: &Shape, shell: &Shell) -> bool {
    let volume = shape.shell_volume(shell);
    match shell.kind {
        ShellKind::Closed => volume < 0.0,
        ShellKind::Void => volume > 0.0,
        ShellKind::Open => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::fixtures::cuboid;
    use crate::shape::Face;

    const TOL: f64 = 1e-6;

    #[test]
    fn test_valid_shape_is_ok_and_untouched() {
        let mut shape = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let before = shape.clone();
        let report = heal(&mut shape, 3, TOL);
        assert_eq!(report.status, ValidityStatus::Ok);
        assert!(report.repairs.is_empty());
        assert_eq!(shape, before);
    }

    #[test]
    fn test_single_flipped_face_is_reoriented() {
        let mut shape = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        shape.shells[0].faces[2].flip();
        let report = heal(&mut shape, 3, TOL);
        assert_eq!(report.status, ValidityStatus::Repaired);
        assert_eq!(report.repairs, vec![RepairAction::ReorientedFaces { count: 1 }]);
        assert!(shape.shell_volume(&shape.shells[0]) > 0.0);
    }

    #[test]
    fn test_inverted_shell_is_flipped() {
        let mut shape = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        shape.shells[0].flip();
        let report = heal(&mut shape, 3, TOL);
        assert_eq!(report.status, ValidityStatus::Repaired);
        assert_eq!(report.repairs, vec![RepairAction::InvertedShell { shell: 0 }]);
    }

    #[test]
    fn test_healing_is_idempotent() {
        let mut shape = cuboid([0.0, 0.0, 0.0], [2.0, 1.0, 1.0]);
        shape.shells[0].flip();
        shape.shells[0].faces[0].flip();
        let first = heal(&mut shape, 3, TOL);
        assert_eq!(first.status, ValidityStatus::Repaired);

        let second = heal(&mut shape, 3, TOL);
        assert_eq!(second.status, ValidityStatus::Ok);
        assert!(second.repairs.is_empty());
    }

    #[test]
    fn test_near_coincident_vertices_are_sewn() {
        let mut shape = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        // Detach one corner of the top face by less than the tolerance
        let corner = shape.shells[0].faces[1].bounds[0][2];
        let p = shape.vertices[corner];
        shape.vertices.push(Point3::new(p.x + 1e-8, p.y, p.z));
        let copy = shape.vertices.len() - 1;
        shape.shells[0].faces[1].bounds[0][2] = copy;
        assert!(validate(&shape, TOL)
            .iter()
            .any(|d| matches!(d, Defect::UnsewnVertices { count: 1 })));

        let report = heal(&mut shape, 3, TOL);
        assert_eq!(report.status, ValidityStatus::Repaired);
        assert!(report
            .repairs
            .contains(&RepairAction::Sewed { merged_vertices: 1 }));
    }

    #[test]
    fn test_degenerate_face_removed() {
        let mut shape = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let a = shape.shells[0].faces[0].bounds[0][0];
        let b = shape.shells[0].faces[0].bounds[0][1];
        shape.shells[0].faces.push(Face {
            bounds: vec![vec![a, b, a]],
        });
        let report = heal(&mut shape, 3, TOL);
        assert!(report
            .repairs
            .contains(&RepairAction::RemovedDegenerateFaces { count: 1 }));
        assert_eq!(shape.face_count(), 6);
    }

    #[test]
    fn test_missing_face_is_invalid() {
        let mut shape = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        shape.shells[0].faces.pop();
        let report = heal(&mut shape, 3, TOL);
        assert_eq!(report.status, ValidityStatus::Invalid);
        assert!(report
            .defects
            .iter()
            .any(|d| matches!(d, Defect::OpenEdges { shell: 0, count: 4 })));
    }

    #[test]
    fn test_open_shell_is_invalid() {
        let mut shape = cuboid([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        shape.shells[0].kind = ShellKind::Open;
        let report = heal(&mut shape, 3, TOL);
        assert_eq!(report.status, ValidityStatus::Invalid);
        assert_eq!(report.defects, vec![Defect::OpenShell { shell: 0 }]);
    }

    #[test]
    fn test_empty_shape_is_invalid() {
        let mut shape = Shape::default();
        let report = heal(&mut shape, 3, TOL);
        assert_eq!(report.defects, vec![Defect::Empty]);
    }

    #[test]
    fn test_void_shell_points_inward() {
        let mut shape = cuboid([0.0, 0.0, 0.0], [4.0, 4.0, 4.0]);
        let cavity = cuboid([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]);
        let offset = shape.vertices.len();
        shape.vertices.extend(cavity.vertices.iter().copied());
        let mut void = cavity.shells[0].clone();
        void.kind = ShellKind::Void;
        for face in &mut void.faces {
            for bound in &mut face.bounds {
                for i in bound.iter_mut() {
                    *i += offset;
                }
            }
        }
        shape.shells.push(void);

        // Outward-wound void is inverted
        let report = heal(&mut shape, 3, TOL);
        assert_eq!(report.repairs, vec![RepairAction::InvertedShell { shell: 1 }]);
        assert!(shape.shell_volume(&shape.shells[1]) < 0.0);
    }
}
