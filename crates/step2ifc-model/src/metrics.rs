// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry validation outcome and measurements

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Box around a set of points, `None` if empty
    pub fn from_points<I: IntoIterator<Item = [f64; 3]>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox {
            min: first,
            max: first,
        };
        for p in iter {
            bbox.include(p);
        }
        Some(bbox)
    }

    /// Grow to include a point
    pub fn include(&mut self, p: [f64; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// Union of two boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut out = *self;
        out.include(other.min);
        out.include(other.max);
        out
    }

    /// Edge lengths
    pub fn size(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// Flattened `[xmin, ymin, zmin, xmax, ymax, zmax]`
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2],
        ]
    }
}

/// Validity of a part's shape after healing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidityStatus {
    /// Valid as read; no repair performed
    Ok,
    /// Valid after one or more repairs
    Repaired,
    /// Still broken after the healing pass bound
    Invalid,
}

impl fmt::Display for ValidityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidityStatus::Ok => "OK",
            ValidityStatus::Repaired => "REPAIRED",
            ValidityStatus::Invalid => "INVALID",
        })
    }
}

/// A repair applied by the healer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    /// Coincident vertices merged
    Sewed { merged_vertices: usize },
    /// Faces or hole loops without area removed
    RemovedDegenerateFaces { count: usize },
    /// Faces flipped to agree with their neighbours
    ReorientedFaces { count: usize },
    /// Whole shell flipped so its normals point outward
    InvertedShell { shell: usize },
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairAction::Sewed { merged_vertices } => {
                write!(f, "sewed {} coincident vertices", merged_vertices)
            }
            RepairAction::RemovedDegenerateFaces { count } => {
                write!(f, "removed {} degenerate faces", count)
            }
            RepairAction::ReorientedFaces { count } => write!(f, "reoriented {} faces", count),
            RepairAction::InvertedShell { shell } => write!(f, "inverted shell {}", shell),
        }
    }
}

/// Topology defect found by validation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "defect", rename_all = "snake_case")]
pub enum Defect {
    /// No faces at all
    Empty,
    /// Distinct vertices within sewing tolerance
    UnsewnVertices { count: usize },
    /// Faces or loops with no area
    DegenerateFaces { count: usize },
    /// Edges used by only one face of a closed shell
    OpenEdges { shell: usize, count: usize },
    /// Edges shared by more than two faces
    NonManifoldEdges { shell: usize, count: usize },
    /// Edges traversed twice in the same direction
    InconsistentOrientation { shell: usize, count: usize },
    /// Closed shell whose normals point inward
    InvertedShell { shell: usize },
    /// Shell declared open; cannot bound a solid
    OpenShell { shell: usize },
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Defect::Empty => f.write_str("shape has no faces"),
            Defect::UnsewnVertices { count } => write!(f, "{} unsewn vertices", count),
            Defect::DegenerateFaces { count } => write!(f, "{} degenerate faces", count),
            Defect::OpenEdges { shell, count } => {
                write!(f, "shell {} has {} open edges", shell, count)
            }
            Defect::NonManifoldEdges { shell, count } => {
                write!(f, "shell {} has {} non-manifold edges", shell, count)
            }
            Defect::InconsistentOrientation { shell, count } => {
                write!(f, "shell {} has {} inconsistently oriented edges", shell, count)
            }
            Defect::InvertedShell { shell } => write!(f, "shell {} is inside out", shell),
            Defect::OpenShell { shell } => write!(f, "shell {} is open", shell),
        }
    }
}

/// Per-part measurements and validation outcome
///
/// Measured on the world-placed shape, in the source file's working units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryMetrics {
    pub bbox: Option<BoundingBox>,
    /// Signed volume; positive for outward-oriented closed shells
    pub volume: f64,
    pub centroid: Option<[f64; 3]>,
    pub status: ValidityStatus,
    pub repairs: Vec<RepairAction>,
    /// Defects still present after healing (empty unless `status` is Invalid)
    pub defects: Vec<Defect>,
}

impl GeometryMetrics {
    /// Check if the shape is usable as a solid
    pub fn is_valid(&self) -> bool {
        self.status != ValidityStatus::Invalid
    }
}
