// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # step2ifc Geometry Processing
//!
//! Turns the shape items of an assembly part into a healed boundary
//! representation and a triangle mesh. This crate uses the `EntityResolver`
//! trait from `step2ifc-model` for entity lookup, making it independent of
//! any specific parser implementation.
//!
//! ## Overview
//!
//! - **Loading**: B-rep and surface-model items are read into a [`Shape`]
//!   (shared vertex pool, shells of faces with hole loops). Circle and
//!   ellipse edges become chords sized by deflection and angle; cylindrical
//!   and conical faces are split along their rulings
//! - **Healing**: sewing, degenerate-face removal, face reorientation and
//!   shell inversion, in bounded passes
//! - **Triangulation**: planar faces with holes via earcutr
//! - **Metrics**: bounding box, signed volume and centroid of the placed mesh
//!
//! ## Architecture
//!
//! - [`ItemProcessor`]: Trait for individual shape item families
//! - [`ShapeRouter`]: Dispatch from STEP keyword to processor
//! - [`GeometryProcessor`]: Per-part entry point, sequential or on a rayon pool
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use step2ifc_geometry::{GeometryOptions, GeometryProcessor};
//!
//! let processor = GeometryProcessor::new(GeometryOptions::default())?;
//! for part in tree.leaves() {
//!     let (metrics, shape) = processor.process(part, tree.source.as_ref())?;
//!     println!("{}: {} ({} triangles)", part.name, metrics.status, shape.mesh.triangle_count());
//! }
//! ```

pub mod curve;
pub mod error;
pub mod heal;
pub mod mesh;
pub mod processor;
pub mod processors;
pub mod router;
pub mod shape;
pub mod triangulation;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point2, Point3, Vector2, Vector3};

// Re-export main types
pub use curve::{ChordTolerance, Conic, Frame};
pub use error::{GeometryError, Result};
pub use heal::{heal, heal_pass, validate, HealReport};
pub use mesh::TriangleMesh;
pub use processor::{GeometryOptions, GeometryProcessor, ProcessedShape};
pub use router::{ItemProcessor, ShapeRouter};
pub use shape::{Face, Shape, ShapeBuilder, Shell, ShellKind};
pub use triangulation::{
    calculate_polygon_normal, project_to_2d, project_to_2d_with_basis, triangulate_face,
    triangulate_polygon, triangulate_polygon_with_holes, triangulate_shape,
};

// Re-export processors
pub use processors::{SolidBrepProcessor, SurfaceModelProcessor};
