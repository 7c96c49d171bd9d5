// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! step2ifc Model - Shared types and traits for STEP → IFC conversion
//!
//! This crate holds the abstractions every stage of the converter agrees on.
//! Parser backends produce an [`AssemblyTree`] through the [`AssemblyReader`]
//! trait; geometry and authoring stages consume it through the
//! [`EntityResolver`] trait without knowing which backend produced it.
//!
//! # Architecture
//!
//! - [`EntityResolver`] - Entity lookup and reference resolution over a STEP data section
//! - [`AssemblyReader`] - Entry point turning a STEP source into an assembly tree
//! - [`AssemblyTree`] / [`Part`] - Product structure with stable traversal indices
//! - [`Transform`] - Cumulative placement of a part in the root coordinate system
//! - [`GeometryMetrics`] - Per-part validation outcome and measurements
//!
//! # Example
//!
//! ```ignore
//! use step2ifc_model::{AssemblyReader, EntityId};
//!
//! let tree = reader.read(Path::new("pump.step"))?;
//! for part in tree.iter() {
//!     println!("{} {} occ={}", part.id, part.name, part.occurrence_index);
//! }
//! ```

pub mod assembly;
pub mod error;
pub mod metrics;
pub mod resolver;
pub mod traits;
pub mod transform;
pub mod types;

// Re-export all public types
pub use assembly::*;
pub use error::*;
pub use metrics::*;
pub use resolver::*;
pub use traits::*;
pub use transform::*;
pub use types::*;
