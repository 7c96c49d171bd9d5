// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core traits for assembly ingest

use crate::{AssemblyTree, IngestError};
use std::path::Path;

/// Entry point turning a STEP source into an assembly tree
///
/// Implementations traverse the product structure, attach shape handles and
/// cumulative transforms, and assign occurrence indices by raw name in
/// traversal order. A source without assembly metadata becomes a flat
/// one-level tree of its bare shapes.
///
/// # Example
///
/// ```ignore
/// use step2ifc_model::AssemblyReader;
///
/// let reader: Box<dyn AssemblyReader> = Box::new(StepReader::new());
/// let tree = reader.read(Path::new("skid.stp"))?;
/// println!("{} parts", tree.part_count());
/// ```
pub trait AssemblyReader: Send + Sync {
    /// Read a file from disk
    ///
    /// Fails with [`IngestError`] when the file is unreadable or holds no
    /// products and no solids.
    fn read(&self, path: &Path) -> Result<AssemblyTree, IngestError>;

    /// Read already-loaded content; `source_name` names synthetic roots
    fn read_str(&self, content: &str, source_name: &str) -> Result<AssemblyTree, IngestError>;
}
