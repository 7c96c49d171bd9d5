// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! step2ifc parser - ISO 10303-21 reader for AP203/AP214 assemblies
//!
//! This crate turns STEP exchange files into an [`AssemblyTree`]. It
//! implements the traits defined in `step2ifc-model`.
//!
//! # Features
//!
//! - **Fast tokenization** using `nom` combinators
//! - **SIMD-accelerated scanning** using `memchr`
//! - **Lazy entity decoding** - only parse entities when needed
//! - **Complex instances** indexed under each partial type
//! - **Product structure** with cumulative occurrence placements
//!
//! # Example
//!
//! ```ignore
//! use step2ifc_parser::StepReader;
//! use step2ifc_model::AssemblyReader;
//!
//! let tree = StepReader::new().read(Path::new("skid.stp"))?;
//! for part in tree.iter() {
//!     println!("{} {}", part.full_path(), part.step_label);
//! }
//! ```

mod header;
mod model;
mod product;
mod resolver;
mod scanner;
mod tokenizer;
mod units;

pub use header::parse_header;
pub use model::ParsedStep;
pub use product::ProductStructure;
pub use resolver::StepResolver;
pub use scanner::EntityScanner;
pub use tokenizer::{decode_step_string, parse_entity, Token};
pub use units::{extract_length_unit, scales};

use step2ifc_model::{AssemblyReader, AssemblyTree, EntityResolver, IngestError};
use std::path::Path;
use std::sync::Arc;

/// STEP reader implementing [`AssemblyReader`]
#[derive(Default)]
pub struct StepReader;

impl StepReader {
    pub fn new() -> Self {
        Self
    }
}

impl AssemblyReader for StepReader {
    fn read(&self, path: &Path) -> Result<AssemblyTree, IngestError> {
        let bytes = std::fs::read(path).map_err(|e| IngestError::unreadable(path, e))?;
        let content = String::from_utf8_lossy(&bytes);
        let source_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        self.read_str(&content, &source_name)
    }

    fn read_str(&self, content: &str, source_name: &str) -> Result<AssemblyTree, IngestError> {
        let parsed =
            ParsedStep::parse(content).map_err(|e| IngestError::NotStep(e.to_string()))?;

        let unit = parsed.unit.clone().unwrap_or_else(|| {
            log::warn!("{} declares no length unit; assuming millimetres", source_name);
            Default::default()
        });

        let root = ProductStructure::new(parsed.resolver.as_ref(), source_name).build()?;
        let source: Arc<dyn EntityResolver> = parsed.resolver;

        Ok(AssemblyTree::new(
            root,
            source,
            parsed.metadata,
            unit,
            source_name,
        ))
    }
}

/// Quick read function for simple use cases
pub fn read(path: &Path) -> Result<AssemblyTree, IngestError> {
    StepReader::new().read(path)
}
