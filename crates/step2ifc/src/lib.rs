// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # step2ifc
//!
//! Converts STEP assemblies into IFC building models with rule-based typing,
//! deterministic GlobalIds and a quality-control report.
//!
//! ## Overview
//!
//! - **Ingest**: [`StepReader`] builds the assembly tree; names are normalized
//!   and occurrence indices reassigned by canonical name
//! - **Geometry**: every part is healed and measured on a bounded rayon pool
//! - **Mapping**: first-match rules pick the IFC class, property sets and
//!   classification ([`MappingEngine`])
//! - **Identity**: GUIDs derive from the source hash, assembly path, name and
//!   occurrence ([`GuidAllocator`])
//! - **Authoring**: [`IfcWriter`] builds Project, Site, Building and Storeys
//!   and contains every element in exactly one Storey
//! - **Reporting**: [`QcReport`] and the NDJSON [`AuditLogger`] trail
//! - **Auto mode**: [`AutoMapping`] derives name rules and the length unit
//!   from part names and proportions when no class map exists
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use step2ifc::{convert, ConversionConfig, TypeMappingRule};
//!
//! let config = ConversionConfig {
//!     type_mappings: vec![TypeMappingRule::by_name("^Valve", "IfcValve")],
//!     ..Default::default()
//! };
//! let mut result = convert(Path::new("plant.step"), &config)?;
//! result.write_artifacts(Path::new("out"), "plant")?;
//! println!("{:?}: {}", result.outcome(), result.qc_report.to_text());
//! ```

pub mod audit;
pub mod auto;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod expression;
pub mod guid;
pub mod mapping;
pub mod pipeline;
pub mod qc;
pub mod writer;

pub use audit::{AuditEvent, AuditLogger, AuditRecord};
pub use auto::{AutoMapping, GeneratedRule, ShapeClass, UnitInference};
pub use config::{
    ClassificationMapping, CompiledConfig, ConversionConfig, DataType, GeometryMode, IfcSchema,
    LengthUnit, NameNormalizationRule, OnInvalid, PropertiesConfig, PropertyMapping,
    TypeMappingRule,
};
pub use context::{hash_file, CancelToken, RunContext};
pub use document::{EntityRef, IfcDocument, IfcEntity, IfcValue, SpfHeader};
pub use error::{
    ConfigError, ConvertError, GuidCollisionError, MappingError, Result, WriteError,
};
pub use guid::{derive_guid, derive_synthetic_guid, Guid, GuidAllocator};
pub use mapping::{MappingEngine, MappingResult, PartContext, PropertyValue};
pub use pipeline::{convert, ConversionResult, Converter, RunOutcome};
pub use qc::{BasicChecks, MergeGroup, PartQcRecord, PartStatus, QcReport};
pub use writer::{ElementSpec, IfcWriter, Representation};

pub use step2ifc_model::IngestError;
pub use step2ifc_parser::StepReader;
