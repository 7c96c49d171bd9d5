// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types for STEP data representation
//!
//! This module defines the fundamental types used throughout the conversion
//! pipeline: entity ids, the entity keywords the converter understands, and
//! decoded attribute values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type-safe entity identifier
///
/// Wraps the raw instance name (e.g., #123 becomes EntityId(123))
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize, Default)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        EntityId(id)
    }
}

impl From<EntityId> for u32 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// STEP entity keyword enumeration
///
/// Covers the AP203/AP214 product-structure, topology and unit entities the
/// converter reads. Anything else is captured with its original keyword.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    // ========================================================================
    // Product structure
    // ========================================================================
    Product,
    ProductDefinitionFormation,
    ProductDefinitionFormationWithSpecifiedSource,
    ProductDefinition,
    ProductDefinitionShape,
    NextAssemblyUsageOccurrence,
    ShapeDefinitionRepresentation,
    ContextDependentShapeRepresentation,

    // ========================================================================
    // Representations
    // ========================================================================
    ShapeRepresentation,
    AdvancedBrepShapeRepresentation,
    FacetedBrepShapeRepresentation,
    ManifoldSurfaceShapeRepresentation,
    ShapeRepresentationRelationship,
    RepresentationRelationship,
    RepresentationRelationshipWithTransformation,
    ItemDefinedTransformation,

    // ========================================================================
    // Placement
    // ========================================================================
    CartesianPoint,
    Direction,
    Axis2Placement3d,

    // ========================================================================
    // Solids and shells
    // ========================================================================
    ManifoldSolidBrep,
    FacetedBrep,
    BrepWithVoids,
    ShellBasedSurfaceModel,
    ClosedShell,
    OpenShell,
    OrientedClosedShell,

    // ========================================================================
    // Topology
    // ========================================================================
    AdvancedFace,
    FaceSurface,
    Face,
    FaceOuterBound,
    FaceBound,
    PolyLoop,
    EdgeLoop,
    VertexLoop,
    OrientedEdge,
    EdgeCurve,
    VertexPoint,

    // ========================================================================
    // Curves and surfaces
    // ========================================================================
    Line,
    Polyline,
    Circle,
    Ellipse,
    SurfaceCurve,
    SeamCurve,
    Plane,
    CylindricalSurface,
    ConicalSurface,

    // ========================================================================
    // Units
    // ========================================================================
    LengthUnit,
    NamedUnit,
    SiUnit,
    ConversionBasedUnit,
    LengthMeasureWithUnit,
    MeasureWithUnit,
    GlobalUnitAssignedContext,

    /// Complex instance; the partial types are held in `DecodedEntity::components`
    Complex,

    /// Unknown type - stores the original keyword
    Unknown(String),
}

impl FromStr for StepType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl StepType {
    /// Parse a keyword into a StepType
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PRODUCT" => StepType::Product,
            "PRODUCT_DEFINITION_FORMATION" => StepType::ProductDefinitionFormation,
            "PRODUCT_DEFINITION_FORMATION_WITH_SPECIFIED_SOURCE" => {
                StepType::ProductDefinitionFormationWithSpecifiedSource
            }
            "PRODUCT_DEFINITION" => StepType::ProductDefinition,
            "PRODUCT_DEFINITION_SHAPE" => StepType::ProductDefinitionShape,
            "NEXT_ASSEMBLY_USAGE_OCCURRENCE" => StepType::NextAssemblyUsageOccurrence,
            "SHAPE_DEFINITION_REPRESENTATION" => StepType::ShapeDefinitionRepresentation,
            "CONTEXT_DEPENDENT_SHAPE_REPRESENTATION" => {
                StepType::ContextDependentShapeRepresentation
            }

            "SHAPE_REPRESENTATION" => StepType::ShapeRepresentation,
            "ADVANCED_BREP_SHAPE_REPRESENTATION" => StepType::AdvancedBrepShapeRepresentation,
            "FACETED_BREP_SHAPE_REPRESENTATION" => StepType::FacetedBrepShapeRepresentation,
            "MANIFOLD_SURFACE_SHAPE_REPRESENTATION" => {
                StepType::ManifoldSurfaceShapeRepresentation
            }
            "SHAPE_REPRESENTATION_RELATIONSHIP" => StepType::ShapeRepresentationRelationship,
            "REPRESENTATION_RELATIONSHIP" => StepType::RepresentationRelationship,
            "REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION" => {
                StepType::RepresentationRelationshipWithTransformation
            }
            "ITEM_DEFINED_TRANSFORMATION" => StepType::ItemDefinedTransformation,

            "CARTESIAN_POINT" => StepType::CartesianPoint,
            "DIRECTION" => StepType::Direction,
            "AXIS2_PLACEMENT_3D" => StepType::Axis2Placement3d,

            "MANIFOLD_SOLID_BREP" => StepType::ManifoldSolidBrep,
            "FACETED_BREP" => StepType::FacetedBrep,
            "BREP_WITH_VOIDS" => StepType::BrepWithVoids,
            "SHELL_BASED_SURFACE_MODEL" => StepType::ShellBasedSurfaceModel,
            "CLOSED_SHELL" => StepType::ClosedShell,
            "OPEN_SHELL" => StepType::OpenShell,
            "ORIENTED_CLOSED_SHELL" => StepType::OrientedClosedShell,

            "ADVANCED_FACE" => StepType::AdvancedFace,
            "FACE_SURFACE" => StepType::FaceSurface,
            "FACE" => StepType::Face,
            "FACE_OUTER_BOUND" => StepType::FaceOuterBound,
            "FACE_BOUND" => StepType::FaceBound,
            "POLY_LOOP" => StepType::PolyLoop,
            "EDGE_LOOP" => StepType::EdgeLoop,
            "VERTEX_LOOP" => StepType::VertexLoop,
            "ORIENTED_EDGE" => StepType::OrientedEdge,
            "EDGE_CURVE" => StepType::EdgeCurve,
            "VERTEX_POINT" => StepType::VertexPoint,

            "LINE" => StepType::Line,
            "POLYLINE" => StepType::Polyline,
            "CIRCLE" => StepType::Circle,
            "ELLIPSE" => StepType::Ellipse,
            "SURFACE_CURVE" => StepType::SurfaceCurve,
            "SEAM_CURVE" => StepType::SeamCurve,
            "PLANE" => StepType::Plane,
            "CYLINDRICAL_SURFACE" => StepType::CylindricalSurface,
            "CONICAL_SURFACE" => StepType::ConicalSurface,

            "LENGTH_UNIT" => StepType::LengthUnit,
            "NAMED_UNIT" => StepType::NamedUnit,
            "SI_UNIT" => StepType::SiUnit,
            "CONVERSION_BASED_UNIT" => StepType::ConversionBasedUnit,
            "LENGTH_MEASURE_WITH_UNIT" => StepType::LengthMeasureWithUnit,
            "MEASURE_WITH_UNIT" => StepType::MeasureWithUnit,
            "GLOBAL_UNIT_ASSIGNED_CONTEXT" => StepType::GlobalUnitAssignedContext,

            "" => StepType::Complex,
            other => StepType::Unknown(other.to_string()),
        }
    }

    /// Get the STEP keyword for this type
    pub fn name(&self) -> &str {
        match self {
            StepType::Product => "PRODUCT",
            StepType::ProductDefinitionFormation => "PRODUCT_DEFINITION_FORMATION",
            StepType::ProductDefinitionFormationWithSpecifiedSource => {
                "PRODUCT_DEFINITION_FORMATION_WITH_SPECIFIED_SOURCE"
            }
            StepType::ProductDefinition => "PRODUCT_DEFINITION",
            StepType::ProductDefinitionShape => "PRODUCT_DEFINITION_SHAPE",
            StepType::NextAssemblyUsageOccurrence => "NEXT_ASSEMBLY_USAGE_OCCURRENCE",
            StepType::ShapeDefinitionRepresentation => "SHAPE_DEFINITION_REPRESENTATION",
            StepType::ContextDependentShapeRepresentation => {
                "CONTEXT_DEPENDENT_SHAPE_REPRESENTATION"
            }
            StepType::ShapeRepresentation => "SHAPE_REPRESENTATION",
            StepType::AdvancedBrepShapeRepresentation => "ADVANCED_BREP_SHAPE_REPRESENTATION",
            StepType::FacetedBrepShapeRepresentation => "FACETED_BREP_SHAPE_REPRESENTATION",
            StepType::ManifoldSurfaceShapeRepresentation => "MANIFOLD_SURFACE_SHAPE_REPRESENTATION",
            StepType::ShapeRepresentationRelationship => "SHAPE_REPRESENTATION_RELATIONSHIP",
            StepType::RepresentationRelationship => "REPRESENTATION_RELATIONSHIP",
            StepType::RepresentationRelationshipWithTransformation => {
                "REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION"
            }
            StepType::ItemDefinedTransformation => "ITEM_DEFINED_TRANSFORMATION",
            StepType::CartesianPoint => "CARTESIAN_POINT",
            StepType::Direction => "DIRECTION",
            StepType::Axis2Placement3d => "AXIS2_PLACEMENT_3D",
            StepType::ManifoldSolidBrep => "MANIFOLD_SOLID_BREP",
            StepType::FacetedBrep => "FACETED_BREP",
            StepType::BrepWithVoids => "BREP_WITH_VOIDS",
            StepType::ShellBasedSurfaceModel => "SHELL_BASED_SURFACE_MODEL",
            StepType::ClosedShell => "CLOSED_SHELL",
            StepType::OpenShell => "OPEN_SHELL",
            StepType::OrientedClosedShell => "ORIENTED_CLOSED_SHELL",
            StepType::AdvancedFace => "ADVANCED_FACE",
            StepType::FaceSurface => "FACE_SURFACE",
            StepType::Face => "FACE",
            StepType::FaceOuterBound => "FACE_OUTER_BOUND",
            StepType::FaceBound => "FACE_BOUND",
            StepType::PolyLoop => "POLY_LOOP",
            StepType::EdgeLoop => "EDGE_LOOP",
            StepType::VertexLoop => "VERTEX_LOOP",
            StepType::OrientedEdge => "ORIENTED_EDGE",
            StepType::EdgeCurve => "EDGE_CURVE",
            StepType::VertexPoint => "VERTEX_POINT",
            StepType::Line => "LINE",
            StepType::Polyline => "POLYLINE",
            StepType::Circle => "CIRCLE",
            StepType::Ellipse => "ELLIPSE",
            StepType::SurfaceCurve => "SURFACE_CURVE",
            StepType::SeamCurve => "SEAM_CURVE",
            StepType::Plane => "PLANE",
            StepType::CylindricalSurface => "CYLINDRICAL_SURFACE",
            StepType::ConicalSurface => "CONICAL_SURFACE",
            StepType::LengthUnit => "LENGTH_UNIT",
            StepType::NamedUnit => "NAMED_UNIT",
            StepType::SiUnit => "SI_UNIT",
            StepType::ConversionBasedUnit => "CONVERSION_BASED_UNIT",
            StepType::LengthMeasureWithUnit => "LENGTH_MEASURE_WITH_UNIT",
            StepType::MeasureWithUnit => "MEASURE_WITH_UNIT",
            StepType::GlobalUnitAssignedContext => "GLOBAL_UNIT_ASSIGNED_CONTEXT",
            StepType::Complex => "",
            StepType::Unknown(s) => s,
        }
    }

    /// Check if this keyword is a solid or surface model the geometry stage can read
    pub fn is_shape_item(&self) -> bool {
        matches!(
            self,
            StepType::ManifoldSolidBrep
                | StepType::FacetedBrep
                | StepType::BrepWithVoids
                | StepType::ShellBasedSurfaceModel
        )
    }
}

/// Decoded attribute value
#[derive(Clone, Debug, PartialEq, Default)]
pub enum AttributeValue {
    /// Null value ($)
    #[default]
    Null,
    /// Derived value (*)
    Derived,
    /// Entity reference (#123)
    EntityRef(EntityId),
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Enumeration value (.VALUE.)
    Enum(String),
    /// List of values
    List(Vec<AttributeValue>),
    /// Typed value like LENGTH_MEASURE(25.4)
    TypedValue(String, Vec<AttributeValue>),
}

impl AttributeValue {
    /// Try to get as entity reference
    pub fn as_entity_ref(&self) -> Option<EntityId> {
        match self {
            AttributeValue::EntityRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Try to get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            AttributeValue::TypedValue(_, args) if !args.is_empty() => args[0].as_string(),
            _ => None,
        }
    }

    /// Try to get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::TypedValue(_, args) if !args.is_empty() => args[0].as_float(),
            _ => None,
        }
    }

    /// Try to get as integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as boolean (.T./.F. enumerations included)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Enum(s) => match s.to_uppercase().as_str() {
                "TRUE" | "T" => Some(true),
                "FALSE" | "F" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Try to get as enum string
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            AttributeValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as list
    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(list) => Some(list),
            _ => None,
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

/// One partial entity of a complex instance, e.g. `SI_UNIT(.MILLI.,.METRE.)`
#[derive(Clone, Debug, PartialEq)]
pub struct EntityComponent {
    pub step_type: StepType,
    pub attributes: Vec<AttributeValue>,
}

/// Decoded STEP entity
///
/// Simple instances carry their attributes directly. Complex instances such
/// as `#5=(LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT(.MILLI.,.METRE.));` have
/// `step_type == StepType::Complex`, no direct attributes, and one
/// [`EntityComponent`] per partial type.
#[derive(Clone, Debug)]
pub struct DecodedEntity {
    /// Entity ID
    pub id: EntityId,
    /// Entity keyword
    pub step_type: StepType,
    /// Attribute values in order
    pub attributes: Vec<AttributeValue>,
    /// Partial types of a complex instance
    pub components: Vec<EntityComponent>,
}

impl DecodedEntity {
    /// Create a simple (non-complex) entity
    pub fn simple(id: EntityId, step_type: StepType, attributes: Vec<AttributeValue>) -> Self {
        Self {
            id,
            step_type,
            attributes,
            components: Vec::new(),
        }
    }

    /// Get attribute at index
    pub fn get(&self, index: usize) -> Option<&AttributeValue> {
        self.attributes.get(index)
    }

    /// Get entity reference at index
    pub fn get_ref(&self, index: usize) -> Option<EntityId> {
        self.get(index).and_then(|v| v.as_entity_ref())
    }

    /// Get string at index
    pub fn get_string(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|v| v.as_string())
    }

    /// Get float at index
    pub fn get_float(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(|v| v.as_float())
    }

    /// Get list at index
    pub fn get_list(&self, index: usize) -> Option<&[AttributeValue]> {
        self.get(index).and_then(|v| v.as_list())
    }

    /// Get boolean at index
    pub fn get_bool(&self, index: usize) -> Option<bool> {
        self.get(index).and_then(|v| v.as_bool())
    }

    /// Get enum string at index
    pub fn get_enum(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(|v| v.as_enum())
    }

    /// Get list of entity references at index
    pub fn get_refs(&self, index: usize) -> Option<Vec<EntityId>> {
        self.get_list(index)
            .map(|list| list.iter().filter_map(|v| v.as_entity_ref()).collect())
    }

    /// Check if this entity is, or contains as a partial type, the given keyword
    pub fn is_a(&self, step_type: &StepType) -> bool {
        &self.step_type == step_type || self.component(step_type).is_some()
    }

    /// Get a partial type of a complex instance
    pub fn component(&self, step_type: &StepType) -> Option<&EntityComponent> {
        self.components.iter().find(|c| &c.step_type == step_type)
    }

    /// Check if this is a complex instance
    pub fn is_complex(&self) -> bool {
        self.step_type == StepType::Complex
    }
}

/// Metadata extracted from the STEP header
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Application protocol schema (e.g., "AUTOMOTIVE_DESIGN", "CONFIG_CONTROL_DESIGN")
    pub schema_version: String,
    /// Originating system (CAD application)
    pub originating_system: Option<String>,
    /// Preprocessor version
    pub preprocessor_version: Option<String>,
    /// File name from header
    pub file_name: Option<String>,
    /// File description
    pub file_description: Option<String>,
    /// Author
    pub author: Option<String>,
    /// Organization
    pub organization: Option<String>,
    /// Timestamp
    pub timestamp: Option<String>,
}

/// Length unit declared by the source file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Short name ("mm", "m", "in", ...)
    pub name: String,
    /// Metres per source unit
    pub metres: f64,
}

impl Default for SourceUnit {
    fn default() -> Self {
        Self {
            name: "mm".to_string(),
            metres: 0.001,
        }
    }
}
