// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversion configuration
//!
//! [`ConversionConfig`] is the plain, serde-friendly shape callers build or
//! deserialize. [`ConversionConfig::validate`] checks it and compiles it into
//! a [`CompiledConfig`] with regexes built and enumerations resolved.

use crate::error::ConfigError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use step2ifc_geometry::GeometryOptions;

fn default_type() -> String {
    "IfcBuildingElementProxy".to_string()
}

fn default_data_type() -> String {
    "IfcLabel".to_string()
}

/// Regex substitution applied to raw part names
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NameNormalizationRule {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyMapping {
    /// Target property set; `Pset_Mapped` when omitted
    #[serde(default)]
    pub pset: Option<String>,
    pub name: String,
    /// Literal text with optional `${Token}` references
    pub value: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMapping {
    pub system: String,
    pub code: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// One entry of `type_mappings`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeMappingRule {
    #[serde(default)]
    pub match_name_regex: Option<String>,
    /// `/`-separated leading path segments
    #[serde(default)]
    pub match_assembly_prefix: Option<String>,
    #[serde(default = "default_type")]
    pub ifc_class: String,
    #[serde(default)]
    pub object_type: Option<String>,
    /// Storey the matched elements are contained in
    #[serde(default)]
    pub storey: Option<String>,
    #[serde(default)]
    pub classification: Option<ClassificationMapping>,
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
}

impl TypeMappingRule {
    /// Rule matching canonical names against `pattern`
    pub fn by_name(pattern: &str, ifc_class: &str) -> Self {
        Self {
            match_name_regex: Some(pattern.to_string()),
            match_assembly_prefix: None,
            ifc_class: ifc_class.to_string(),
            object_type: None,
            storey: None,
            classification: None,
            properties: Vec::new(),
        }
    }

    /// Rule matching parts under `prefix`
    pub fn by_prefix(prefix: &str, ifc_class: &str) -> Self {
        Self {
            match_name_regex: None,
            match_assembly_prefix: Some(prefix.to_string()),
            ..Self::by_name("", ifc_class)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertiesConfig {
    /// Token values available to every expression
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryMode {
    #[default]
    Brep,
    Mesh,
}

/// What happens to parts still invalid after healing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnInvalid {
    Skip,
    #[default]
    MeshFallback,
}

/// Everything a conversion run consumes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub name_normalization: Vec<NameNormalizationRule>,
    pub type_mappings: Vec<TypeMappingRule>,
    pub properties: PropertiesConfig,
    pub default_type: String,
    pub merge_by_name: bool,
    pub split_by_assembly: bool,
    pub schema: String,
    pub units: String,
    pub project: String,
    pub site: String,
    pub building: String,
    pub storey: String,
    pub geom: GeometryMode,
    pub mesh_deflection: f64,
    pub mesh_angle: f64,
    pub on_invalid: OnInvalid,
    pub max_heal_passes: u32,
    pub sewing_tolerance: f64,
    /// Geometry worker threads; 0 picks the number of CPUs
    pub workers: usize,
    /// Where the mapping rules came from, echoed in the QC report
    pub class_map: Option<PathBuf>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            name_normalization: Vec::new(),
            type_mappings: Vec::new(),
            properties: PropertiesConfig::default(),
            default_type: default_type(),
            merge_by_name: false,
            split_by_assembly: false,
            schema: "IFC4".to_string(),
            units: "mm".to_string(),
            project: "Project".to_string(),
            site: "Site".to_string(),
            building: "Building".to_string(),
            storey: "Storey".to_string(),
            geom: GeometryMode::Brep,
            mesh_deflection: 0.5,
            mesh_angle: 0.5,
            on_invalid: OnInvalid::MeshFallback,
            max_heal_passes: 3,
            sewing_tolerance: 1e-6,
            workers: 0,
            class_map: None,
        }
    }
}

// ============================================================================
// Resolved enumerations
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IfcSchema {
    #[serde(rename = "IFC4")]
    Ifc4,
    #[serde(rename = "IFC2X3")]
    Ifc2x3,
}

impl IfcSchema {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "IFC4" => Some(IfcSchema::Ifc4),
            "IFC2X3" => Some(IfcSchema::Ifc2x3),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IfcSchema::Ifc4 => "IFC4",
            IfcSchema::Ifc2x3 => "IFC2X3",
        }
    }
}

impl fmt::Display for IfcSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output length unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Mm,
    Cm,
    M,
    In,
    Ft,
}

impl LengthUnit {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mm" | "millimetre" | "millimeter" => Some(LengthUnit::Mm),
            "cm" | "centimetre" | "centimeter" => Some(LengthUnit::Cm),
            "m" | "metre" | "meter" => Some(LengthUnit::M),
            "in" | "inch" => Some(LengthUnit::In),
            "ft" | "foot" | "feet" => Some(LengthUnit::Ft),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LengthUnit::Mm => "mm",
            LengthUnit::Cm => "cm",
            LengthUnit::M => "m",
            LengthUnit::In => "in",
            LengthUnit::Ft => "ft",
        }
    }

    /// Metres per unit
    pub fn metres(&self) -> f64 {
        match self {
            LengthUnit::Mm => 0.001,
            LengthUnit::Cm => 0.01,
            LengthUnit::M => 1.0,
            LengthUnit::In => 0.0254,
            LengthUnit::Ft => 0.3048,
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// IFC measure type of a mapped property value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    IfcLabel,
    IfcText,
    IfcIdentifier,
    IfcInteger,
    IfcReal,
    IfcBoolean,
}

impl DataType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "IfcLabel" => Some(DataType::IfcLabel),
            "IfcText" => Some(DataType::IfcText),
            "IfcIdentifier" => Some(DataType::IfcIdentifier),
            "IfcInteger" => Some(DataType::IfcInteger),
            "IfcReal" => Some(DataType::IfcReal),
            "IfcBoolean" => Some(DataType::IfcBoolean),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::IfcLabel => "IfcLabel",
            DataType::IfcText => "IfcText",
            DataType::IfcIdentifier => "IfcIdentifier",
            DataType::IfcInteger => "IfcInteger",
            DataType::IfcReal => "IfcReal",
            DataType::IfcBoolean => "IfcBoolean",
        }
    }
}

// ============================================================================
// Compiled form
// ============================================================================

/// Rule predicate
#[derive(Clone, Debug)]
pub enum Predicate {
    /// Case-insensitive search in the canonical name
    NameRegex(Regex),
    /// Leading segments of the part's path, itself included
    AssemblyPrefix(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledProperty {
    pub pset: String,
    pub name: String,
    pub expression: String,
    pub data_type: DataType,
}

#[derive(Clone, Debug)]
pub struct CompiledRule {
    /// Position in `type_mappings`
    pub index: usize,
    /// The rule matches when any predicate does
    pub predicates: Vec<Predicate>,
    pub ifc_class: String,
    pub object_type: Option<String>,
    pub storey: Option<String>,
    pub classification: Option<ClassificationMapping>,
    pub properties: Vec<CompiledProperty>,
}

/// Validated configuration
#[derive(Clone, Debug)]
pub struct CompiledConfig {
    pub raw: ConversionConfig,
    pub schema: IfcSchema,
    pub units: LengthUnit,
    pub normalization: Vec<(Regex, String)>,
    pub rules: Vec<CompiledRule>,
}

impl CompiledConfig {
    pub fn geometry_options(&self) -> GeometryOptions {
        GeometryOptions {
            deflection: self.raw.mesh_deflection,
            angle: self.raw.mesh_angle,
            max_heal_passes: self.raw.max_heal_passes,
            sewing_tolerance: self.raw.sewing_tolerance,
        }
    }
}

pub const DEFAULT_MAPPED_PSET: &str = "Pset_Mapped";

/// Audit property set written by the converter itself
pub const SOURCE_PSET: &str = "Pset_Source";

impl ConversionConfig {
    /// Check every field and compile regexes
    pub fn validate(&self) -> Result<CompiledConfig, ConfigError> {
        if self.merge_by_name && self.split_by_assembly {
            return Err(ConfigError::IncompatibleOptions);
        }

        let schema = IfcSchema::parse(&self.schema).ok_or_else(|| ConfigError::UnknownValue {
            field: "schema".into(),
            value: self.schema.clone(),
        })?;
        let units = LengthUnit::parse(&self.units).ok_or_else(|| ConfigError::UnknownValue {
            field: "units".into(),
            value: self.units.clone(),
        })?;

        for (field, value) in [
            ("project", &self.project),
            ("site", &self.site),
            ("building", &self.building),
            ("storey", &self.storey),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::field(field, "must not be empty"));
            }
        }
        check_class("default_type", &self.default_type)?;

        positive("mesh_deflection", self.mesh_deflection)?;
        positive("mesh_angle", self.mesh_angle)?;
        positive("sewing_tolerance", self.sewing_tolerance)?;
        if self.max_heal_passes == 0 {
            return Err(ConfigError::field("max_heal_passes", "must be at least 1"));
        }

        let normalization = self
            .name_normalization
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                let field = format!("name_normalization[{}].pattern", i);
                Ok((compile(&field, &rule.pattern)?, rule.replacement.clone()))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let rules = self
            .type_mappings
            .iter()
            .enumerate()
            .map(|(i, rule)| compile_rule(i, rule))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(CompiledConfig {
            raw: self.clone(),
            schema,
            units,
            normalization,
            rules,
        })
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::field(
            field,
            format!("must be strictly positive, got {}", value),
        ))
    }
}

fn compile(field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidRegex {
            field: field.to_string(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Entity class names end up as SPF keywords
fn check_class(field: &str, class: &str) -> Result<(), ConfigError> {
    let mut chars = class.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::field(
            field,
            format!("'{}' is not an entity class name", class),
        ))
    }
}

fn compile_rule(index: usize, rule: &TypeMappingRule) -> Result<CompiledRule, ConfigError> {
    let field = |name: &str| format!("type_mappings[{}].{}", index, name);

    let mut predicates = Vec::new();
    if let Some(pattern) = rule.match_name_regex.as_deref().filter(|p| !p.is_empty()) {
        predicates.push(Predicate::NameRegex(compile(
            &field("match_name_regex"),
            pattern,
        )?));
    }
    if let Some(prefix) = rule.match_assembly_prefix.as_deref() {
        let segments: Vec<String> = prefix
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !segments.is_empty() {
            predicates.push(Predicate::AssemblyPrefix(segments));
        }
    }
    if predicates.is_empty() {
        return Err(ConfigError::field(
            format!("type_mappings[{}]", index),
            "needs match_name_regex or match_assembly_prefix",
        ));
    }

    check_class(&field("ifc_class"), &rule.ifc_class)?;

    if let Some(c) = &rule.classification {
        if c.system.trim().is_empty() || c.code.trim().is_empty() {
            return Err(ConfigError::field(
                field("classification"),
                "system and code must not be empty",
            ));
        }
    }

    let properties = rule
        .properties
        .iter()
        .enumerate()
        .map(|(p, prop)| {
            let prop_field = format!("type_mappings[{}].properties[{}]", index, p);
            if prop.name.trim().is_empty() {
                return Err(ConfigError::field(prop_field, "name must not be empty"));
            }
            let data_type =
                DataType::parse(&prop.data_type).ok_or_else(|| ConfigError::UnknownValue {
                    field: format!("{}.data_type", prop_field),
                    value: prop.data_type.clone(),
                })?;
            let pset = prop
                .pset
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .unwrap_or(DEFAULT_MAPPED_PSET);
            if pset.eq_ignore_ascii_case(SOURCE_PSET) {
                return Err(ConfigError::field(
                    format!("{}.pset", prop_field),
                    format!("{} is reserved for source properties", SOURCE_PSET),
                ));
            }
            Ok(CompiledProperty {
                pset: pset.to_string(),
                name: prop.name.clone(),
                expression: prop.value.clone(),
                data_type,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(CompiledRule {
        index,
        predicates,
        ifc_class: rule.ifc_class.clone(),
        object_type: rule.object_type.clone(),
        storey: rule.storey.clone().filter(|s| !s.trim().is_empty()),
        classification: rule.classification.clone(),
        properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let compiled = ConversionConfig::default().validate().unwrap();
        assert_eq!(compiled.schema, IfcSchema::Ifc4);
        assert_eq!(compiled.units, LengthUnit::Mm);
        assert_eq!(compiled.raw.on_invalid, OnInvalid::MeshFallback);
        assert_eq!(compiled.geometry_options().max_heal_passes, 3);
    }

    #[test]
    fn test_merge_and_split_rejected() {
        let config = ConversionConfig {
            merge_by_name: true,
            split_by_assembly: true,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err(), ConfigError::IncompatibleOptions);
    }

    #[test]
    fn test_non_positive_tolerance_names_field() {
        let config = ConversionConfig {
            mesh_angle: 0.0,
            ..Default::default()
        };
        match config.validate().unwrap_err() {
            ConfigError::InvalidField { field, .. } => assert_eq!(field, "mesh_angle"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_schema_and_units() {
        let config = ConversionConfig {
            schema: "IFC5".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownValue { ref field, .. }) if field == "schema"
        ));
        let config = ConversionConfig {
            units: "furlong".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_regex_reported() {
        let config = ConversionConfig {
            type_mappings: vec![TypeMappingRule::by_name("Valve(", "IfcValve")],
            ..Default::default()
        };
        match config.validate().unwrap_err() {
            ConfigError::InvalidRegex { field, .. } => {
                assert_eq!(field, "type_mappings[0].match_name_regex")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rule_needs_predicate_and_known_data_type() {
        let config = ConversionConfig {
            type_mappings: vec![TypeMappingRule::by_name("", "IfcValve")],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut rule = TypeMappingRule::by_name("Valve", "IfcValve");
        rule.properties.push(PropertyMapping {
            pset: None,
            name: "Size".into(),
            value: "1".into(),
            data_type: "IfcMass".into(),
        });
        let config = ConversionConfig {
            type_mappings: vec![rule],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownValue { .. })
        ));
    }

    #[test]
    fn test_source_pset_is_reserved() {
        let mut rule = TypeMappingRule::by_name("Valve", "IfcValve");
        rule.properties.push(PropertyMapping {
            pset: Some("pset_source".into()),
            name: "StepLabel".into(),
            value: "${Name}".into(),
            data_type: "IfcLabel".into(),
        });
        let config = ConversionConfig {
            type_mappings: vec![rule],
            ..Default::default()
        };
        match config.validate().unwrap_err() {
            ConfigError::InvalidField { field, .. } => {
                assert_eq!(field, "type_mappings[0].properties[0].pset")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{
            "schema": "ifc2x3",
            "units": "m",
            "type_mappings": [
                {"match_name_regex": "^Valve", "ifc_class": "IfcValve",
                 "properties": [{"name": "Tag", "value": "${Name}"}]}
            ],
            "properties": {"defaults": {"Discipline": "MEP"}},
            "on_invalid": "skip"
        }"#;
        let config: ConversionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.project, "Project");
        assert_eq!(config.on_invalid, OnInvalid::Skip);
        let compiled = config.validate().unwrap();
        assert_eq!(compiled.schema, IfcSchema::Ifc2x3);
        assert_eq!(compiled.rules[0].properties[0].pset, DEFAULT_MAPPED_PSET);
        assert_eq!(compiled.rules[0].properties[0].data_type, DataType::IfcLabel);
    }
}
