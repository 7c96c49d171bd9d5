// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rule-based mapping from parts to IFC classes and properties
//!
//! Works on names and paths only, so rules can be exercised without any CAD
//! or document data.

use crate::config::{
    ClassificationMapping, CompiledConfig, CompiledProperty, CompiledRule, DataType, Predicate,
};
use crate::error::MappingError;
use crate::expression::Expression;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use step2ifc_model::{sanitize_name, AssemblyPath};

/// What the engine knows about a part
#[derive(Clone, Copy, Debug)]
pub struct PartContext<'a> {
    pub canonical_name: &'a str,
    pub original_name: &'a str,
    /// Ancestor path with canonical names
    pub assembly_path: &'a AssemblyPath,
    pub occurrence_index: u32,
    pub source_hash: &'a str,
    pub project_key: &'a str,
}

/// Typed property value
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Label(String),
    Text(String),
    Identifier(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
}

impl PropertyValue {
    /// Parse rendered text as `data_type`
    pub fn parse(text: &str, data_type: DataType) -> Option<Self> {
        Some(match data_type {
            DataType::IfcLabel => PropertyValue::Label(text.to_string()),
            DataType::IfcText => PropertyValue::Text(text.to_string()),
            DataType::IfcIdentifier => PropertyValue::Identifier(text.to_string()),
            DataType::IfcInteger => PropertyValue::Integer(text.trim().parse().ok()?),
            DataType::IfcReal => {
                let v: f64 = text.trim().parse().ok()?;
                if !v.is_finite() {
                    return None;
                }
                PropertyValue::Real(v)
            }
            DataType::IfcBoolean => {
                match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" | ".t." => PropertyValue::Boolean(true),
                    "false" | "no" | "0" | ".f." => PropertyValue::Boolean(false),
                    _ => return None,
                }
            }
        })
    }

    pub fn data_type(&self) -> DataType {
        match self {
            PropertyValue::Label(_) => DataType::IfcLabel,
            PropertyValue::Text(_) => DataType::IfcText,
            PropertyValue::Identifier(_) => DataType::IfcIdentifier,
            PropertyValue::Integer(_) => DataType::IfcInteger,
            PropertyValue::Real(_) => DataType::IfcReal,
            PropertyValue::Boolean(_) => DataType::IfcBoolean,
        }
    }

    /// Text form, as other expressions see it
    pub fn as_text(&self) -> String {
        match self {
            PropertyValue::Label(s) | PropertyValue::Text(s) | PropertyValue::Identifier(s) => {
                s.clone()
            }
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Real(r) => r.to_string(),
            PropertyValue::Boolean(b) => b.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedProperty {
    pub name: String,
    pub value: PropertyValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPset {
    pub name: String,
    pub properties: Vec<ResolvedProperty>,
}

/// Classification reference; identity is `(system, code)`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassificationRef {
    pub system: String,
    pub code: String,
    pub title: String,
}

impl From<&ClassificationMapping> for ClassificationRef {
    fn from(c: &ClassificationMapping) -> Self {
        Self {
            system: c.system.clone(),
            code: c.code.clone(),
            title: c.title.clone().unwrap_or_else(|| c.code.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MappingResult {
    /// Index of the matched rule; `None` means the default type
    pub rule_index: Option<usize>,
    pub ifc_class: String,
    pub object_type: Option<String>,
    pub storey: Option<String>,
    pub name: String,
    /// Short hash of source, path and name
    pub tag: String,
    /// Property sets in order of first appearance
    pub psets: Vec<ResolvedPset>,
    pub classification: Option<ClassificationRef>,
}

/// Resolves parts against the compiled rules
pub struct MappingEngine {
    normalization: Vec<(Regex, String)>,
    rules: Vec<CompiledRule>,
    defaults: BTreeMap<String, String>,
    default_type: String,
}

impl MappingEngine {
    pub fn new(config: &CompiledConfig) -> Self {
        Self {
            normalization: config.normalization.clone(),
            rules: config.rules.clone(),
            defaults: config.raw.properties.defaults.clone(),
            default_type: config.raw.default_type.clone(),
        }
    }

    /// Canonical name: every substitution in order, then trimmed
    pub fn normalize(&self, raw: &str) -> String {
        let mut name = raw.to_string();
        for (pattern, replacement) in &self.normalization {
            name = pattern.replace_all(&name, replacement.as_str()).into_owned();
        }
        sanitize_name(name.trim())
    }

    /// First rule whose predicate matches `name` at `full_path`
    pub fn select_rule(&self, name: &str, full_path: &AssemblyPath) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| {
            rule.predicates.iter().any(|p| match p {
                Predicate::NameRegex(re) => re.is_match(name),
                Predicate::AssemblyPrefix(prefix) => full_path.starts_with(prefix),
            })
        })
    }

    pub fn resolve(&self, ctx: &PartContext<'_>) -> Result<MappingResult, MappingError> {
        let full_path = ctx
            .assembly_path
            .child(ctx.canonical_name, ctx.occurrence_index);
        let rule = self.select_rule(ctx.canonical_name, &full_path);

        let psets = match rule {
            Some(rule) => self.resolve_properties(&rule.properties, ctx)?,
            None => Vec::new(),
        };

        Ok(MappingResult {
            rule_index: rule.map(|r| r.index),
            ifc_class: rule
                .map(|r| r.ifc_class.clone())
                .unwrap_or_else(|| self.default_type.clone()),
            object_type: rule.and_then(|r| r.object_type.clone()),
            storey: rule.and_then(|r| r.storey.clone()),
            name: ctx.canonical_name.to_string(),
            tag: short_tag(
                ctx.source_hash,
                &ctx.assembly_path.to_string(),
                ctx.canonical_name,
                ctx.occurrence_index,
            ),
            psets,
            classification: rule
                .and_then(|r| r.classification.as_ref())
                .map(ClassificationRef::from),
        })
    }

    fn builtin(&self, token: &str, ctx: &PartContext<'_>) -> Option<String> {
        Some(match token {
            "Name" => ctx.canonical_name.to_string(),
            "OriginalName" => ctx.original_name.to_string(),
            "AssemblyPath" => ctx.assembly_path.to_string(),
            "OccurrenceIndex" => ctx.occurrence_index.to_string(),
            "ProjectKey" => ctx.project_key.to_string(),
            "SourceHash" => ctx.source_hash.to_string(),
            _ => return None,
        })
    }

    fn resolve_properties(
        &self,
        properties: &[CompiledProperty],
        ctx: &PartContext<'_>,
    ) -> Result<Vec<ResolvedPset>, MappingError> {
        let mut psets: Vec<ResolvedPset> = Vec::new();
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();

        for prop in properties {
            let qualified = format!("{}.{}", prop.pset, prop.name);
            let expression = Expression::parse(&prop.expression).map_err(|_| {
                MappingError::MalformedExpression {
                    property: qualified.clone(),
                    expression: prop.expression.clone(),
                }
            })?;

            let text = expression
                .render(|token| {
                    self.defaults
                        .get(token)
                        .cloned()
                        .or_else(|| self.builtin(token, ctx))
                        .or_else(|| resolved.get(token).cloned())
                })
                .map_err(|key| MappingError::UndefinedToken {
                    property: qualified.clone(),
                    key,
                })?;

            let value = PropertyValue::parse(&text, prop.data_type).ok_or_else(|| {
                MappingError::InvalidValue {
                    property: qualified.clone(),
                    value: text.clone(),
                    data_type: prop.data_type.name().to_string(),
                }
            })?;

            resolved.insert(qualified, value.as_text());
            let entry = ResolvedProperty {
                name: prop.name.clone(),
                value,
            };
            match psets.iter_mut().find(|p| p.name == prop.pset) {
                Some(pset) => match pset.properties.iter_mut().find(|p| p.name == prop.name) {
                    Some(existing) => *existing = entry,
                    None => pset.properties.push(entry),
                },
                None => psets.push(ResolvedPset {
                    name: prop.pset.clone(),
                    properties: vec![entry],
                }),
            }
        }

        Ok(psets)
    }
}

/// First 12 hex characters of the SHA-256 over the length-prefixed source
/// hash, path, name and occurrence index
pub fn short_tag(source_hash: &str, path: &str, name: &str, occurrence_index: u32) -> String {
    let occurrence = occurrence_index.to_string();
    let mut hasher = Sha256::new();
    for field in [source_hash, path, name, occurrence.as_str()] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect()
}
