// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Automatic classification
//!
//! Generates `type_mappings` for files nobody has written a class map for.
//! Every part gets a scored class guess from its name tokens and the
//! proportions of its bounding box. Parts sharing domain tokens and a shape
//! class form a cluster; each token signature becomes one name rule. The
//! source length unit is guessed from header text and part sizes.
//!
//! ```rust,ignore
//! let mapping = step2ifc::auto::generate(Path::new("plant.step"), &base)?;
//! mapping.write(Path::new("out"), "plant")?;
//! let result = step2ifc::convert(Path::new("plant.step"), &mapping.configure(&base))?;
//! ```

use crate::config::{ConversionConfig, LengthUnit, TypeMappingRule};
use crate::context::hash_file;
use crate::error::{ConfigError, Result, WriteError};
use crate::mapping::MappingEngine;
use crate::pipeline::{canonicalize, write_atomic};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use step2ifc_geometry::GeometryProcessor;
use step2ifc_model::{AssemblyReader, BoundingBox, IngestError, Part};
use step2ifc_parser::StepReader;

/// Tokens carrying no meaning for classification
const NOISE_TOKENS: [&str; 10] = [
    "REV", "R", "V", "V1", "V2", "COPY", "ASSY", "ASSEMBLY", "PART", "ITEM",
];

/// Tokens that name a building element family
const DOMAIN_TOKENS: [&str; 19] = [
    "VALVE", "DUCT", "AHU", "PIPE", "ELBOW", "TEE", "COUPLING", "FLANGE", "DIFFUSER", "GRILLE",
    "BOLT", "NUT", "WASHER", "SCREW", "PLATE", "PANEL", "SHEET", "BEAM", "MEMBER",
];

/// Class score contributed by the presence of any of the tokens
const TOKEN_SCORES: [(&[&str], &str, f64); 8] = [
    (&["VALVE"], "IfcValve", 0.9),
    (&["DIFFUSER", "GRILLE"], "IfcAirTerminal", 0.8),
    (&["DUCT", "AHU"], "IfcDuctSegment", 0.7),
    (&["PIPE", "ELBOW", "TEE", "COUPLING"], "IfcPipeSegment", 0.6),
    (&["ELBOW", "TEE", "COUPLING"], "IfcPipeFitting", 0.8),
    (&["BOLT", "NUT", "WASHER", "SCREW"], "IfcMechanicalFastener", 0.8),
    (&["PLATE", "PANEL", "SHEET"], "IfcPlate", 0.6),
    (&["BEAM", "MEMBER"], "IfcMember", 0.6),
];

/// Guesses below this confidence fall back to the proxy class
pub const MIN_CONFIDENCE: f64 = 0.6;

/// Signature of parts without domain tokens
pub const UNSPECIFIED: &str = "UNSPECIFIED";

/// Signatures with more tokens than this get no rule
const MAX_RULE_TOKENS: usize = 3;

/// Leading characters of the file searched for a unit name
const HEADER_SCAN_CHARS: usize = 50_000;

const PROXY: &str = "IfcBuildingElementProxy";

/// Separator between tokens in generated name patterns
const SEPARATOR: &str = "[^0-9A-Za-z]";

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ============================================================================
// Tokens and shape
// ============================================================================

/// Uppercase alphanumeric tokens of a name and its assembly path, noise removed
pub fn normalize_tokens(name: &str, assembly_path: &str) -> Vec<String> {
    format!("{} {}", name, assembly_path)
        .to_uppercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty() && !NOISE_TOKENS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Sorted distinct domain tokens joined by `_`, or [`UNSPECIFIED`]
pub fn token_signature(tokens: &[String]) -> String {
    let mut domain: Vec<&str> = DOMAIN_TOKENS
        .iter()
        .copied()
        .filter(|d| tokens.iter().any(|t| t == d))
        .collect();
    if domain.is_empty() {
        return UNSPECIFIED.to_string();
    }
    domain.sort_unstable();
    domain.join("_")
}

/// Proportion class of a part's bounding box
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    PlateLike,
    PipeLike,
    MemberLike,
    FastenerLike,
    Unknown,
}

impl ShapeClass {
    /// Classify by sorted edge lengths, in source units
    pub fn from_bbox(bbox: Option<&BoundingBox>) -> Self {
        let Some(bbox) = bbox else {
            return ShapeClass::Unknown;
        };
        let mut dims = bbox.size().map(f64::abs);
        dims.sort_by(f64::total_cmp);
        let [small, mid, large] = dims;
        if large <= 0.0 {
            return ShapeClass::Unknown;
        }

        if small / large < 0.05 {
            ShapeClass::PlateLike
        } else if large / mid > 4.0 && mid / small < 1.3 {
            ShapeClass::PipeLike
        } else if large / small.max(1e-6) > 8.0 {
            ShapeClass::MemberLike
        } else if large < 50.0 && mid < 20.0 {
            ShapeClass::FastenerLike
        } else {
            ShapeClass::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShapeClass::PlateLike => "plate_like",
            ShapeClass::PipeLike => "pipe_like",
            ShapeClass::MemberLike => "member_like",
            ShapeClass::FastenerLike => "fastener_like",
            ShapeClass::Unknown => "unknown",
        }
    }
}

// ============================================================================
// Class inference
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    pub ifc_class: String,
    pub score: f64,
}

/// Class guess for one part
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Inference {
    pub ifc_class: String,
    pub object_type: String,
    pub confidence: f64,
    /// Best three classes, highest score first
    pub candidates: Vec<Candidate>,
}

/// Score classes from tokens and shape; the best wins unless it is unsure
pub fn infer_class(tokens: &[String], shape: ShapeClass) -> Inference {
    let mut scores: BTreeMap<&'static str, f64> = BTreeMap::new();
    for (triggers, class, score) in TOKEN_SCORES {
        if triggers.iter().any(|t| tokens.iter().any(|k| k == t)) {
            *scores.entry(class).or_insert(0.0) += score;
        }
    }

    let shape_scores: &[(&'static str, f64)] = match shape {
        ShapeClass::PipeLike => &[("IfcPipeSegment", 0.3), ("IfcPipeFitting", 0.2)],
        ShapeClass::PlateLike => &[("IfcPlate", 0.3)],
        ShapeClass::MemberLike => &[("IfcMember", 0.3)],
        ShapeClass::FastenerLike => &[("IfcMechanicalFastener", 0.3)],
        ShapeClass::Unknown => &[],
    };
    for &(class, score) in shape_scores {
        *scores.entry(class).or_insert(0.0) += score;
    }
    if scores.is_empty() {
        scores.insert(PROXY, 0.4);
    }

    let mut ranked: Vec<(&str, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let (best, top) = ranked[0];
    let confidence = top.min(1.0);
    let ifc_class = if confidence < MIN_CONFIDENCE { PROXY } else { best };

    Inference {
        ifc_class: ifc_class.to_string(),
        object_type: object_type(ifc_class),
        confidence: round3(confidence),
        candidates: ranked
            .iter()
            .take(3)
            .map(|&(class, score)| Candidate {
                ifc_class: class.to_string(),
                score: round3(score),
            })
            .collect(),
    }
}

fn object_type(ifc_class: &str) -> String {
    ifc_class.strip_prefix("Ifc").unwrap_or(ifc_class).to_string()
}

// ============================================================================
// Units
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnitInference {
    pub unit: LengthUnit,
    pub confidence: f64,
    pub rationale: String,
}

/// Unit named in the leading text of a STEP file
pub fn unit_hint(text: &str) -> Option<LengthUnit> {
    let head = match text.char_indices().nth(HEADER_SCAN_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    };
    let head = head.to_ascii_uppercase();
    if head.contains("INCH") {
        Some(LengthUnit::In)
    } else if head.contains("MILLI") {
        Some(LengthUnit::Mm)
    } else if head.contains("METRE") || head.contains("METER") {
        Some(LengthUnit::M)
    } else {
        None
    }
}

/// Pick the source unit from a header hint, else from the median part diagonal
pub fn infer_units(hint: Option<LengthUnit>, diagonals: &[f64]) -> UnitInference {
    if let Some(unit) = hint {
        return UnitInference {
            unit,
            confidence: 0.9,
            rationale: format!("header names {}", unit),
        };
    }

    let mut sizes: Vec<f64> = diagonals.iter().copied().filter(|d| d.is_finite()).collect();
    if sizes.is_empty() {
        return UnitInference {
            unit: LengthUnit::Mm,
            confidence: 0.4,
            rationale: "no header hint and no measured parts".to_string(),
        };
    }
    sizes.sort_by(f64::total_cmp);
    let mid = sizes.len() / 2;
    let median = if sizes.len() % 2 == 0 {
        (sizes[mid - 1] + sizes[mid]) / 2.0
    } else {
        sizes[mid]
    };

    let (unit, confidence) = if (0.001..=5.0).contains(&median) {
        (LengthUnit::M, 0.7)
    } else if (0.1..=200.0).contains(&median) {
        (LengthUnit::In, 0.6)
    } else if (1.0..=5000.0).contains(&median) {
        (LengthUnit::Mm, 0.7)
    } else {
        (LengthUnit::Mm, 0.4)
    };
    UnitInference {
        unit,
        confidence,
        rationale: format!("median part diagonal {:.4} suggests {}", median, unit),
    }
}

// ============================================================================
// Clusters and rules
// ============================================================================

/// What rule generation needs to know about a part
#[derive(Clone, Debug, PartialEq)]
pub struct PartSample {
    pub name: String,
    /// `/`-joined ancestor names
    pub assembly_path: String,
    /// `None` when the part has no usable geometry
    pub bbox: Option<BoundingBox>,
}

/// Per-part outcome, kept for review
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartInference {
    pub name: String,
    pub assembly_path: String,
    pub signature: String,
    pub shape: ShapeClass,
    pub inference: Inference,
}

/// Parts sharing a token signature and shape class
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cluster {
    pub signature: String,
    pub shape: ShapeClass,
    pub parts: usize,
    pub ifc_class: String,
    /// Mean confidence of the winning class over the cluster
    pub confidence: f64,
}

/// Name rule derived from one token signature
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeneratedRule {
    pub signature: String,
    pub match_name_regex: String,
    pub ifc_class: String,
    pub object_type: String,
    pub confidence: f64,
    pub parts: usize,
}

impl GeneratedRule {
    pub fn to_type_mapping(&self) -> TypeMappingRule {
        TypeMappingRule {
            object_type: Some(self.object_type.clone()),
            ..TypeMappingRule::by_name(&self.match_name_regex, &self.ifc_class)
        }
    }
}

/// Statement the generated mapping rests on
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Assumption {
    pub assumption: String,
    pub confidence: f64,
    pub rationale: String,
}

/// Pattern matching names that contain every token as a whole word
pub fn signature_pattern(tokens: &[&str]) -> String {
    let between = format!("{0}(?:.*{0})?", SEPARATOR);
    let mut orders = Vec::new();
    permutations(&mut tokens.to_vec(), 0, &mut orders);
    let alternatives: Vec<String> = orders
        .iter()
        .map(|order| {
            let words: Vec<String> = order.iter().map(|t| regex::escape(t)).collect();
            words.join(&between)
        })
        .collect();
    format!("(?:^|{0})(?:{1})(?:{0}|$)", SEPARATOR, alternatives.join("|"))
}

fn permutations<'a>(tokens: &mut Vec<&'a str>, k: usize, out: &mut Vec<Vec<&'a str>>) {
    if k == tokens.len() {
        out.push(tokens.clone());
        return;
    }
    for i in k..tokens.len() {
        tokens.swap(k, i);
        permutations(tokens, k + 1, out);
        tokens.swap(k, i);
    }
}

/// Class with the highest summed confidence; ties go to the name
fn winner(scores: &BTreeMap<String, f64>) -> Option<(&String, f64)> {
    scores
        .iter()
        .map(|(class, score)| (class, *score))
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
}

/// Generated class map of one source file
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AutoMapping {
    pub generated_at: DateTime<Utc>,
    pub source_hash: String,
    pub schema: String,
    pub units: UnitInference,
    pub default_class: String,
    /// Most specific signature first
    pub rules: Vec<GeneratedRule>,
    pub clusters: Vec<Cluster>,
    pub parts: Vec<PartInference>,
    pub assumptions: Vec<Assumption>,
}

impl AutoMapping {
    /// Classify `samples` and derive one rule per token signature
    pub fn from_samples(
        source_hash: &str,
        schema: &str,
        unit_hint: Option<LengthUnit>,
        samples: &[PartSample],
    ) -> Self {
        let parts: Vec<PartInference> = samples
            .iter()
            .map(|sample| {
                let tokens = normalize_tokens(&sample.name, &sample.assembly_path);
                let shape = ShapeClass::from_bbox(sample.bbox.as_ref());
                PartInference {
                    name: sample.name.clone(),
                    assembly_path: sample.assembly_path.clone(),
                    signature: token_signature(&tokens),
                    shape,
                    inference: infer_class(&tokens, shape),
                }
            })
            .collect();

        // Summed confidence per class, by cluster and by signature
        let mut by_cluster: BTreeMap<(String, ShapeClass), (usize, BTreeMap<String, f64>)> =
            BTreeMap::new();
        let mut by_signature: BTreeMap<String, (usize, BTreeMap<String, f64>)> = BTreeMap::new();
        for part in &parts {
            let class = part.inference.ifc_class.clone();
            let confidence = part.inference.confidence;
            for (count, scores) in [
                by_cluster
                    .entry((part.signature.clone(), part.shape))
                    .or_default(),
                by_signature.entry(part.signature.clone()).or_default(),
            ] {
                *count += 1;
                *scores.entry(class.clone()).or_insert(0.0) += confidence;
            }
        }

        let clusters: Vec<Cluster> = by_cluster
            .iter()
            .filter_map(|((signature, shape), (count, scores))| {
                let (class, score) = winner(scores)?;
                Some(Cluster {
                    signature: signature.clone(),
                    shape: *shape,
                    parts: *count,
                    ifc_class: class.clone(),
                    confidence: round3(score / *count as f64),
                })
            })
            .collect();

        let mut rules: Vec<GeneratedRule> = by_signature
            .iter()
            .filter(|(signature, _)| signature.as_str() != UNSPECIFIED)
            .filter_map(|(signature, (count, scores))| {
                let tokens: Vec<&str> = signature.split('_').collect();
                if tokens.len() > MAX_RULE_TOKENS {
                    log::debug!("No rule for signature {} ({} tokens)", signature, tokens.len());
                    return None;
                }
                let (class, score) = winner(scores)?;
                Some(GeneratedRule {
                    signature: signature.clone(),
                    match_name_regex: signature_pattern(&tokens),
                    ifc_class: class.clone(),
                    object_type: object_type(class),
                    confidence: round3(score / *count as f64),
                    parts: *count,
                })
            })
            .collect();
        // First match wins, so combined signatures go before their parts
        rules.sort_by(|a, b| {
            let tokens = |r: &GeneratedRule| r.signature.split('_').count();
            tokens(b).cmp(&tokens(a)).then_with(|| a.signature.cmp(&b.signature))
        });

        let diagonals: Vec<f64> = samples
            .iter()
            .filter_map(|s| s.bbox.as_ref())
            .map(|b| {
                let [x, y, z] = b.size();
                (x * x + y * y + z * z).sqrt()
            })
            .collect();
        let units = infer_units(unit_hint, &diagonals);

        let unspecified = by_signature.get(UNSPECIFIED).map_or(0, |(count, _)| *count);
        let mut assumptions = vec![Assumption {
            assumption: format!("source length unit is {}", units.unit),
            confidence: units.confidence,
            rationale: units.rationale.clone(),
        }];
        if unspecified > 0 {
            assumptions.push(Assumption {
                assumption: format!("{} parts without domain tokens map to {}", unspecified, PROXY),
                confidence: 0.4,
                rationale: "names carry no recognized element family".to_string(),
            });
        }

        log::info!(
            "Generated {} rules from {} parts in {} clusters (unit {}, confidence {})",
            rules.len(),
            parts.len(),
            clusters.len(),
            units.unit,
            units.confidence
        );

        Self {
            generated_at: Utc::now(),
            source_hash: source_hash.to_string(),
            schema: schema.to_string(),
            units,
            default_class: PROXY.to_string(),
            rules,
            clusters,
            parts,
            assumptions,
        }
    }

    /// `base` with the generated rules ahead of its own and the inferred unit
    pub fn configure(&self, base: &ConversionConfig) -> ConversionConfig {
        let mut type_mappings: Vec<TypeMappingRule> =
            self.rules.iter().map(GeneratedRule::to_type_mapping).collect();
        type_mappings.extend(base.type_mappings.iter().cloned());
        ConversionConfig {
            type_mappings,
            units: self.units.unit.name().to_string(),
            ..base.clone()
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, WriteError> {
        serde_json::to_string_pretty(self).map_err(|source| WriteError::Serialize {
            what: "class map",
            source,
        })
    }

    /// Write `<name>.classmap.autogen.json` atomically
    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| WriteError::io(dir, e))?;
        let path = dir.join(format!("{}.classmap.autogen.json", name));
        write_atomic(&path, self.to_json()?.as_bytes())?;
        log::info!(
            "Wrote class map {} ({})",
            path.display(),
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        Ok(path)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Read and measure `step_path`, then generate its class map
///
/// Name normalization and geometry settings come from `base`. Parts whose
/// geometry fails still contribute their names.
pub fn generate(step_path: &Path, base: &ConversionConfig) -> Result<AutoMapping> {
    let config = base.validate()?;
    let geometry = GeometryProcessor::new(config.geometry_options())
        .map_err(|e| ConfigError::field("geometry", e.to_string()))?;
    let engine = MappingEngine::new(&config);

    let source_hash = hash_file(step_path).map_err(|e| IngestError::unreadable(step_path, e))?;
    let bytes = fs::read(step_path).map_err(|e| IngestError::unreadable(step_path, e))?;
    let content = String::from_utf8_lossy(&bytes);
    let source_name = step_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut tree = StepReader::new().read_str(&content, &source_name)?;
    canonicalize(&mut tree.root, &engine);

    let parts = tree.parts();
    let candidates: Vec<&Part> = parts
        .iter()
        .copied()
        .filter(|p| p.has_shape() || (p.is_leaf() && p.id != tree.root.id))
        .collect();
    let resolver = tree.source.as_ref();
    let results = geometry.process_parts(&candidates, resolver, &|| false);

    let samples: Vec<PartSample> = candidates
        .iter()
        .zip(results)
        .map(|(part, result)| PartSample {
            name: part.name.clone(),
            assembly_path: part.assembly_path.to_string(),
            bbox: result
                .and_then(|r| r.ok())
                .and_then(|(metrics, _)| metrics.bbox),
        })
        .collect();

    Ok(AutoMapping::from_samples(
        &source_hash,
        config.schema.name(),
        unit_hint(&content),
        &samples,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::PartContext;
    use step2ifc_model::AssemblyPath;

    fn tokens(name: &str) -> Vec<String> {
        normalize_tokens(name, "")
    }

    fn bbox(x: f64, y: f64, z: f64) -> Option<BoundingBox> {
        Some(BoundingBox {
            min: [0.0; 3],
            max: [x, y, z],
        })
    }

    fn sample(name: &str, bbox: Option<BoundingBox>) -> PartSample {
        PartSample {
            name: name.to_string(),
            assembly_path: "Plant".to_string(),
            bbox,
        }
    }

    fn engine(config: &ConversionConfig) -> MappingEngine {
        MappingEngine::new(&config.validate().unwrap())
    }

    fn class_of(engine: &MappingEngine, name: &str) -> String {
        let path = AssemblyPath::new();
        let ctx = PartContext {
            canonical_name: name,
            original_name: name,
            assembly_path: &path,
            occurrence_index: 0,
            source_hash: "abc123",
            project_key: "Project",
        };
        engine.resolve(&ctx).unwrap().ifc_class
    }

    #[test]
    fn test_tokens_drop_noise() {
        assert_eq!(
            normalize_tokens("Gate-Valve_REV2 copy", "Plant/ASSY-1"),
            vec!["GATE", "VALVE", "REV2", "PLANT", "1"]
        );
        assert_eq!(token_signature(&tokens("tee PIPE elbow pipe")), "ELBOW_PIPE_TEE");
        assert_eq!(token_signature(&tokens("Bracket 7")), UNSPECIFIED);
    }

    #[test]
    fn test_shape_classes() {
        assert_eq!(ShapeClass::from_bbox(bbox(1000.0, 500.0, 10.0).as_ref()), ShapeClass::PlateLike);
        assert_eq!(ShapeClass::from_bbox(bbox(100.0, 100.0, 2000.0).as_ref()), ShapeClass::PipeLike);
        assert_eq!(ShapeClass::from_bbox(bbox(100.0, 200.0, 1500.0).as_ref()), ShapeClass::MemberLike);
        assert_eq!(ShapeClass::from_bbox(bbox(10.0, 10.0, 30.0).as_ref()), ShapeClass::FastenerLike);
        assert_eq!(ShapeClass::from_bbox(bbox(400.0, 400.0, 400.0).as_ref()), ShapeClass::Unknown);
        assert_eq!(ShapeClass::from_bbox(None), ShapeClass::Unknown);
        assert_eq!(ShapeClass::from_bbox(bbox(0.0, 0.0, 0.0).as_ref()), ShapeClass::Unknown);
    }

    #[test]
    fn test_tokens_and_shape_add_up() {
        let valve = infer_class(&tokens("Valve-01"), ShapeClass::Unknown);
        assert_eq!(valve.ifc_class, "IfcValve");
        assert_eq!(valve.object_type, "Valve");
        assert_eq!(valve.confidence, 0.9);

        // Fitting tokens also count towards segments; the shape tips it
        let elbow = infer_class(&tokens("Elbow 90"), ShapeClass::PipeLike);
        assert_eq!(elbow.ifc_class, "IfcPipeFitting");
        assert_eq!(elbow.candidates[0].score, 1.0);
        assert_eq!(elbow.candidates[1].ifc_class, "IfcPipeSegment");
        assert_eq!(elbow.candidates[1].score, 0.9);

        let panel = infer_class(&tokens("Panel"), ShapeClass::PlateLike);
        assert_eq!(panel.ifc_class, "IfcPlate");
        assert_eq!(panel.confidence, 0.9);
    }

    #[test]
    fn test_unsure_guess_falls_back_to_proxy() {
        let shaped = infer_class(&tokens("Bracket"), ShapeClass::MemberLike);
        assert_eq!(shaped.ifc_class, PROXY);
        assert_eq!(shaped.candidates[0].ifc_class, "IfcMember");
        assert!(shaped.confidence < MIN_CONFIDENCE);

        let blank = infer_class(&tokens("Bracket"), ShapeClass::Unknown);
        assert_eq!(blank.ifc_class, PROXY);
        assert_eq!(blank.object_type, "BuildingElementProxy");
        assert_eq!(blank.confidence, 0.4);
    }

    #[test]
    fn test_unit_inference() {
        assert_eq!(unit_hint("FILE_NAME('x');\n#1=(NAMED_UNIT(*) SI_UNIT(.MILLI.,.METRE.));"), Some(LengthUnit::Mm));
        assert_eq!(unit_hint("CONVERSION_BASED_UNIT('INCH',#5)"), Some(LengthUnit::In));
        assert_eq!(unit_hint("ISO-10303-21;"), None);

        let hinted = infer_units(Some(LengthUnit::In), &[1000.0]);
        assert_eq!((hinted.unit, hinted.confidence), (LengthUnit::In, 0.9));

        let metres = infer_units(None, &[1.2, 2.5, 0.8]);
        assert_eq!((metres.unit, metres.confidence), (LengthUnit::M, 0.7));
        let inches = infer_units(None, &[30.0, 40.0]);
        assert_eq!((inches.unit, inches.confidence), (LengthUnit::In, 0.6));
        let millimetres = infer_units(None, &[800.0, 1500.0, 2400.0]);
        assert_eq!((millimetres.unit, millimetres.confidence), (LengthUnit::Mm, 0.7));
        assert_eq!(infer_units(None, &[]).confidence, 0.4);
        assert_eq!(infer_units(None, &[90_000.0]).confidence, 0.4);
    }

    #[test]
    fn test_signature_pattern_matches_whole_tokens() {
        let re = regex::RegexBuilder::new(&signature_pattern(&["PIPE", "VALVE"]))
            .case_insensitive(true)
            .build()
            .unwrap();
        assert!(re.is_match("Valve_on_pipe-3"));
        assert!(re.is_match("PIPE VALVE"));
        assert!(!re.is_match("Pipeline valve"));
        assert!(!re.is_match("Valve"));
    }

    #[test]
    fn test_rules_feed_type_mappings() {
        let samples = vec![
            sample("Valve-01", bbox(200.0, 150.0, 150.0)),
            sample("Valve-02", bbox(200.0, 150.0, 150.0)),
            sample("Pipe Valve", bbox(300.0, 300.0, 300.0)),
            sample("Pipe-A", bbox(100.0, 100.0, 2000.0)),
            sample("Base Plate", bbox(600.0, 400.0, 12.0)),
            sample("Bracket", None),
        ];
        let mapping = AutoMapping::from_samples("abc123", "IFC4", None, &samples);

        let signatures: Vec<&str> = mapping.rules.iter().map(|r| r.signature.as_str()).collect();
        assert_eq!(signatures, vec!["PIPE_VALVE", "PIPE", "PLATE", "VALVE"]);
        assert!(mapping.clusters.iter().any(|c| c.signature == UNSPECIFIED));
        assert_eq!(mapping.parts.len(), 6);

        let base = ConversionConfig {
            type_mappings: vec![TypeMappingRule::by_name("^Bracket", "IfcDiscreteAccessory")],
            ..Default::default()
        };
        let config = mapping.configure(&base);
        assert_eq!(config.type_mappings.len(), 5);
        assert_eq!(config.type_mappings[2].object_type.as_deref(), Some("Plate"));
        assert_eq!(config.units, "mm");

        let e = engine(&config);
        assert_eq!(class_of(&e, "Valve-07"), "IfcValve");
        assert_eq!(class_of(&e, "Pipe Valve"), "IfcValve");
        assert_eq!(class_of(&e, "Pipe-B"), "IfcPipeSegment");
        assert_eq!(class_of(&e, "Base Plate"), "IfcPlate");
        assert_eq!(class_of(&e, "Bracket"), "IfcDiscreteAccessory");
        assert_eq!(class_of(&e, "Pipeline"), PROXY);
    }

    #[test]
    fn test_long_signatures_get_no_rule() {
        let samples = vec![sample("Pipe Valve Flange Tee", None)];
        let mapping = AutoMapping::from_samples("abc123", "IFC4", None, &samples);
        assert!(mapping.rules.is_empty());
        assert_eq!(mapping.clusters[0].signature, "FLANGE_PIPE_TEE_VALVE");
    }

    #[test]
    fn test_class_map_json() {
        let samples = vec![sample("Beam B1", bbox(100.0, 200.0, 1500.0)), sample("Bracket", None)];
        let mapping = AutoMapping::from_samples("abc123", "IFC4", Some(LengthUnit::Mm), &samples);
        let json: serde_json::Value = serde_json::from_str(&mapping.to_json().unwrap()).unwrap();
        assert_eq!(json["source_hash"], "abc123");
        assert_eq!(json["units"]["unit"], "mm");
        assert_eq!(json["default_class"], PROXY);
        assert_eq!(json["rules"][0]["ifc_class"], "IfcMember");
        assert_eq!(json["parts"][0]["shape"], "member_like");
        assert_eq!(json["assumptions"].as_array().unwrap().len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = mapping.write(dir.path(), "plant").unwrap();
        assert!(path.ends_with("plant.classmap.autogen.json"));
        assert!(path.exists());
    }
}
