// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Quality-control report
//!
//! One record per part, aggregated into totals, failure reasons, volume and
//! extent statistics, merge groups and structural checks on the authored
//! document. Geometry figures are in the source file's working units.

use crate::document::IfcDocument;
use crate::error::WriteError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use step2ifc_model::{BoundingBox, RepairAction, ValidityStatus};

/// Outcome of one part
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartStatus {
    Ok,
    Repaired,
    Invalid,
    Skipped,
    MappingFailed,
}

impl From<ValidityStatus> for PartStatus {
    fn from(status: ValidityStatus) -> Self {
        match status {
            ValidityStatus::Ok => PartStatus::Ok,
            ValidityStatus::Repaired => PartStatus::Repaired,
            ValidityStatus::Invalid => PartStatus::Invalid,
        }
    }
}

impl std::fmt::Display for PartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PartStatus::Ok => "OK",
            PartStatus::Repaired => "REPAIRED",
            PartStatus::Invalid => "INVALID",
            PartStatus::Skipped => "SKIPPED",
            PartStatus::MappingFailed => "MAPPING_FAILED",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartQcRecord {
    pub part_id: usize,
    pub name: String,
    pub canonical_name: String,
    pub assembly_path: String,
    pub occurrence_index: u32,
    pub status: PartStatus,
    pub reason: Option<String>,
    /// Whether the part ended up in the document
    pub converted: bool,
    pub bbox: Option<BoundingBox>,
    pub volume: Option<f64>,
    pub repairs: Vec<RepairAction>,
    pub guid: Option<String>,
    /// `brep` or `tessellation`
    pub representation: Option<String>,
    /// GUID of the element this part was merged into
    pub merged_into: Option<String>,
}

impl PartQcRecord {
    pub fn new(
        part_id: usize,
        name: &str,
        canonical_name: &str,
        assembly_path: &str,
        occurrence_index: u32,
    ) -> Self {
        Self {
            part_id,
            name: name.to_string(),
            canonical_name: canonical_name.to_string(),
            assembly_path: assembly_path.to_string(),
            occurrence_index,
            status: PartStatus::Ok,
            reason: None,
            converted: false,
            bbox: None,
            volume: None,
            repairs: Vec::new(),
            guid: None,
            representation: None,
            merged_into: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.converted
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshSettings {
    pub mode: String,
    pub deflection: f64,
    pub angle: f64,
}

/// Run-level facts echoed at the top of the report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QcHeader {
    pub schema: String,
    pub units: String,
    pub working_unit: String,
    pub source_file: String,
    pub source_hash: String,
    pub mesh_settings: MeshSettings,
    pub classification_map: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QcTotals {
    pub total_parts: usize,
    pub converted_parts: usize,
    pub failures: usize,
    pub ok: usize,
    pub repaired: usize,
    pub invalid: usize,
    pub skipped: usize,
    pub mapping_failed: usize,
    /// Parts with no measurable solid volume
    pub invalid_solids: usize,
    pub elements: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeEntry {
    pub part_id: usize,
    pub name: String,
    pub volume: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QcStatistics {
    pub total_volume: f64,
    pub min_volume: Option<f64>,
    pub max_volume: Option<f64>,
    pub bbox: Option<BoundingBox>,
    pub top_volumes: Vec<VolumeEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeGroup {
    pub guid: String,
    pub name: String,
    pub assembly_path: String,
    pub members: Vec<usize>,
}

/// Structural presence checks on the authored document
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicChecks {
    pub project: bool,
    pub site: bool,
    pub building: bool,
    pub storey: bool,
    pub has_geometry: bool,
}

impl BasicChecks {
    pub fn from_document(doc: &IfcDocument) -> Self {
        Self {
            project: doc.count("IfcProject") > 0,
            site: doc.count("IfcSite") > 0,
            building: doc.count("IfcBuilding") > 0,
            storey: doc.count("IfcBuildingStorey") > 0,
            has_geometry: doc.count("IfcShapeRepresentation") > 0,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.project && self.site && self.building && self.storey && self.has_geometry
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QcReport {
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub header: QcHeader,
    pub totals: QcTotals,
    pub failure_reasons: BTreeMap<String, usize>,
    pub statistics: QcStatistics,
    pub merge_groups: Vec<MergeGroup>,
    pub basic_checks: BasicChecks,
    pub parts: Vec<PartQcRecord>,
}

const TOP_VOLUMES: usize = 10;

impl QcReport {
    pub fn build(
        header: QcHeader,
        parts: Vec<PartQcRecord>,
        merge_groups: Vec<MergeGroup>,
        elements: usize,
        doc: &IfcDocument,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut totals = QcTotals {
            total_parts: parts.len(),
            elements,
            ..Default::default()
        };
        let mut failure_reasons: BTreeMap<String, usize> = BTreeMap::new();

        for part in &parts {
            if part.converted {
                totals.converted_parts += 1;
            } else {
                totals.failures += 1;
                let reason = part
                    .reason
                    .clone()
                    .unwrap_or_else(|| part.status.to_string());
                *failure_reasons.entry(reason).or_default() += 1;
            }
            match part.status {
                PartStatus::Ok => totals.ok += 1,
                PartStatus::Repaired => totals.repaired += 1,
                PartStatus::Invalid => totals.invalid += 1,
                PartStatus::Skipped => totals.skipped += 1,
                PartStatus::MappingFailed => totals.mapping_failed += 1,
            }
            if part.volume.is_none() {
                totals.invalid_solids += 1;
            }
        }

        Self {
            created_at,
            header,
            totals,
            failure_reasons,
            statistics: statistics(&parts),
            merge_groups,
            basic_checks: BasicChecks::from_document(doc),
            parts,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &PartQcRecord> {
        self.parts.iter().filter(|p| p.is_failure())
    }

    /// True when any part was not converted or needed a fallback
    pub fn has_issues(&self) -> bool {
        self.totals.failures > 0 || self.totals.invalid > 0
    }

    pub fn to_json(&self) -> Result<String, WriteError> {
        serde_json::to_string_pretty(self).map_err(|source| WriteError::Serialize {
            what: "QC report",
            source,
        })
    }

    /// JSON with `created_at` removed, for run-to-run comparison
    pub fn to_json_without_timestamp(&self) -> Result<String, WriteError> {
        let serialize = |source| WriteError::Serialize {
            what: "QC report",
            source,
        };
        let mut value = serde_json::to_value(self).map_err(serialize)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("created_at");
        }
        serde_json::to_string_pretty(&value).map_err(serialize)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "QC Report - {}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(out, "Schema: {}", self.header.schema);
        let _ = writeln!(out, "Units: {}", self.header.units);
        let _ = writeln!(out, "Source file: {}", self.header.source_file);
        let _ = writeln!(out, "Source hash: {}", self.header.source_hash);
        let _ = writeln!(out, "Total parts: {}", self.totals.total_parts);
        let _ = writeln!(out, "Converted: {}", self.totals.converted_parts);
        let _ = writeln!(out, "Failures: {}", self.totals.failures);
        let _ = writeln!(out, "Invalid solids: {}", self.totals.invalid_solids);
        let _ = writeln!(out, "Elements: {}", self.totals.elements);
        if !self.statistics.top_volumes.is_empty() {
            let volumes: Vec<String> = self
                .statistics
                .top_volumes
                .iter()
                .map(|v| format!("{:.3}", v.volume))
                .collect();
            let _ = writeln!(out, "Top volumes: [{}]", volumes.join(", "));
        }
        if !self.merge_groups.is_empty() {
            let _ = writeln!(out, "Merge groups: {}", self.merge_groups.len());
        }
        let failures: Vec<&PartQcRecord> = self.failures().collect();
        if !failures.is_empty() {
            let _ = writeln!(out, "Failed parts:");
            for part in failures {
                let _ = writeln!(
                    out,
                    "  - {} ({}) {}: {}",
                    part.canonical_name,
                    part.assembly_path,
                    part.status,
                    part.reason.as_deref().unwrap_or("")
                );
            }
        }
        out
    }
}

fn statistics(parts: &[PartQcRecord]) -> QcStatistics {
    let mut volumes: Vec<VolumeEntry> = parts
        .iter()
        .filter_map(|p| {
            p.volume.map(|volume| VolumeEntry {
                part_id: p.part_id,
                name: p.canonical_name.clone(),
                volume,
            })
        })
        .collect();

    let bbox = parts
        .iter()
        .filter_map(|p| p.bbox)
        .reduce(|a, b| a.union(&b));

    let total_volume = volumes.iter().map(|v| v.volume).sum();
    let min_volume = volumes.iter().map(|v| v.volume).reduce(f64::min);
    let max_volume = volumes.iter().map(|v| v.volume).reduce(f64::max);

    volumes.sort_by(|a, b| b.volume.total_cmp(&a.volume).then(a.part_id.cmp(&b.part_id)));
    volumes.truncate(TOP_VOLUMES);

    QcStatistics {
        total_volume,
        min_volume,
        max_volume,
        bbox,
        top_volumes: volumes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn header() -> QcHeader {
        QcHeader {
            schema: "IFC4".into(),
            units: "mm".into(),
            working_unit: "mm".into(),
            source_file: "plant.step".into(),
            source_hash: "abc".into(),
            mesh_settings: MeshSettings {
                mode: "brep".into(),
                deflection: 0.5,
                angle: 0.5,
            },
            classification_map: None,
        }
    }

    fn record(id: usize, status: PartStatus, volume: Option<f64>) -> PartQcRecord {
        let mut r = PartQcRecord::new(id, &format!("P{}", id), &format!("P{}", id), "Root", 0);
        r.status = status;
        r.volume = volume;
        r.converted = matches!(status, PartStatus::Ok | PartStatus::Repaired);
        if let Some(v) = volume {
            r.bbox = BoundingBox::from_points([[0.0, 0.0, 0.0], [v, 1.0, 1.0]]);
        }
        r
    }

    #[test]
    fn test_totals_and_reasons() {
        let mut failed = record(3, PartStatus::MappingFailed, Some(2.0));
        failed.reason = Some("undefined token: Missing".into());
        let parts = vec![
            record(1, PartStatus::Ok, Some(8.0)),
            record(2, PartStatus::Repaired, Some(1.0)),
            failed,
            record(4, PartStatus::Skipped, None),
        ];
        let report = QcReport::build(header(), parts, vec![], 2, &IfcDocument::new(), Utc::now());

        assert_eq!(report.totals.total_parts, 4);
        assert_eq!(report.totals.converted_parts, 2);
        assert_eq!(report.totals.failures, 2);
        assert_eq!(report.totals.mapping_failed, 1);
        assert_eq!(report.totals.invalid_solids, 1);
        assert_eq!(report.failure_reasons["undefined token: Missing"], 1);
        assert_eq!(report.failure_reasons["SKIPPED"], 1);

        assert_relative_eq!(report.statistics.total_volume, 11.0);
        assert_eq!(report.statistics.min_volume, Some(1.0));
        assert_eq!(report.statistics.max_volume, Some(8.0));
        assert_eq!(report.statistics.top_volumes[0].part_id, 1);
        assert_eq!(report.statistics.bbox.unwrap().max, [8.0, 1.0, 1.0]);
        assert!(report.has_issues());
        assert!(!report.basic_checks.all_passed());
    }

    #[test]
    fn test_json_without_timestamp() {
        let parts = vec![record(1, PartStatus::Ok, Some(1.0))];
        let a = QcReport::build(header(), parts.clone(), vec![], 1, &IfcDocument::new(), Utc::now());
        let b = QcReport::build(
            header(),
            parts,
            vec![],
            1,
            &IfcDocument::new(),
            Utc::now() + chrono::Duration::seconds(5),
        );
        assert_ne!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(
            a.to_json_without_timestamp().unwrap(),
            b.to_json_without_timestamp().unwrap()
        );
        let value: serde_json::Value = serde_json::from_str(&a.to_json().unwrap()).unwrap();
        assert_eq!(value["schema"], "IFC4");
        assert_eq!(value["parts"][0]["status"], "OK");
    }

    #[test]
    fn test_text_lists_failures() {
        let mut failed = record(2, PartStatus::MappingFailed, None);
        failed.reason = Some("undefined token: Missing".into());
        let report = QcReport::build(
            header(),
            vec![record(1, PartStatus::Ok, Some(1.0)), failed],
            vec![],
            1,
            &IfcDocument::new(),
            Utc::now(),
        );
        let text = report.to_text();
        assert!(text.starts_with("QC Report - "));
        assert!(text.contains("Total parts: 2"));
        assert!(text.contains("Failures: 1"));
        assert!(text.contains("P2 (Root) MAPPING_FAILED: undefined token: Missing"));
    }
}
