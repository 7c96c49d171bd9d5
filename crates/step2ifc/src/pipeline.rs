// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversion pipeline
//!
//! Ingest, per-part geometry on a bounded worker pool, then mapping, GUID
//! allocation and authoring on one thread in pre-order. Per-part problems end
//! up in the QC report; run-level problems abort with [`ConvertError`].

use crate::audit::{AuditEvent, AuditLogger};
use crate::config::{CompiledConfig, ConversionConfig, GeometryMode, OnInvalid};
use crate::context::{hash_file, CancelToken, RunContext};
use crate::document::IfcDocument;
use crate::error::{ConfigError, ConvertError, Result, WriteError};
use crate::mapping::{MappingEngine, PartContext, PropertyValue};
use crate::qc::{MergeGroup, MeshSettings, PartQcRecord, PartStatus, QcHeader, QcReport};
use crate::writer::{spf_header, ElementSpec, IfcWriter, Representation};
use chrono::SecondsFormat;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use step2ifc_geometry::{GeometryError, GeometryProcessor, ProcessedShape, Shape, TriangleMesh};
use step2ifc_model::{
    AssemblyReader, AssemblyTree, GeometryMetrics, Part, Transform, ValidityStatus,
};
use step2ifc_parser::StepReader;
use uuid::Uuid;

/// Whether a finished run needs attention
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every part converted without fallback
    Clean,
    /// Some parts were skipped, failed mapping or fell back to a mesh
    CompletedWithIssues,
}

/// Everything a successful run produced
#[derive(Debug)]
pub struct ConversionResult {
    pub run_id: Uuid,
    pub document: IfcDocument,
    /// The document as an ISO 10303-21 exchange structure
    pub spf: String,
    pub qc_report: QcReport,
    pub audit_log: AuditLogger,
}

impl ConversionResult {
    pub fn outcome(&self) -> RunOutcome {
        if self.qc_report.has_issues() {
            RunOutcome::CompletedWithIssues
        } else {
            RunOutcome::Clean
        }
    }

    /// Write `<name>.ifc`, `<name>.qc.json` and `<name>.qc.txt` atomically
    /// and append the audit trail to `<name>.log.jsonl`
    pub fn write_artifacts(&mut self, dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|e| WriteError::io(dir, e))?;

        let ifc = dir.join(format!("{}.ifc", name));
        let json = dir.join(format!("{}.qc.json", name));
        let text = dir.join(format!("{}.qc.txt", name));
        let log = dir.join(format!("{}.log.jsonl", name));

        write_atomic(&ifc, self.spf.as_bytes())?;
        write_atomic(&json, self.qc_report.to_json()?.as_bytes())?;
        write_atomic(&text, self.qc_report.to_text().as_bytes())?;

        self.audit_log.attach_file(&log)?;
        let artifacts = vec![ifc, json, text, log];
        self.audit_log.record(AuditEvent::WriteComplete {
            artifacts: artifacts.iter().map(|p| p.display().to_string()).collect(),
        });
        log::info!("Wrote {} artifacts to {}", artifacts.len(), dir.display());
        Ok(artifacts)
    }
}

/// Temp file in the target directory, renamed over `path` once complete
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::result::Result<(), WriteError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| WriteError::io(path, e))?;
    file.write_all(bytes).map_err(|e| WriteError::io(path, e))?;
    file.flush().map_err(|e| WriteError::io(path, e))?;
    file.persist(path).map_err(|e| WriteError::io(path, e.error))?;
    Ok(())
}

/// Geometry outcome of one part, ready for authoring
enum PartGeometry {
    /// Healed shape usable as a solid
    Solid {
        shape: Shape,
        mesh: TriangleMesh,
    },
    /// Still invalid; exported as a mesh
    Fallback { mesh: TriangleMesh },
    /// Not exported
    Excluded,
}

impl PartGeometry {
    fn is_usable(&self) -> bool {
        !matches!(self, PartGeometry::Excluded)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GroupKind {
    Single,
    Merged,
    Subtree,
}

/// Parts that become one element
struct ElementGroup {
    /// Part providing mapping, GUID and placement
    anchor: usize,
    /// Parts whose geometry forms the representation, pre-order
    members: Vec<usize>,
    kind: GroupKind,
}

/// Configured STEP to IFC converter
pub struct Converter {
    config: CompiledConfig,
    engine: MappingEngine,
    geometry: GeometryProcessor,
    reader: Box<dyn AssemblyReader>,
    cancel: CancelToken,
    audit_file: Option<PathBuf>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .field("audit_file", &self.audit_file)
            .finish_non_exhaustive()
    }
}

impl Converter {
    pub fn new(config: &ConversionConfig) -> Result<Self> {
        let config = config.validate()?;
        let geometry = GeometryProcessor::new(config.geometry_options())
            .map_err(|e| ConfigError::field("geometry", e.to_string()))?;
        Ok(Self {
            engine: MappingEngine::new(&config),
            config,
            geometry,
            reader: Box::new(StepReader::new()),
            cancel: CancelToken::new(),
            audit_file: None,
        })
    }

    /// Use another assembly reader
    pub fn with_reader(mut self, reader: impl AssemblyReader + 'static) -> Self {
        self.reader = Box::new(reader);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stream audit records to `path` from the start of every run
    pub fn with_audit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_file = Some(path.into());
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CompiledConfig {
        &self.config
    }

    pub fn convert(&self, step_path: &Path) -> Result<ConversionResult> {
        let run_id = Uuid::new_v4();
        let mut audit = AuditLogger::new(run_id);
        if let Some(path) = &self.audit_file {
            audit.attach_file(path)?;
        }
        audit.record(AuditEvent::ConversionStart {
            source: step_path.display().to_string(),
            schema: self.config.schema.name().to_string(),
            units: self.config.units.name().to_string(),
        });
        log::info!("Converting {} (run {})", step_path.display(), run_id);

        match self.run(step_path, run_id, &mut audit) {
            Ok((document, spf, qc_report)) => Ok(ConversionResult {
                run_id,
                document,
                spf,
                qc_report,
                audit_log: audit,
            }),
            Err(ConvertError::Cancelled) => {
                log::warn!("Conversion of {} cancelled", step_path.display());
                Err(ConvertError::Cancelled)
            }
            Err(e) => {
                log::error!("Conversion of {} failed: {}", step_path.display(), e);
                audit.record(AuditEvent::ConversionFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn run(
        &self,
        step_path: &Path,
        run_id: Uuid,
        audit: &mut AuditLogger,
    ) -> Result<(IfcDocument, String, QcReport)> {
        let source_hash = hash_file(step_path)
            .map_err(|e| step2ifc_model::IngestError::unreadable(step_path, e))?;
        let mut ctx = RunContext::new(run_id, step_path, source_hash, self.cancel.clone());

        let mut tree = self.reader.read(step_path)?;
        let original_names: Vec<String> = tree.iter().map(|p| p.name.clone()).collect();
        canonicalize(&mut tree.root, &self.engine);
        tree.reindex(|part| part.name.clone());

        let part_count = tree.part_count();
        audit.record(AuditEvent::IngestComplete {
            source_hash: ctx.source_hash.clone(),
            parts: part_count,
            working_unit: tree.unit.name.clone(),
        });
        log::info!(
            "Read {} parts from {} ({})",
            part_count,
            ctx.source_name(),
            tree.unit.name
        );

        let parts = tree.parts();
        let candidates: Vec<&Part> = parts
            .iter()
            .copied()
            .filter(|p| p.has_shape() || (p.is_leaf() && p.id != tree.root.id))
            .collect();

        // Geometry in parallel; results stay in candidate order
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.raw.workers)
            .build()
            .map_err(|e| ConvertError::WorkerPool(e.to_string()))?;
        let cancel = ctx.cancel.clone();
        let resolver = tree.source.as_ref();
        let results = pool.install(|| {
            self.geometry
                .process_parts(&candidates, resolver, &|| cancel.is_cancelled())
        });

        let completed = results.iter().filter(|r| r.is_some()).count();
        if ctx.is_cancelled() || completed < candidates.len() {
            audit.record(AuditEvent::ConversionCancelled {
                completed_parts: completed,
            });
            return Err(ConvertError::Cancelled);
        }

        let mut records: Vec<Option<PartQcRecord>> = vec![None; part_count];
        let mut geometry: Vec<Option<PartGeometry>> = (0..part_count).map(|_| None).collect();
        for (part, result) in candidates.iter().zip(results.into_iter().flatten()) {
            let mut record = PartQcRecord::new(
                part.id,
                &original_names[part.id],
                &part.name,
                &part.assembly_path.to_string(),
                part.occurrence_index,
            );
            let outcome = self.classify(part, result, &mut record, audit);
            records[part.id] = Some(record);
            geometry[part.id] = Some(outcome);
        }

        // Authoring
        let created_at = ctx.started_at;
        let project_key = ctx.project_key();
        let source_name = ctx.source_name();
        let source_hash = ctx.source_hash.clone();
        let groups = self.groups(&tree, &candidates);

        let mut writer = IfcWriter::new(
            &self.config,
            tree.unit.metres,
            &mut ctx.guids,
            created_at.timestamp(),
        )?;
        let mut merge_groups = Vec::new();
        let mut elements = 0;

        for group in &groups {
            if self.cancel.is_cancelled() {
                audit.record(AuditEvent::ConversionCancelled {
                    completed_parts: elements,
                });
                return Err(ConvertError::Cancelled);
            }

            let usable: Vec<usize> = group
                .members
                .iter()
                .copied()
                .filter(|id| geometry[*id].as_ref().is_some_and(PartGeometry::is_usable))
                .collect();
            if usable.is_empty() {
                continue;
            }

            let anchor = parts[group.anchor];
            let part_ctx = PartContext {
                canonical_name: &anchor.name,
                original_name: &original_names[anchor.id],
                assembly_path: &anchor.assembly_path,
                occurrence_index: anchor.occurrence_index,
                source_hash: &source_hash,
                project_key: &project_key,
            };
            let mapping = match self.engine.resolve(&part_ctx) {
                Ok(mapping) => mapping,
                Err(e) => {
                    log::warn!("Mapping failed for {}: {}", anchor.name, e);
                    for id in &usable {
                        if let Some(record) = records[*id].as_mut() {
                            record.status = PartStatus::MappingFailed;
                            record.reason = Some(e.reason());
                            record.converted = false;
                        }
                        audit.record(AuditEvent::MappingFailed {
                            part_id: *id,
                            name: parts[*id].name.clone(),
                            reason: e.reason(),
                        });
                    }
                    continue;
                }
            };

            let guid = writer.allocate_guid(
                &anchor.assembly_path,
                &anchor.name,
                anchor.occurrence_index,
            )?;
            let representation = self.representation(anchor, &usable, &parts, &geometry);

            let mut source_properties = vec![
                ("SourceFile".to_string(), PropertyValue::Label(source_name.clone())),
                ("SourceFormat".to_string(), PropertyValue::Label("STEP".into())),
                ("SourceHash".to_string(), PropertyValue::Label(source_hash.clone())),
                ("StepLabel".to_string(), PropertyValue::Label(anchor.step_label.clone())),
                (
                    "AssemblyPath".to_string(),
                    PropertyValue::Text(anchor.assembly_path.to_string()),
                ),
                (
                    "OriginalName".to_string(),
                    PropertyValue::Label(original_names[anchor.id].clone()),
                ),
                (
                    "OccurrenceIndex".to_string(),
                    PropertyValue::Integer(anchor.occurrence_index as i64),
                ),
            ];
            if group.kind == GroupKind::Merged {
                source_properties.push((
                    "MergedCount".to_string(),
                    PropertyValue::Integer(usable.len() as i64),
                ));
            }

            let kind = representation.kind();
            writer.add_element(ElementSpec {
                guid: guid.clone(),
                ifc_class: &mapping.ifc_class,
                name: &mapping.name,
                object_type: mapping.object_type.as_deref(),
                tag: &mapping.tag,
                storey: mapping.storey.as_deref(),
                placement: anchor.transform,
                representation: Some(representation),
                source_properties,
                psets: &mapping.psets,
                classification: mapping.classification.as_ref(),
            })?;
            elements += 1;

            for id in &usable {
                if let Some(record) = records[*id].as_mut() {
                    record.converted = true;
                    record.guid = Some(guid.to_string());
                    record.representation = Some(kind.to_string());
                    if *id != anchor.id && group.kind != GroupKind::Single {
                        record.merged_into = Some(guid.to_string());
                    }
                }
            }
            audit.record(AuditEvent::PartConverted {
                part_id: anchor.id,
                name: anchor.name.clone(),
                guid: guid.to_string(),
                ifc_class: mapping.ifc_class.clone(),
                representation: Some(kind.to_string()),
            });
            if group.kind == GroupKind::Merged && usable.len() > 1 {
                merge_groups.push(MergeGroup {
                    guid: guid.to_string(),
                    name: anchor.name.clone(),
                    assembly_path: anchor.assembly_path.to_string(),
                    members: usable.clone(),
                });
                audit.record(AuditEvent::PartMerged {
                    guid: guid.to_string(),
                    name: anchor.name.clone(),
                    members: usable,
                });
            }
        }

        let document = writer.finish()?;
        log::info!(
            "Authored {} elements ({} entities)",
            elements,
            document.len()
        );

        let header = spf_header(
            self.config.schema,
            &format!("{}.ifc", project_key),
            &created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let spf = document.to_spf(&header);

        let qc_header = QcHeader {
            schema: self.config.schema.name().to_string(),
            units: self.config.units.name().to_string(),
            working_unit: tree.unit.name.clone(),
            source_file: source_name,
            source_hash,
            mesh_settings: MeshSettings {
                mode: match self.config.raw.geom {
                    GeometryMode::Brep => "brep".to_string(),
                    GeometryMode::Mesh => "mesh".to_string(),
                },
                deflection: self.config.raw.mesh_deflection,
                angle: self.config.raw.mesh_angle,
            },
            classification_map: self
                .config
                .raw
                .class_map
                .as_ref()
                .map(|p| p.display().to_string()),
        };
        let qc_report = QcReport::build(
            qc_header,
            records.into_iter().flatten().collect(),
            merge_groups,
            elements,
            &document,
            created_at,
        );

        Ok((document, spf, qc_report))
    }

    /// Turn one geometry result into a QC record and an authoring decision
    fn classify(
        &self,
        part: &Part,
        result: std::result::Result<(GeometryMetrics, ProcessedShape), GeometryError>,
        record: &mut PartQcRecord,
        audit: &mut AuditLogger,
    ) -> PartGeometry {
        let (metrics, processed) = match result {
            Ok(ok) => ok,
            Err(e) => {
                log::warn!("Part {} ({}) skipped: {}", part.id, part.name, e);
                record.status = PartStatus::Skipped;
                record.reason = Some(e.to_string());
                return PartGeometry::Excluded;
            }
        };

        record.bbox = metrics.bbox;
        record.repairs = metrics.repairs.clone();
        for repair in &metrics.repairs {
            audit.record(AuditEvent::RepairApplied {
                part_id: part.id,
                name: part.name.clone(),
                repair: repair.clone(),
            });
        }

        if metrics.status != ValidityStatus::Invalid {
            record.status = metrics.status.into();
            record.volume = Some(metrics.volume);
            return PartGeometry::Solid {
                shape: processed.shape,
                mesh: processed.mesh,
            };
        }

        let defects: Vec<String> = metrics.defects.iter().map(|d| d.to_string()).collect();
        let fallback = self.config.raw.on_invalid == OnInvalid::MeshFallback
            && !processed.mesh.is_empty();
        audit.record(AuditEvent::GeometryInvalid {
            part_id: part.id,
            name: part.name.clone(),
            defects: metrics.defects,
            fallback,
        });
        record.status = PartStatus::Invalid;
        if fallback {
            record.reason = Some(format!("mesh fallback: {}", defects.join("; ")));
            PartGeometry::Fallback {
                mesh: processed.mesh,
            }
        } else {
            record.reason = Some(format!("invalid geometry: {}", defects.join("; ")));
            PartGeometry::Excluded
        }
    }

    /// Element groups in authoring order
    fn groups(&self, tree: &AssemblyTree, candidates: &[&Part]) -> Vec<ElementGroup> {
        if self.config.raw.split_by_assembly {
            let ids: FxHashSet<usize> = candidates.iter().map(|p| p.id).collect();
            let tops: Vec<&Part> = if tree.root.children.is_empty() {
                vec![&tree.root]
            } else {
                tree.root.children.iter().collect()
            };
            return tops
                .into_iter()
                .map(|top| ElementGroup {
                    anchor: top.id,
                    members: top
                        .iter()
                        .map(|p| p.id)
                        .filter(|id| ids.contains(id))
                        .collect(),
                    kind: GroupKind::Subtree,
                })
                .collect();
        }

        if self.config.raw.merge_by_name {
            let parents: FxHashMap<usize, Option<usize>> = tree
                .parts_with_parent()
                .into_iter()
                .map(|(p, parent)| (p.id, parent))
                .collect();
            let mut index: FxHashMap<(Option<usize>, &str), usize> = FxHashMap::default();
            let mut groups: Vec<ElementGroup> = Vec::new();
            for part in candidates {
                let key = (parents.get(&part.id).copied().flatten(), part.name.as_str());
                match index.get(&key) {
                    Some(&g) => groups[g].members.push(part.id),
                    None => {
                        index.insert(key, groups.len());
                        groups.push(ElementGroup {
                            anchor: part.id,
                            members: vec![part.id],
                            kind: GroupKind::Merged,
                        });
                    }
                }
            }
            return groups;
        }

        candidates
            .iter()
            .map(|p| ElementGroup {
                anchor: p.id,
                members: vec![p.id],
                kind: GroupKind::Single,
            })
            .collect()
    }

    /// Union of the members' geometry in the anchor's coordinates
    fn representation(
        &self,
        anchor: &Part,
        members: &[usize],
        parts: &[&Part],
        geometry: &[Option<PartGeometry>],
    ) -> Representation {
        let inverse = anchor.transform.inverse().unwrap_or_else(|| {
            log::warn!("Part {} has a singular placement", anchor.name);
            Transform::IDENTITY
        });
        let relative = |id: usize| -> Option<Transform> {
            (id != anchor.id).then(|| inverse * parts[id].transform)
        };

        let any_fallback = members
            .iter()
            .any(|id| matches!(geometry[*id], Some(PartGeometry::Fallback { .. })));

        if self.config.raw.geom == GeometryMode::Mesh || any_fallback {
            let meshes = members
                .iter()
                .filter_map(|id| {
                    let mesh = match geometry[*id].as_ref()? {
                        PartGeometry::Solid { mesh, .. } | PartGeometry::Fallback { mesh } => mesh,
                        PartGeometry::Excluded => return None,
                    };
                    Some(match relative(*id) {
                        Some(t) => mesh.transformed(&t),
                        None => mesh.clone(),
                    })
                })
                .collect();
            Representation::Tessellated(meshes)
        } else {
            let shapes = members
                .iter()
                .filter_map(|id| match geometry[*id].as_ref()? {
                    PartGeometry::Solid { shape, .. } => Some(match relative(*id) {
                        Some(t) => place_shape(shape, &t),
                        None => shape.clone(),
                    }),
                    _ => None,
                })
                .collect();
            Representation::Brep(shapes)
        }
    }
}

/// Copy of `shape` with every vertex moved by `transform`
fn place_shape(shape: &Shape, transform: &Transform) -> Shape {
    let mut out = shape.clone();
    for v in &mut out.vertices {
        let p = transform.transform_point([v.x, v.y, v.z]);
        v.x = p[0];
        v.y = p[1];
        v.z = p[2];
    }
    out
}

/// Replace raw names with canonical names throughout the tree
pub(crate) fn canonicalize(part: &mut Part, engine: &MappingEngine) {
    let canonical = engine.normalize(&part.name);
    part.name = if canonical.is_empty() {
        "Unnamed".to_string()
    } else {
        canonical
    };
    for child in &mut part.children {
        canonicalize(child, engine);
    }
}

/// Convert `step_path` with `config`
pub fn convert(step_path: &Path, config: &ConversionConfig) -> Result<ConversionResult> {
    Converter::new(config)?.convert(step_path)
}
