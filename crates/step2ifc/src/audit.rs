// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Append-only NDJSON audit trail
//!
//! Every significant event of a run becomes one JSON line carrying a UTC
//! timestamp, the run id and a tagged payload. Records are kept in memory and,
//! once a file is attached, streamed to it as they happen.

use crate::error::WriteError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use step2ifc_model::{Defect, RepairAction};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    ConversionStart {
        source: String,
        schema: String,
        units: String,
    },
    IngestComplete {
        source_hash: String,
        parts: usize,
        working_unit: String,
    },
    RepairApplied {
        part_id: usize,
        name: String,
        repair: RepairAction,
    },
    GeometryInvalid {
        part_id: usize,
        name: String,
        defects: Vec<Defect>,
        fallback: bool,
    },
    MappingFailed {
        part_id: usize,
        name: String,
        reason: String,
    },
    PartConverted {
        part_id: usize,
        name: String,
        guid: String,
        ifc_class: String,
        representation: Option<String>,
    },
    PartMerged {
        guid: String,
        name: String,
        members: Vec<usize>,
    },
    WriteComplete {
        artifacts: Vec<String>,
    },
    ConversionFailed {
        error: String,
    },
    ConversionCancelled {
        completed_parts: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    #[serde(flatten)]
    pub event: AuditEvent,
}

struct Sink {
    path: PathBuf,
    /// `path` with symlinks and `.`/`..` resolved
    resolved: PathBuf,
    file: File,
}

fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Collects audit records for one run
pub struct AuditLogger {
    run_id: Uuid,
    records: Vec<AuditRecord>,
    sink: Option<Sink>,
}

impl AuditLogger {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            records: Vec::new(),
            sink: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn sink_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|s| s.path.as_path())
    }

    /// Stream to `path` in append mode, replaying the records so far.
    /// Attaching the file already in use, under any spelling of its path, is
    /// a no-op.
    pub fn attach_file(&mut self, path: &Path) -> Result<(), WriteError> {
        if let Some(sink) = &self.sink {
            if sink.path == path || sink.resolved == resolve(path) {
                return Ok(());
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| WriteError::io(path, e))?;
        for record in &self.records {
            let line = serde_json::to_string(record).map_err(|source| WriteError::Serialize {
                what: "audit record",
                source,
            })?;
            writeln!(file, "{}", line).map_err(|e| WriteError::io(path, e))?;
        }
        file.flush().map_err(|e| WriteError::io(path, e))?;
        self.sink = Some(Sink {
            path: path.to_path_buf(),
            resolved: resolve(path),
            file,
        });
        Ok(())
    }

    pub fn record(&mut self, event: AuditEvent) {
        let record = AuditRecord {
            timestamp: Utc::now(),
            run_id: self.run_id,
            event,
        };
        match serde_json::to_string(&record) {
            Ok(line) => {
                log::info!("audit: {}", line);
                if let Some(sink) = &mut self.sink {
                    let written = writeln!(sink.file, "{}", line).and_then(|_| sink.file.flush());
                    if let Err(e) = written {
                        log::warn!("audit log {} not writable: {}", sink.path.display(), e);
                    }
                }
            }
            Err(e) => log::warn!("audit record not serializable: {}", e),
        }
        self.records.push(record);
    }

    /// All records as newline-delimited JSON
    pub fn to_jsonl(&self) -> Result<String, WriteError> {
        let mut out = String::new();
        for record in &self.records {
            let line = serde_json::to_string(record).map_err(|source| WriteError::Serialize {
                what: "audit record",
                source,
            })?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("run_id", &self.run_id)
            .field("records", &self.records.len())
            .field("sink", &self.sink_path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_shape() {
        let mut logger = AuditLogger::new(Uuid::new_v4());
        logger.record(AuditEvent::MappingFailed {
            part_id: 3,
            name: "Valve-01".into(),
            reason: "undefined token: Missing".into(),
        });
        let line = logger.to_jsonl().unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["event"], "mapping_failed");
        assert_eq!(value["part_id"], 3);
        assert_eq!(value["run_id"], logger.run_id().to_string());
        assert!(value["timestamp"].is_string());

        let back: AuditRecord = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(&back, &logger.records()[0]);
    }

    #[test]
    fn test_nested_repair_payload() {
        let mut logger = AuditLogger::new(Uuid::new_v4());
        logger.record(AuditEvent::RepairApplied {
            part_id: 1,
            name: "Body".into(),
            repair: RepairAction::ReorientedFaces { count: 2 },
        });
        let value: serde_json::Value =
            serde_json::from_str(logger.to_jsonl().unwrap().trim()).unwrap();
        assert_eq!(value["repair"]["action"], "reoriented_faces");
        assert_eq!(value["repair"]["count"], 2);
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log.jsonl");
        std::fs::write(&path, "{\"earlier\":true}\n").unwrap();

        let mut logger = AuditLogger::new(Uuid::new_v4());
        logger.record(AuditEvent::ConversionStart {
            source: "a.step".into(),
            schema: "IFC4".into(),
            units: "mm".into(),
        });
        logger.attach_file(&path).unwrap();
        logger.attach_file(&path).unwrap();
        logger.record(AuditEvent::WriteComplete { artifacts: vec![] });

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "{\"earlier\":true}");
        assert!(lines[1].contains("\"conversion_start\""));
        assert!(lines[2].contains("\"write_complete\""));
    }

    #[test]
    fn test_same_file_through_another_path_is_attached_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();
        let direct = dir.path().join("logs").join("run.log.jsonl");
        let dotted = dir.path().join("logs").join(".").join("run.log.jsonl");
        let roundabout = dir.path().join("logs").join("..").join("logs").join("run.log.jsonl");

        let mut logger = AuditLogger::new(Uuid::new_v4());
        logger.record(AuditEvent::ConversionStart {
            source: "a.step".into(),
            schema: "IFC4".into(),
            units: "mm".into(),
        });
        logger.attach_file(&direct).unwrap();
        logger.attach_file(&dotted).unwrap();
        logger.attach_file(&roundabout).unwrap();
        logger.record(AuditEvent::WriteComplete { artifacts: vec![] });

        let text = std::fs::read_to_string(&direct).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(logger.sink_path(), Some(direct.as_path()));
    }
}
