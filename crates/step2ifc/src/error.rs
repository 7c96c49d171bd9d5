// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error taxonomy of a conversion run
//!
//! [`ConvertError`] is fatal and aborts the run without output. Geometry and
//! mapping errors are per part; the pipeline downgrades them to QC records.

use std::path::PathBuf;
use step2ifc_model::IngestError;
use thiserror::Error;

/// Result type alias for conversion runs
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Invalid configuration, naming the offending field
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("{field}: invalid regex '{pattern}': {message}")]
    InvalidRegex {
        field: String,
        pattern: String,
        message: String,
    },

    #[error("{field}: unknown value '{value}'")]
    UnknownValue { field: String, value: String },

    #[error("merge_by_name and split_by_assembly cannot both be enabled")]
    IncompatibleOptions,
}

impl ConfigError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Per-part mapping failure; the part is excluded from authoring
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("undefined token '{key}' in property {property}")]
    UndefinedToken { property: String, key: String },

    #[error("malformed expression '{expression}' in property {property}")]
    MalformedExpression {
        property: String,
        expression: String,
    },

    #[error("value '{value}' of property {property} is not a valid {data_type}")]
    InvalidValue {
        property: String,
        value: String,
        data_type: String,
    },
}

impl MappingError {
    /// Short reason for QC records
    pub fn reason(&self) -> String {
        match self {
            MappingError::UndefinedToken { key, .. } => format!("undefined token: {}", key),
            other => other.to_string(),
        }
    }
}

/// Two distinct owners derived the same identity
#[derive(Error, Debug, Clone, PartialEq)]
#[error("GUID collision on {guid}: '{first}' and '{second}'")]
pub struct GuidCollisionError {
    pub guid: String,
    pub first: String,
    pub second: String,
}

/// Artifact output failures
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl WriteError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WriteError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Fatal run-level errors
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    GuidCollision(#[from] GuidCollisionError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("conversion cancelled")]
    Cancelled,

    #[error("worker pool: {0}")]
    WorkerPool(String),
}
