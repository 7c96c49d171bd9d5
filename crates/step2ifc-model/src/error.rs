// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for STEP parsing and assembly ingest

use crate::EntityId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for parser operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors that can occur while decoding a STEP data section
#[derive(Error, Debug)]
pub enum ParseError {
    /// Invalid STEP file format
    #[error("Invalid STEP format: {0}")]
    InvalidFormat(String),

    /// Failed to parse header section
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Failed to parse entity
    #[error("Failed to parse entity {0}: {1}")]
    EntityParse(EntityId, String),

    /// Entity not found
    #[error("Entity {0} not found")]
    EntityNotFound(EntityId),

    /// Invalid entity reference
    #[error("Invalid entity reference at {entity}: attribute {attribute}")]
    InvalidReference { entity: EntityId, attribute: usize },

    /// Missing required attribute
    #[error("Missing required attribute {attribute} on entity {entity}")]
    MissingAttribute { entity: EntityId, attribute: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl ParseError {
    /// Create a new format error
    pub fn format(msg: impl Into<String>) -> Self {
        ParseError::InvalidFormat(msg.into())
    }

    /// Create a new entity parse error
    pub fn entity_parse(id: EntityId, msg: impl Into<String>) -> Self {
        ParseError::EntityParse(id, msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        ParseError::Other(msg.into())
    }
}

/// Fatal errors raised while turning a STEP source into an assembly tree
#[derive(Error, Debug)]
pub enum IngestError {
    /// The source file could not be read
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The content is not an ISO 10303-21 exchange structure
    #[error("not a STEP exchange structure: {0}")]
    NotStep(String),

    /// Neither product structure nor bare solids were found
    #[error("no products or solids found in {0}")]
    EmptyStructure(String),

    /// The product structure references itself
    #[error("assembly cycle through product definition {0}")]
    Cycle(EntityId),

    /// Decoding failed
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl IngestError {
    /// Create an unreadable-file error
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Unreadable {
            path: path.into(),
            source,
        }
    }
}
