// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for geometry processing

use step2ifc_model::EntityId;
use thiserror::Error;

/// Geometry processing result type
pub type Result<T> = std::result::Result<T, GeometryError>;

/// Geometry processing errors
///
/// These stop a single part; healing problems are not errors and are
/// reported through `GeometryMetrics` instead.
#[derive(Error, Debug)]
pub enum GeometryError {
    /// Tolerances or pass bound out of range
    #[error("Invalid geometry options: {0}")]
    InvalidOptions(String),

    /// The part carries no shape items
    #[error("Part '{0}' has no shape representation")]
    NoGeometry(String),

    /// Missing entity error
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Invalid attribute error
    #[error("Invalid attribute {index} on {entity}: {message}")]
    InvalidAttribute {
        entity: EntityId,
        index: usize,
        message: String,
    },

    /// Triangulation error
    #[error("Triangulation error: {0}")]
    Triangulation(String),

    /// Unsupported geometry type
    #[error("Unsupported geometry type: {0}")]
    UnsupportedType(String),
}

impl GeometryError {
    /// Create an options error
    pub fn options(msg: impl Into<String>) -> Self {
        GeometryError::InvalidOptions(msg.into())
    }

    /// Create a triangulation error
    pub fn triangulation(msg: impl Into<String>) -> Self {
        GeometryError::Triangulation(msg.into())
    }

    /// Create an entity not found error
    pub fn entity_not_found(id: EntityId) -> Self {
        GeometryError::EntityNotFound(id)
    }

    /// Create an invalid attribute error
    pub fn invalid_attribute(entity: EntityId, index: usize, msg: impl Into<String>) -> Self {
        GeometryError::InvalidAttribute {
            entity,
            index,
            message: msg.into(),
        }
    }

    /// Create an unsupported type error
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        GeometryError::UnsupportedType(type_name.into())
    }
}
