// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity resolution trait for looking up and resolving STEP entities

use crate::{AttributeValue, DecodedEntity, EntityId, StepType};
use std::sync::Arc;

/// Entity lookup and reference resolution
///
/// This trait provides the core functionality for accessing STEP entities
/// and resolving entity references. Implementations should provide O(1)
/// lookup by entity ID and must be shareable across geometry workers.
///
/// # Example
///
/// ```ignore
/// use step2ifc_model::{EntityResolver, EntityId};
///
/// fn product_name(resolver: &dyn EntityResolver, id: EntityId) -> Option<String> {
///     let product = resolver.get(id)?;
///     product.get_string(1).map(str::to_string)
/// }
/// ```
pub trait EntityResolver: Send + Sync {
    /// Get entity by ID
    ///
    /// Returns the decoded entity if it exists, wrapped in an Arc for
    /// efficient sharing.
    fn get(&self, id: EntityId) -> Option<Arc<DecodedEntity>>;

    /// Resolve an entity reference from an attribute value
    fn resolve_ref(&self, attr: &AttributeValue) -> Option<Arc<DecodedEntity>> {
        match attr {
            AttributeValue::EntityRef(id) => self.get(*id),
            _ => None,
        }
    }

    /// Resolve a list of entity references
    ///
    /// Returns an empty vector if the attribute is not a list.
    fn resolve_ref_list(&self, attr: &AttributeValue) -> Vec<Arc<DecodedEntity>> {
        match attr {
            AttributeValue::List(items) => items
                .iter()
                .filter_map(|item| self.resolve_ref(item))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Get all entities of a specific type, in ascending id order
    ///
    /// Complex instances are listed under every partial type they carry.
    fn entities_by_type(&self, step_type: &StepType) -> Vec<Arc<DecodedEntity>>;

    /// Find entities by keyword string (case-insensitive)
    fn find_by_type_name(&self, type_name: &str) -> Vec<Arc<DecodedEntity>> {
        self.entities_by_type(&StepType::parse(type_name))
    }

    /// Count entities of a specific type
    fn count_by_type(&self, step_type: &StepType) -> usize;

    /// Get all entity IDs in the model
    fn all_ids(&self) -> Vec<EntityId>;

    /// Get total entity count
    fn entity_count(&self) -> usize {
        self.all_ids().len()
    }
}

/// Extension methods for EntityResolver
pub trait EntityResolverExt: EntityResolver {
    /// Check if an entity exists
    fn exists(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Get entity or return error
    fn get_or_err(&self, id: EntityId) -> crate::Result<Arc<DecodedEntity>> {
        self.get(id).ok_or(crate::ParseError::EntityNotFound(id))
    }

    /// Resolve reference at `attr_index` of `entity` or return error
    fn resolve_attr_or_err(
        &self,
        entity: &DecodedEntity,
        attr_index: usize,
    ) -> crate::Result<Arc<DecodedEntity>> {
        entity
            .get(attr_index)
            .and_then(|attr| self.resolve_ref(attr))
            .ok_or(crate::ParseError::InvalidReference {
                entity: entity.id,
                attribute: attr_index,
            })
    }
}

// Blanket implementation for all EntityResolver types
impl<T: EntityResolver + ?Sized> EntityResolverExt for T {}
