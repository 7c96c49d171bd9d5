// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shape Router - Dynamic dispatch to item processors
//!
//! Routes STEP shape items to the processor registered for their keyword.

use crate::shape::ShapeBuilder;
use crate::{GeometryError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use step2ifc_model::{DecodedEntity, EntityResolver, StepType};

/// Item processor trait
///
/// Each processor reads one family of STEP solid or surface models into the
/// shared [`ShapeBuilder`]. Processors use the `EntityResolver` trait for
/// entity lookups, making them independent of any specific parser.
pub trait ItemProcessor: Send + Sync {
    /// Append the shells of `entity` to `builder`
    fn load(
        &self,
        entity: &DecodedEntity,
        resolver: &dyn EntityResolver,
        builder: &mut ShapeBuilder,
    ) -> Result<()>;

    /// Get supported STEP types
    fn supported_types(&self) -> Vec<StepType>;
}

/// Shape router - routes items to processors
pub struct ShapeRouter {
    processors: HashMap<StepType, Arc<dyn ItemProcessor>>,
}

impl ShapeRouter {
    /// Create new router without any processors registered
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Create router with default processors registered
    ///
    /// - `SolidBrepProcessor` (MANIFOLD_SOLID_BREP, FACETED_BREP, BREP_WITH_VOIDS)
    /// - `SurfaceModelProcessor` (SHELL_BASED_SURFACE_MODEL)
    pub fn with_default_processors() -> Self {
        use crate::processors::{SolidBrepProcessor, SurfaceModelProcessor};

        let mut router = Self::new();
        router.register(Arc::new(SolidBrepProcessor::new()));
        router.register(Arc::new(SurfaceModelProcessor::new()));
        router
    }

    /// Register an item processor
    pub fn register(&mut self, processor: Arc<dyn ItemProcessor>) {
        for step_type in processor.supported_types() {
            self.processors.insert(step_type, Arc::clone(&processor));
        }
    }

    /// Check if a type has a registered processor
    pub fn has_processor(&self, step_type: &StepType) -> bool {
        self.processors.contains_key(step_type)
    }

    /// Load a single shape item
    pub fn load_item(
        &self,
        entity: &DecodedEntity,
        resolver: &dyn EntityResolver,
        builder: &mut ShapeBuilder,
    ) -> Result<()> {
        let processor = self
            .processors
            .get(&entity.step_type)
            .ok_or_else(|| GeometryError::unsupported_type(entity.step_type.name()))?;
        processor.load(entity, resolver, builder)
    }
}

impl Default for ShapeRouter {
    fn default() -> Self {
        Self::with_default_processors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_processors_cover_solids() {
        let router = ShapeRouter::with_default_processors();
        assert!(router.has_processor(&StepType::ManifoldSolidBrep));
        assert!(router.has_processor(&StepType::BrepWithVoids));
        assert!(router.has_processor(&StepType::ShellBasedSurfaceModel));
        assert!(!router.has_processor(&StepType::CartesianPoint));
    }

    #[test]
    fn test_empty_router_rejects_items() {
        struct NoEntities;
        impl EntityResolver for NoEntities {
            fn get(&self, _: step2ifc_model::EntityId) -> Option<Arc<DecodedEntity>> {
                None
            }
            fn entities_by_type(&self, _: &StepType) -> Vec<Arc<DecodedEntity>> {
                Vec::new()
            }
            fn count_by_type(&self, _: &StepType) -> usize {
                0
            }
            fn all_ids(&self) -> Vec<step2ifc_model::EntityId> {
                Vec::new()
            }
        }

        let entity = DecodedEntity::simple(
            step2ifc_model::EntityId(1),
            StepType::FacetedBrep,
            Vec::new(),
        );
        let err = ShapeRouter::new()
            .load_item(&entity, &NoEntities, &mut ShapeBuilder::new())
            .unwrap_err();
        assert!(matches!(err, GeometryError::UnsupportedType(t) if t == "FACETED_BREP"));
    }
}
