// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Product structure traversal
//!
//! Builds the part tree from PRODUCT_DEFINITION / NEXT_ASSEMBLY_USAGE_OCCURRENCE
//! links. Placements come from CONTEXT_DEPENDENT_SHAPE_REPRESENTATION through
//! REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION and ITEM_DEFINED_TRANSFORMATION.

use crate::units::attributes_of;
use rustc_hash::{FxHashMap, FxHashSet};
use step2ifc_model::{
    DecodedEntity, EntityId, EntityResolver, IngestError, Part, ShapeHandle, StepType, Transform,
};

/// Solid and surface model keywords a part may carry
const SHAPE_ITEM_TYPES: [StepType; 4] = [
    StepType::ManifoldSolidBrep,
    StepType::FacetedBrep,
    StepType::BrepWithVoids,
    StepType::ShellBasedSurfaceModel,
];

/// Links gathered once before traversal
#[derive(Default)]
struct Links {
    /// Parent definition -> (occurrence, child definition), occurrence id order
    children: FxHashMap<EntityId, Vec<(EntityId, EntityId)>>,
    /// Occurrence -> placement of the child in the parent
    placements: FxHashMap<EntityId, Transform>,
    /// Definition -> shape items
    shapes: FxHashMap<EntityId, Vec<EntityId>>,
}

/// Builds the root [`Part`] of a STEP file
pub struct ProductStructure<'a> {
    resolver: &'a dyn EntityResolver,
    source_name: &'a str,
}

impl<'a> ProductStructure<'a> {
    pub fn new(resolver: &'a dyn EntityResolver, source_name: &'a str) -> Self {
        Self {
            resolver,
            source_name,
        }
    }

    /// Build the part tree
    ///
    /// Several root definitions are wrapped in a synthetic root named after
    /// the source. Without product definitions, every bare solid becomes a
    /// child of a synthetic root.
    pub fn build(&self) -> Result<Part, IngestError> {
        let definitions = self.resolver.entities_by_type(&StepType::ProductDefinition);
        if definitions.is_empty() {
            return self.flat_structure();
        }

        let links = Links {
            children: self.occurrence_links(),
            placements: self.occurrence_placements(),
            shapes: self.definition_shapes(),
        };

        let related: FxHashSet<EntityId> = links
            .children
            .values()
            .flatten()
            .map(|(_, child)| *child)
            .collect();
        let roots: Vec<EntityId> = definitions
            .iter()
            .map(|d| d.id)
            .filter(|id| !related.contains(id))
            .collect();

        if roots.is_empty() {
            return Err(IngestError::Cycle(definitions[0].id));
        }

        let mut visiting = FxHashSet::default();
        let mut parts = roots
            .iter()
            .map(|&root| self.build_part(root, Transform::IDENTITY, &links, &mut visiting))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "Product structure: {} definitions, {} roots",
            definitions.len(),
            parts.len()
        );

        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            let mut root = Part::new(self.source_name, "");
            root.children = parts;
            Ok(root)
        }
    }

    fn build_part(
        &self,
        definition: EntityId,
        placement: Transform,
        links: &Links,
        visiting: &mut FxHashSet<EntityId>,
    ) -> Result<Part, IngestError> {
        if !visiting.insert(definition) {
            return Err(IngestError::Cycle(definition));
        }

        let (name, label) = self.product_identity(definition);
        let mut part = Part::new(name, label);
        part.transform = placement;
        if let Some(items) = links.shapes.get(&definition) {
            if !items.is_empty() {
                part.shape = Some(ShapeHandle {
                    items: items.clone(),
                });
            }
        }

        if let Some(children) = links.children.get(&definition) {
            for (occurrence, child) in children {
                let local = links
                    .placements
                    .get(occurrence)
                    .copied()
                    .unwrap_or(Transform::IDENTITY);
                part.children
                    .push(self.build_part(*child, placement * local, links, visiting)?);
            }
        }

        visiting.remove(&definition);
        Ok(part)
    }

    /// PRODUCT name (or id) and instance label for a definition
    fn product_identity(&self, definition: EntityId) -> (String, String) {
        let product = self
            .resolver
            .get(definition)
            .and_then(|pd| pd.get_ref(2))
            .and_then(|formation| self.resolver.get(formation))
            .and_then(|f| f.get_ref(2))
            .and_then(|product| self.resolver.get(product));

        match product {
            Some(product) => {
                let name = [product.get_string(1), product.get_string(0)]
                    .into_iter()
                    .flatten()
                    .map(str::trim)
                    .find(|s| !s.is_empty())
                    .unwrap_or("Unnamed")
                    .to_string();
                (name, product.id.to_string())
            }
            None => ("Unnamed".to_string(), definition.to_string()),
        }
    }

    /// NEXT_ASSEMBLY_USAGE_OCCURRENCE(id, name, description, relating, related, ...)
    fn occurrence_links(&self) -> FxHashMap<EntityId, Vec<(EntityId, EntityId)>> {
        let mut children: FxHashMap<EntityId, Vec<(EntityId, EntityId)>> = FxHashMap::default();
        for nauo in self
            .resolver
            .entities_by_type(&StepType::NextAssemblyUsageOccurrence)
        {
            if let (Some(parent), Some(child)) = (nauo.get_ref(3), nauo.get_ref(4)) {
                children.entry(parent).or_default().push((nauo.id, child));
            }
        }
        children
    }

    /// Local placement of each occurrence
    fn occurrence_placements(&self) -> FxHashMap<EntityId, Transform> {
        let mut placements = FxHashMap::default();
        for cdsr in self
            .resolver
            .entities_by_type(&StepType::ContextDependentShapeRepresentation)
        {
            let occurrence = cdsr
                .get_ref(1)
                .and_then(|pds| self.resolver.get(pds))
                .and_then(|pds| pds.get_ref(2));
            let relation = cdsr.get_ref(0).and_then(|r| self.resolver.get(r));
            if let (Some(occurrence), Some(relation)) = (occurrence, relation) {
                if let Some(local) = self.relationship_transform(&relation) {
                    placements.insert(occurrence, local);
                }
            }
        }
        placements
    }

    fn relationship_transform(&self, relation: &DecodedEntity) -> Option<Transform> {
        let operator = match attributes_of(
            relation,
            &StepType::RepresentationRelationshipWithTransformation,
        ) {
            Some(attrs) if relation.is_complex() => attrs.first()?.as_entity_ref()?,
            Some(attrs) => attrs.get(4)?.as_entity_ref()?,
            None => return None,
        };
        let idt = self.resolver.get(operator)?;
        if idt.step_type != StepType::ItemDefinedTransformation {
            return None;
        }
        let from = self.axis_placement(idt.get_ref(2)?)?;
        let to = self.axis_placement(idt.get_ref(3)?)?;
        Some(to * from.inverse()?)
    }

    /// AXIS2_PLACEMENT_3D(name, location, axis, ref_direction)
    fn axis_placement(&self, id: EntityId) -> Option<Transform> {
        let placement = self.resolver.get(id)?;
        if placement.step_type != StepType::Axis2Placement3d {
            return None;
        }
        let origin = self.triple(placement.get_ref(1)?)?;
        let axis = placement.get_ref(2).and_then(|d| self.triple(d));
        let ref_direction = placement.get_ref(3).and_then(|d| self.triple(d));
        Some(Transform::from_axes(origin, axis, ref_direction))
    }

    /// Coordinates of a CARTESIAN_POINT or ratios of a DIRECTION
    fn triple(&self, id: EntityId) -> Option<[f64; 3]> {
        let entity = self.resolver.get(id)?;
        let values = entity.get_list(1)?;
        let get = |i: usize| values.get(i).and_then(|v| v.as_float());
        Some([get(0)?, get(1)?, get(2).unwrap_or(0.0)])
    }

    /// Shape items of every definition through SHAPE_DEFINITION_REPRESENTATION
    fn definition_shapes(&self) -> FxHashMap<EntityId, Vec<EntityId>> {
        let related = self.plain_representation_links();
        let mut shapes: FxHashMap<EntityId, Vec<EntityId>> = FxHashMap::default();

        for sdr in self
            .resolver
            .entities_by_type(&StepType::ShapeDefinitionRepresentation)
        {
            let definition = sdr
                .get_ref(0)
                .and_then(|pds| self.resolver.get(pds))
                .filter(|pds| pds.step_type == StepType::ProductDefinitionShape)
                .and_then(|pds| pds.get_ref(2))
                .filter(|def| {
                    self.resolver
                        .get(*def)
                        .is_some_and(|d| d.is_a(&StepType::ProductDefinition))
                });
            let (Some(definition), Some(representation)) = (definition, sdr.get_ref(1)) else {
                continue;
            };

            let items = shapes.entry(definition).or_default();
            let mut seen = FxHashSet::default();
            self.collect_items(representation, &related, &mut seen, items);
        }

        for items in shapes.values_mut() {
            let mut seen = FxHashSet::default();
            items.retain(|id| seen.insert(*id));
        }
        shapes
    }

    /// Shape items of a representation and of representations linked to it
    /// without a transformation
    fn collect_items(
        &self,
        representation: EntityId,
        related: &FxHashMap<EntityId, Vec<EntityId>>,
        seen: &mut FxHashSet<EntityId>,
        out: &mut Vec<EntityId>,
    ) {
        if !seen.insert(representation) {
            return;
        }
        if let Some(rep) = self.resolver.get(representation) {
            for item in rep.get_refs(1).unwrap_or_default() {
                let is_shape = self
                    .resolver
                    .get(item)
                    .is_some_and(|e| e.step_type.is_shape_item());
                if is_shape {
                    out.push(item);
                }
            }
        }
        if let Some(linked) = related.get(&representation) {
            for other in linked {
                self.collect_items(*other, related, seen, out);
            }
        }
    }

    /// SHAPE_REPRESENTATION_RELATIONSHIP links carrying no transformation
    fn plain_representation_links(&self) -> FxHashMap<EntityId, Vec<EntityId>> {
        let mut links: FxHashMap<EntityId, Vec<EntityId>> = FxHashMap::default();
        for srr in self
            .resolver
            .entities_by_type(&StepType::ShapeRepresentationRelationship)
        {
            if srr.is_a(&StepType::RepresentationRelationshipWithTransformation) {
                continue;
            }
            let attrs = if srr.is_complex() {
                attributes_of(&srr, &StepType::RepresentationRelationship)
            } else {
                Some(srr.attributes.as_slice())
            };
            let reps = attrs.and_then(|a| {
                Some((a.get(2)?.as_entity_ref()?, a.get(3)?.as_entity_ref()?))
            });
            if let Some((a, b)) = reps {
                links.entry(a).or_default().push(b);
                links.entry(b).or_default().push(a);
            }
        }
        links
    }

    /// One-level tree of bare solids for files without product structure
    fn flat_structure(&self) -> Result<Part, IngestError> {
        let mut solids: Vec<_> = SHAPE_ITEM_TYPES
            .iter()
            .flat_map(|t| self.resolver.entities_by_type(t))
            .collect();
        solids.sort_by_key(|s| s.id);

        if solids.is_empty() {
            return Err(IngestError::EmptyStructure(self.source_name.to_string()));
        }

        log::info!(
            "No product structure in {}; treating {} solids as parts",
            self.source_name,
            solids.len()
        );

        let mut root = Part::new(self.source_name, "");
        root.children = solids
            .iter()
            .map(|solid| {
                let name = solid
                    .get_string(0)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Unnamed");
                let mut part = Part::new(name, solid.id.to_string());
                part.shape = Some(ShapeHandle {
                    items: vec![solid.id],
                });
                part
            })
            .collect();
        Ok(root)
    }
}
