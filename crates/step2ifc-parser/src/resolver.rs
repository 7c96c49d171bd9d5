// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! EntityResolver trait implementation

use crate::scanner::EntityIndex;
use crate::tokenizer::parse_entity_at;
use rustc_hash::FxHashMap;
use step2ifc_model::{DecodedEntity, EntityId, EntityResolver, StepType};
use std::sync::{Arc, RwLock};

/// Keyword -> entity ids, ascending
pub type TypeIndex = FxHashMap<StepType, Vec<EntityId>>;

/// Thread-safe entity resolver over the DATA section of a STEP file
pub struct StepResolver {
    /// Raw STEP content (owned for thread safety)
    content: String,
    /// Entity ID -> (start, end) byte offsets
    index: EntityIndex,
    /// Decoded entity cache (thread-safe)
    cache: RwLock<FxHashMap<u32, Arc<DecodedEntity>>>,
    /// Type -> entity IDs index; complex instances appear under each partial type
    type_index: TypeIndex,
}

impl StepResolver {
    /// Create a resolver, decoding every entity once to build the type index
    pub fn new(content: String, index: EntityIndex) -> Self {
        let mut type_index = TypeIndex::default();
        for (&id, (start, end)) in &index {
            if let Ok(entity) = parse_entity_at(&content, *start, *end) {
                register(&mut type_index, &entity);
            }
        }
        sort_index(&mut type_index);

        Self {
            content,
            index,
            cache: RwLock::new(FxHashMap::default()),
            type_index,
        }
    }

    /// Create resolver with pre-built type index
    pub fn with_type_index(content: String, index: EntityIndex, mut type_index: TypeIndex) -> Self {
        sort_index(&mut type_index);
        Self {
            content,
            index,
            cache: RwLock::new(FxHashMap::default()),
            type_index,
        }
    }

    /// Decode and cache an entity
    fn decode_and_cache(&self, id: u32) -> Option<Arc<DecodedEntity>> {
        {
            let cache = self.cache.read().ok()?;
            if let Some(cached) = cache.get(&id) {
                return Some(Arc::clone(cached));
            }
        }

        let (start, end) = self.index.get(&id)?;

        let entity = match parse_entity_at(&self.content, *start, *end) {
            Ok(entity) => entity,
            Err(e) => {
                log::warn!("Skipping undecodable entity #{}: {}", id, e);
                return None;
            }
        };
        let arc = Arc::new(entity);

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(id, Arc::clone(&arc));
        }

        Some(arc)
    }
}

/// Add an entity under its keyword, or under every partial type when complex
pub(crate) fn register(type_index: &mut TypeIndex, entity: &DecodedEntity) {
    if entity.is_complex() {
        for component in &entity.components {
            type_index
                .entry(component.step_type.clone())
                .or_default()
                .push(entity.id);
        }
    } else {
        type_index
            .entry(entity.step_type.clone())
            .or_default()
            .push(entity.id);
    }
}

fn sort_index(type_index: &mut TypeIndex) {
    for ids in type_index.values_mut() {
        ids.sort_unstable();
        ids.dedup();
    }
}

impl EntityResolver for StepResolver {
    fn get(&self, id: EntityId) -> Option<Arc<DecodedEntity>> {
        self.decode_and_cache(id.0)
    }

    fn entities_by_type(&self, step_type: &StepType) -> Vec<Arc<DecodedEntity>> {
        self.type_index
            .get(step_type)
            .map(|ids| ids.iter().filter_map(|id| self.get(*id)).collect())
            .unwrap_or_default()
    }

    fn count_by_type(&self, step_type: &StepType) -> usize {
        self.type_index.get(step_type).map(|v| v.len()).unwrap_or(0)
    }

    fn all_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.index.keys().map(|&id| EntityId(id)).collect();
        ids.sort_unstable();
        ids
    }
}
