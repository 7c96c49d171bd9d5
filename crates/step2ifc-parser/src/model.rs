// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ParsedStep - indexed STEP data section plus header metadata

use crate::header::{is_exchange_structure, parse_header};
use crate::resolver::{register, StepResolver, TypeIndex};
use crate::scanner::{EntityIndex, EntityScanner};
use crate::tokenizer::parse_entity_at;
use crate::units::extract_length_unit;
use rustc_hash::FxHashMap;
use step2ifc_model::{EntityId, ModelMetadata, ParseError, Result, SourceUnit, StepType};
use std::sync::Arc;

/// Indexed STEP file
///
/// Entities are decoded lazily through the resolver; only complex instances
/// are decoded up front so their partial types can be indexed.
pub struct ParsedStep {
    pub resolver: Arc<StepResolver>,
    pub metadata: ModelMetadata,
    /// Declared length unit, `None` when the file declares none
    pub unit: Option<SourceUnit>,
}

impl ParsedStep {
    /// Index STEP content
    pub fn parse(content: &str) -> Result<Self> {
        if !is_exchange_structure(content) {
            return Err(ParseError::format(
                "missing ISO-10303-21 signature or DATA section",
            ));
        }

        let mut index: EntityIndex = FxHashMap::default();
        let mut type_index = TypeIndex::default();
        let mut scanner = EntityScanner::new(content);
        while let Some((id, type_name, start, end)) = scanner.next_entity() {
            index.insert(id, (start, end));
            if type_name.is_empty() {
                let entity = parse_entity_at(content, start, end)
                    .map_err(|e| ParseError::entity_parse(EntityId(id), e))?;
                register(&mut type_index, &entity);
            } else {
                type_index
                    .entry(StepType::parse(type_name))
                    .or_default()
                    .push(EntityId(id));
            }
        }

        let resolver = Arc::new(StepResolver::with_type_index(
            content.to_string(),
            index,
            type_index,
        ));
        let unit = extract_length_unit(resolver.as_ref());
        let metadata = parse_header(content);

        Ok(Self {
            resolver,
            metadata,
            unit,
        })
    }
}
