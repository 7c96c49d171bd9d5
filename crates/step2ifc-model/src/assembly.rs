// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembly tree and traversal

use crate::{EntityId, EntityResolver, ModelMetadata, SourceUnit, Transform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Separator between path segments in identity keys; stripped from names at ingest
pub const PATH_KEY_SEPARATOR: char = '\u{1f}';
/// Marker preceding a non-zero occurrence index in identity keys
pub const OCCURRENCE_MARKER: char = '\u{1e}';

/// One ancestor in an assembly path
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub name: String,
    pub occurrence_index: u32,
}

/// Ordered ancestor names of a part, root first
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssemblyPath {
    pub segments: Vec<PathSegment>,
}

impl AssemblyPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path extended by one segment
    pub fn child(&self, name: &str, occurrence_index: u32) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment {
            name: name.to_string(),
            occurrence_index,
        });
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Segment names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.name.as_str())
    }

    /// Identity key: names joined by [`PATH_KEY_SEPARATOR`], with non-zero
    /// occurrence indices appended after [`OCCURRENCE_MARKER`]
    pub fn key(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push(PATH_KEY_SEPARATOR);
            }
            out.push_str(&seg.name);
            if seg.occurrence_index > 0 {
                out.push(OCCURRENCE_MARKER);
                out.push_str("occ");
                out.push_str(&seg.occurrence_index.to_string());
            }
        }
        out
    }

    /// Segment-wise prefix test; `prefix` is written with `/` between names
    pub fn starts_with(&self, prefix: &[String]) -> bool {
        prefix.len() <= self.segments.len()
            && prefix
                .iter()
                .zip(self.segments.iter())
                .all(|(p, s)| p == &s.name)
    }
}

impl fmt::Display for AssemblyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(&seg.name)?;
        }
        Ok(())
    }
}

/// Representation items carrying a part's own geometry
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeHandle {
    pub items: Vec<EntityId>,
}

/// Node of the assembly tree
#[derive(Clone, Debug)]
pub struct Part {
    /// Stable pre-order traversal index
    pub id: usize,
    pub name: String,
    /// Originating STEP instance, e.g. `#42`
    pub step_label: String,
    /// Ancestor names, root first (excludes this part)
    pub assembly_path: AssemblyPath,
    /// Index among same-name siblings, in traversal order
    pub occurrence_index: u32,
    pub shape: Option<ShapeHandle>,
    /// Placement in root coordinates
    pub transform: Transform,
    pub children: Vec<Part>,
}

impl Part {
    /// Create a node with identity placement and no children
    pub fn new(name: impl Into<String>, step_label: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: sanitize_name(&name.into()),
            step_label: step_label.into(),
            assembly_path: AssemblyPath::new(),
            occurrence_index: 0,
            shape: None,
            transform: Transform::IDENTITY,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn has_shape(&self) -> bool {
        self.shape.as_ref().is_some_and(|s| !s.items.is_empty())
    }

    /// Path including this part as the last segment
    pub fn full_path(&self) -> AssemblyPath {
        self.assembly_path.child(&self.name, self.occurrence_index)
    }

    /// Depth-first pre-order iterator over this subtree
    pub fn iter(&self) -> PartIter<'_> {
        PartIter { stack: vec![self] }
    }
}

/// Depth-first pre-order iterator over parts
pub struct PartIter<'a> {
    stack: Vec<&'a Part>,
}

impl<'a> Iterator for PartIter<'a> {
    type Item = &'a Part;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Add children in reverse order so first child is processed first
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// Assembly tree produced by an [`AssemblyReader`](crate::AssemblyReader)
pub struct AssemblyTree {
    pub root: Part,
    /// Resolver over the source data section, shared with geometry workers
    pub source: Arc<dyn EntityResolver>,
    pub metadata: ModelMetadata,
    /// Length unit of the source coordinates
    pub unit: SourceUnit,
    /// Display name of the source (file stem)
    pub source_name: String,
}

impl fmt::Debug for AssemblyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyTree")
            .field("root", &self.root)
            .field("metadata", &self.metadata)
            .field("unit", &self.unit)
            .field("source_name", &self.source_name)
            .finish_non_exhaustive()
    }
}

impl AssemblyTree {
    /// Build a tree and assign ids, paths and occurrence indices by raw name
    pub fn new(
        root: Part,
        source: Arc<dyn EntityResolver>,
        metadata: ModelMetadata,
        unit: SourceUnit,
        source_name: impl Into<String>,
    ) -> Self {
        let mut tree = Self {
            root,
            source,
            metadata,
            unit,
            source_name: source_name.into(),
        };
        tree.reindex(|part| part.name.clone());
        tree
    }

    /// Pre-order iterator; the n-th item has `id == n`
    pub fn iter(&self) -> PartIter<'_> {
        self.root.iter()
    }

    /// Parts in pre-order, indexable by `Part::id`
    pub fn parts(&self) -> Vec<&Part> {
        self.iter().collect()
    }

    /// Pre-order list of `(part, parent id)`
    pub fn parts_with_parent(&self) -> Vec<(&Part, Option<usize>)> {
        let mut out = Vec::new();
        let mut stack: Vec<(&Part, Option<usize>)> = vec![(&self.root, None)];
        while let Some((node, parent)) = stack.pop() {
            for child in node.children.iter().rev() {
                stack.push((child, Some(node.id)));
            }
            out.push((node, parent));
        }
        out
    }

    /// Leaves in pre-order
    pub fn leaves(&self) -> Vec<&Part> {
        self.iter().filter(|p| p.is_leaf()).collect()
    }

    /// Number of parts including the root
    pub fn part_count(&self) -> usize {
        self.iter().count()
    }

    /// Reassign ids, paths and occurrence indices
    ///
    /// Occurrence indices count siblings sharing the same `key(part)`, in
    /// child order. Ancestor segments of every path pick up the new indices.
    pub fn reindex<F: Fn(&Part) -> String>(&mut self, key: F) {
        let mut next_id = 0;
        self.root.occurrence_index = 0;
        assign(&mut self.root, AssemblyPath::new(), &key, &mut next_id);
    }
}

fn assign<F: Fn(&Part) -> String>(
    part: &mut Part,
    path: AssemblyPath,
    key: &F,
    next_id: &mut usize,
) {
    part.id = *next_id;
    *next_id += 1;
    part.assembly_path = path;

    let mut seen: HashMap<String, u32> = HashMap::new();
    for child in part.children.iter_mut() {
        let slot = seen.entry(key(child)).or_insert(0);
        child.occurrence_index = *slot;
        *slot += 1;
    }

    let child_path = part.full_path();
    for child in part.children.iter_mut() {
        assign(child, child_path.clone(), key, next_id);
    }
}

/// Remove the identity-key separators from a raw name
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != PATH_KEY_SEPARATOR && *c != OCCURRENCE_MARKER)
        .collect()
}
