// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deterministic IFC GlobalIds
//!
//! A GUID is the first 128 bits of a SHA-256 over length-prefixed input
//! fields, packed into the 22-character IFC base-64 alphabet.

use crate::error::GuidCollisionError;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use step2ifc_model::AssemblyPath;

/// Digit order of the compressed GlobalId encoding
pub const IFC_GUID_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_$";

/// 22-character compressed GlobalId
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pack 128 bits: 2 bits in the first character, 6 in each of the other 21
pub fn compress(value: u128) -> Guid {
    let mut out = String::with_capacity(22);
    out.push(IFC_GUID_ALPHABET[(value >> 126) as usize & 0x3] as char);
    for i in 1..22 {
        let shift = 126 - 6 * i;
        out.push(IFC_GUID_ALPHABET[(value >> shift) as usize & 0x3f] as char);
    }
    Guid(out)
}

fn digest_fields(fields: &[&str]) -> u128 {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    let hash = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    u128::from_be_bytes(bytes)
}

/// Identity of a part from its source, path key, canonical name and occurrence
pub fn derive_guid(
    source_hash: &str,
    assembly_path: &str,
    canonical_name: &str,
    occurrence_index: u32,
) -> Guid {
    let occurrence = occurrence_index.to_string();
    compress(digest_fields(&[
        "part",
        source_hash,
        assembly_path,
        canonical_name,
        &occurrence,
    ]))
}

/// Identity of a non-part object (project, relationships, property sets)
/// from its key fields, e.g. `["pset", owner, name]`
pub fn derive_synthetic_guid(source_hash: &str, key: &[&str]) -> Guid {
    let mut fields = Vec::with_capacity(key.len() + 2);
    fields.push("synthetic");
    fields.push(source_hash);
    fields.extend_from_slice(key);
    compress(digest_fields(&fields))
}

/// Hands out GUIDs for one document and refuses duplicates
#[derive(Debug, Default)]
pub struct GuidAllocator {
    source_hash: String,
    ledger: FxHashMap<Guid, String>,
}

impl GuidAllocator {
    pub fn new(source_hash: impl Into<String>) -> Self {
        Self {
            source_hash: source_hash.into(),
            ledger: FxHashMap::default(),
        }
    }

    pub fn source_hash(&self) -> &str {
        &self.source_hash
    }

    /// GUID of the part at `assembly_path` (its ancestors)
    pub fn allocate(
        &mut self,
        assembly_path: &AssemblyPath,
        canonical_name: &str,
        occurrence_index: u32,
    ) -> Result<Guid, GuidCollisionError> {
        let path_key = assembly_path.key();
        let guid = derive_guid(
            &self.source_hash,
            &path_key,
            canonical_name,
            occurrence_index,
        );
        let owner = assembly_path.child(canonical_name, occurrence_index).key();
        self.claim(guid, owner)
    }

    /// GUID derived from synthetic key fields such as `["project"]` or
    /// `["pset", owner, "Pset_Source"]`
    pub fn allocate_synthetic(&mut self, key: &[&str]) -> Result<Guid, GuidCollisionError> {
        let guid = derive_synthetic_guid(&self.source_hash, key);
        self.claim(guid, format!("synthetic {:?}", key))
    }

    /// Record `guid` for `owner`; every GUID can be claimed once
    pub fn claim(&mut self, guid: Guid, owner: String) -> Result<Guid, GuidCollisionError> {
        match self.ledger.get(&guid) {
            Some(existing) => Err(GuidCollisionError {
                guid: guid.to_string(),
                first: existing.clone(),
                second: owner,
            }),
            None => {
                self.ledger.insert(guid.clone(), owner);
                Ok(guid)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}
