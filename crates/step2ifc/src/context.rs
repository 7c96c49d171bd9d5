// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-run state: identity, source hash, GUID ledger and cancellation

use crate::guid::GuidAllocator;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Cooperative cancellation flag shared with the caller
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lowercase hex SHA-256 of a file, read in 1 MiB chunks
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// State threaded through one conversion
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub source_path: PathBuf,
    pub source_hash: String,
    pub guids: GuidAllocator,
    pub cancel: CancelToken,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(run_id: Uuid, source_path: &Path, source_hash: String, cancel: CancelToken) -> Self {
        Self {
            run_id,
            source_path: source_path.to_path_buf(),
            guids: GuidAllocator::new(source_hash.clone()),
            source_hash,
            cancel,
            started_at: Utc::now(),
        }
    }

    /// File name of the source, used in reports and property sets
    pub fn source_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Source file stem, the `ProjectKey` token
    pub fn project_key(&self) -> String {
        self.source_path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
