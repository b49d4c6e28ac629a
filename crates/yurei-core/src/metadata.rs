// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The share directory and its single metadata document.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::paths::work_dir_hash;

pub const METADATA_FILE: &str = "yurei.json";

/// Root of all persisted state: `$YUREI_SHARE_DIR`, else `~/.yurei`.
pub fn share_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("YUREI_SHARE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".yurei")
}

pub fn metadata_path() -> PathBuf {
    share_dir().join(METADATA_FILE)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkDirMeta {
    pub path: PathBuf,
    /// Host namespace tag; `None` for the local filesystem.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session_id: Option<String>,
}

impl WorkDirMeta {
    /// Where this work directory's sessions live.
    pub fn sessions_dir(&self) -> PathBuf {
        share_dir()
            .join("sessions")
            .join(work_dir_hash(&self.path, self.host.as_deref()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub work_dirs: Vec<WorkDirMeta>,
    #[serde(default)]
    pub thinking: bool,
}

impl Metadata {
    pub fn get_work_dir_meta(&self, work_dir: &Path) -> Option<&WorkDirMeta> {
        self.work_dirs.iter().find(|m| m.path == work_dir)
    }

    pub fn get_work_dir_meta_mut(&mut self, work_dir: &Path) -> Option<&mut WorkDirMeta> {
        self.work_dirs.iter_mut().find(|m| m.path == work_dir)
    }

    /// Register a new work directory and return its metadata.
    pub fn new_work_dir_meta(&mut self, work_dir: &Path) -> &mut WorkDirMeta {
        self.work_dirs.push(WorkDirMeta {
            path: work_dir.to_path_buf(),
            host: None,
            last_session_id: None,
        });
        self.work_dirs.last_mut().expect("just pushed")
    }
}

/// Load the metadata document; missing or unreadable files yield the
/// default document.
pub fn load_metadata() -> Metadata {
    let path = metadata_path();
    match std::fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            debug!(path = %path.display(), error = %e, "corrupt metadata, starting fresh");
            Metadata::default()
        }),
        Err(_) => Metadata::default(),
    }
}

pub fn save_metadata(metadata: &Metadata) -> anyhow::Result<()> {
    let path = metadata_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(metadata)?;
    std::fs::write(&path, text).with_context(|| format!("cannot write {}", path.display()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trips() {
        let mut m = Metadata::default();
        m.thinking = true;
        let w = m.new_work_dir_meta(Path::new("/tmp/p"));
        w.last_session_id = Some("abc".into());
        let text = serde_json::to_string(&m).unwrap();
        let back: Metadata = serde_json::from_str(&text).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn sessions_dir_uses_the_path_hash() {
        let meta = WorkDirMeta {
            path: PathBuf::from("/tmp/project"),
            host: None,
            last_session_id: None,
        };
        let dir = meta.sessions_dir();
        let bucket = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(bucket.len(), 32, "md5 hex digest expected, got {bucket}");
        assert!(dir.parent().unwrap().ends_with("sessions"));
    }
}
