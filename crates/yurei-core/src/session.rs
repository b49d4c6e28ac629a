// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sessions: one conversation per UUID, bucketed per work directory.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metadata::{load_metadata, save_metadata};

/// A session of a work directory.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Canonical absolute path of the work directory.
    pub work_dir: PathBuf,
    /// The file storing the message history.
    pub context_file: PathBuf,
    pub title: String,
    /// Seconds since the epoch of the last context update.
    pub updated_at: f64,
}

impl Session {
    /// Create a new session for `work_dir`, registering the directory in
    /// the share metadata and recording it as the last session.
    pub async fn create(work_dir: &Path) -> anyhow::Result<Session> {
        let work_dir = canonical(work_dir)?;
        debug!(work_dir = %work_dir.display(), "creating session");

        let mut metadata = load_metadata();
        if metadata.get_work_dir_meta(&work_dir).is_none() {
            metadata.new_work_dir_meta(&work_dir);
        }
        let meta = metadata
            .get_work_dir_meta(&work_dir)
            .expect("just registered")
            .clone();

        let session_id = Uuid::new_v4().to_string();
        let session_dir = meta.sessions_dir().join(&session_id);
        tokio::fs::create_dir_all(&session_dir)
            .await
            .with_context(|| format!("cannot create {}", session_dir.display()))?;

        let context_file = session_dir.join("context.jsonl");
        if context_file.exists() {
            warn!(path = %context_file.display(), "context file already exists, truncating");
            tokio::fs::remove_file(&context_file).await?;
        }
        tokio::fs::write(&context_file, b"").await?;

        if let Some(m) = metadata.get_work_dir_meta_mut(&work_dir) {
            m.last_session_id = Some(session_id.clone());
        }
        save_metadata(&metadata)?;

        Ok(Session {
            id: session_id.clone(),
            work_dir,
            context_file,
            title: session_id,
            updated_at: now(),
        })
    }

    /// Find an existing session by id.
    pub async fn find(work_dir: &Path, session_id: &str) -> anyhow::Result<Option<Session>> {
        let work_dir = canonical(work_dir)?;
        let metadata = load_metadata();
        let Some(meta) = metadata.get_work_dir_meta(&work_dir) else {
            debug!("work directory never used");
            return Ok(None);
        };
        let context_file = meta.sessions_dir().join(session_id).join("context.jsonl");
        if !context_file.exists() {
            debug!(path = %context_file.display(), "session context file not found");
            return Ok(None);
        }
        Ok(Some(Session {
            id: session_id.to_string(),
            work_dir,
            updated_at: mtime(&context_file),
            title: session_id.to_string(),
            context_file,
        }))
    }

    /// All sessions of `work_dir`, sorted by id.
    pub async fn list(work_dir: &Path) -> anyhow::Result<Vec<Session>> {
        let work_dir = canonical(work_dir)?;
        let metadata = load_metadata();
        let Some(meta) = metadata.get_work_dir_meta(&work_dir) else {
            return Ok(Vec::new());
        };
        let sessions_dir = meta.sessions_dir();
        let mut out = Vec::new();
        let Ok(mut read_dir) = tokio::fs::read_dir(&sessions_dir).await else {
            return Ok(out);
        };
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let session_id = entry.file_name().to_string_lossy().into_owned();
            let context_file = entry.path().join("context.jsonl");
            if !context_file.exists() {
                continue;
            }
            out.push(Session {
                id: session_id.clone(),
                work_dir: work_dir.clone(),
                updated_at: mtime(&context_file),
                title: session_id,
                context_file,
            });
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// The most recently created session for `work_dir`, if any.
    pub async fn continue_last(work_dir: &Path) -> anyhow::Result<Option<Session>> {
        let work_dir = canonical(work_dir)?;
        let metadata = load_metadata();
        let Some(last_id) = metadata
            .get_work_dir_meta(&work_dir)
            .and_then(|m| m.last_session_id.clone())
        else {
            debug!("work directory has no previous session");
            return Ok(None);
        };
        Session::find(&work_dir, &last_id).await
    }
}

fn canonical(path: &Path) -> anyhow::Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("cannot canonicalize {}", path.display()))
}

fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn mtime(path: &Path) -> f64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
