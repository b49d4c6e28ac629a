// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The persisted conversation context.
//!
//! An append-only JSONL file is the single source of truth; the in-memory
//! history is a derived view.  Three record shapes share the file: message
//! records, `{"role":"_usage","token_count":N}` markers and
//! `{"role":"_checkpoint","id":N}` markers.  Revert and clear rotate the
//! file to a numbered sibling so the audit trail survives.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use yurei_model::Message;

use crate::message::system_part;
use crate::paths::next_available_rotation;

const USAGE_ROLE: &str = "_usage";
const CHECKPOINT_ROLE: &str = "_checkpoint";

pub struct Context {
    file_backend: PathBuf,
    history: Vec<Message>,
    token_count: u64,
    next_checkpoint_id: u32,
}

impl Context {
    pub fn new(file_backend: PathBuf) -> Self {
        Self {
            file_backend,
            history: Vec::new(),
            token_count: 0,
            next_checkpoint_id: 0,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    pub fn n_checkpoints(&self) -> u32 {
        self.next_checkpoint_id
    }

    pub fn file_backend(&self) -> &Path {
        &self.file_backend
    }

    /// Rebuild the in-memory view from the file.  Returns `false` when the
    /// file is missing or empty.  Calling restore on a store that already
    /// holds messages is a programming error.
    pub async fn restore(&mut self) -> anyhow::Result<bool> {
        debug!(file = %self.file_backend.display(), "restoring context");
        if !self.history.is_empty() {
            bail!("the context storage is already modified");
        }
        let text = match tokio::fs::read_to_string(&self.file_backend).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e)
                    .context(format!("cannot read {}", self.file_backend.display()))
            }
        };
        if text.trim().is_empty() {
            return Ok(false);
        }
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            self.ingest_line(line)
                .with_context(|| format!("corrupt context record: {line}"))?;
        }
        Ok(true)
    }

    fn ingest_line(&mut self, line: &str) -> anyhow::Result<()> {
        let value: Value = serde_json::from_str(line)?;
        match value["role"].as_str() {
            Some(USAGE_ROLE) => {
                self.token_count = value["token_count"].as_u64().unwrap_or(0);
            }
            Some(CHECKPOINT_ROLE) => {
                let id = value["id"].as_u64().context("checkpoint without id")? as u32;
                self.next_checkpoint_id = id + 1;
            }
            _ => {
                let message: Message = serde_json::from_value(value)?;
                self.history.push(message);
            }
        }
        Ok(())
    }

    async fn append_line(&self, line: &str) -> anyhow::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_backend)
            .await
            .with_context(|| format!("cannot open {}", self.file_backend.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    /// Append messages to disk first, then to memory, so a crash between
    /// the two still restores correctly.
    pub async fn append_message(&mut self, messages: &[Message]) -> anyhow::Result<()> {
        for message in messages {
            let line = serde_json::to_string(message)?;
            self.append_line(&line).await?;
        }
        self.history.extend_from_slice(messages);
        Ok(())
    }

    pub async fn update_token_count(&mut self, token_count: u64) -> anyhow::Result<()> {
        debug!(token_count, "updating context token count");
        self.token_count = token_count;
        self.append_line(
            &serde_json::json!({ "role": USAGE_ROLE, "token_count": token_count }).to_string(),
        )
        .await
    }

    /// Allocate the next checkpoint id and write its marker; optionally
    /// append a tagged user message naming the checkpoint (used when a
    /// d-mail re-seeds the conversation).
    pub async fn checkpoint(&mut self, add_user_message: bool) -> anyhow::Result<u32> {
        let checkpoint_id = self.next_checkpoint_id;
        self.next_checkpoint_id += 1;
        debug!(checkpoint_id, "checkpointing context");
        self.append_line(
            &serde_json::json!({ "role": CHECKPOINT_ROLE, "id": checkpoint_id }).to_string(),
        )
        .await?;
        if add_user_message {
            let message = Message::new(
                yurei_model::Role::User,
                vec![system_part(&format!("CHECKPOINT {checkpoint_id}"))],
            );
            self.append_message(&[message]).await?;
        }
        Ok(checkpoint_id)
    }

    /// Revert to the state just before `checkpoint_id` was written.  The
    /// current file is rotated away and replayed into a fresh file up to
    /// (excluding) the checkpoint record.
    pub async fn revert_to(&mut self, checkpoint_id: u32) -> anyhow::Result<()> {
        debug!(checkpoint_id, "reverting context");
        if checkpoint_id >= self.next_checkpoint_id {
            bail!("checkpoint {checkpoint_id} does not exist");
        }
        let rotated = next_available_rotation(&self.file_backend)?;
        tokio::fs::rename(&self.file_backend, &rotated)
            .await
            .with_context(|| format!("cannot rotate to {}", rotated.display()))?;
        debug!(rotated = %rotated.display(), "rotated context file");

        self.history.clear();
        self.token_count = 0;
        self.next_checkpoint_id = 0;

        let text = tokio::fs::read_to_string(&rotated).await?;
        let mut kept = String::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)?;
            if value["role"].as_str() == Some(CHECKPOINT_ROLE)
                && value["id"].as_u64() == Some(checkpoint_id as u64)
            {
                break;
            }
            kept.push_str(line);
            kept.push('\n');
            self.ingest_line(line)?;
        }
        tokio::fs::write(&self.file_backend, kept).await?;
        Ok(())
    }

    /// Drop everything, rotating the file away.  Unlike `revert_to(0)`,
    /// this does not require checkpoint zero to exist.
    pub async fn clear(&mut self) -> anyhow::Result<()> {
        debug!("clearing context");
        if self.file_backend.exists() {
            let rotated = next_available_rotation(&self.file_backend)?;
            tokio::fs::rename(&self.file_backend, &rotated)
                .await
                .with_context(|| format!("cannot rotate to {}", rotated.display()))?;
            debug!(rotated = %rotated.display(), "rotated context file");
        }
        self.history.clear();
        self.token_count = 0;
        self.next_checkpoint_id = 0;
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use yurei_model::{ContentPart, Role};

    fn context_in(dir: &tempfile::TempDir) -> Context {
        Context::new(dir.path().join("context.jsonl"))
    }

    #[tokio::test]
    async fn append_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(&dir);
        ctx.append_message(&[Message::user("hello"), Message::assistant("hi")])
            .await
            .unwrap();
        ctx.update_token_count(42).await.unwrap();
        ctx.checkpoint(false).await.unwrap();

        let mut restored = context_in(&dir);
        assert!(restored.restore().await.unwrap());
        assert_eq!(restored.history(), ctx.history());
        assert_eq!(restored.token_count(), 42);
        assert_eq!(restored.n_checkpoints(), 1);
    }

    #[tokio::test]
    async fn restore_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(&dir);
        assert!(!ctx.restore().await.unwrap());
        assert!(ctx.history().is_empty());
    }

    #[tokio::test]
    async fn restore_on_modified_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(&dir);
        ctx.append_message(&[Message::user("x")]).await.unwrap();
        assert!(ctx.restore().await.is_err());
    }

    #[tokio::test]
    async fn checkpoint_ids_are_monotonic_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(&dir);
        assert_eq!(ctx.checkpoint(false).await.unwrap(), 0);
        assert_eq!(ctx.checkpoint(false).await.unwrap(), 1);
        assert_eq!(ctx.n_checkpoints(), 2);
    }

    #[tokio::test]
    async fn checkpoint_with_user_message_tags_the_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(&dir);
        ctx.checkpoint(true).await.unwrap();
        let last = ctx.history().last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(
            last.content[0],
            ContentPart::text("<system>CHECKPOINT 0</system>")
        );
    }

    #[tokio::test]
    async fn revert_drops_messages_after_the_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(&dir);
        ctx.append_message(&[Message::user("one")]).await.unwrap();
        ctx.checkpoint(false).await.unwrap(); // checkpoint 0
        ctx.append_message(&[Message::assistant("two")]).await.unwrap();
        ctx.checkpoint(false).await.unwrap(); // checkpoint 1
        ctx.append_message(&[Message::assistant("three")]).await.unwrap();

        ctx.revert_to(1).await.unwrap();
        assert_eq!(ctx.history().len(), 2);
        assert_eq!(ctx.history()[1].extract_text(""), "two");
        // checkpoint 1 and everything after it are gone
        assert_eq!(ctx.n_checkpoints(), 1);

        // the rotated file still holds the full trail
        assert!(dir.path().join("context_1.jsonl").exists());

        // a fresh restore agrees with the in-memory state
        let mut restored = context_in(&dir);
        restored.restore().await.unwrap();
        assert_eq!(restored.history(), ctx.history());
        assert_eq!(restored.n_checkpoints(), 1);
    }

    #[tokio::test]
    async fn revert_to_unknown_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(&dir);
        ctx.checkpoint(false).await.unwrap();
        assert!(ctx.revert_to(5).await.is_err());
    }

    #[tokio::test]
    async fn clear_rotates_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(&dir);
        ctx.append_message(&[Message::user("x")]).await.unwrap();
        ctx.clear().await.unwrap();
        assert!(ctx.history().is_empty());
        assert_eq!(ctx.n_checkpoints(), 0);
        assert!(dir.path().join("context_1.jsonl").exists());
        // the live file is gone until the next append
        assert!(!dir.path().join("context.jsonl").exists());
    }

    #[tokio::test]
    async fn usage_marker_format_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(&dir);
        ctx.update_token_count(7).await.unwrap();
        let text = std::fs::read_to_string(dir.path().join("context.jsonl")).unwrap();
        assert_eq!(text.trim(), "{\"role\":\"_usage\",\"token_count\":7}");
    }
}
