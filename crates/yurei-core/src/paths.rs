// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

/// Reserve the next free rotation sibling of `path`: `<stem>_<k>.<ext>`
/// with the lowest free positive `k`.
///
/// The reservation is atomic: the candidate is created with
/// `create_new` (mode 0600 on unix), so concurrent callers always end up
/// with distinct paths.
pub fn next_available_rotation(path: &Path) -> anyhow::Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("rotation path has no file stem")?;
    let ext = path.extension().and_then(|e| e.to_str());

    for k in 1..=10_000u32 {
        let name = match ext {
            Some(ext) => format!("{stem}_{k}.{ext}"),
            None => format!("{stem}_{k}"),
        };
        let candidate = parent.join(name);
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        match options.open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).context(format!("cannot reserve {}", candidate.display())),
        }
    }
    bail!("no available rotation path for {}", path.display())
}

/// Bucket name for a work directory: the MD5 of its canonical path,
/// prefixed with the host namespace when the directory is not local.
pub fn work_dir_hash(work_dir: &Path, host: Option<&str>) -> String {
    let digest = md5::compute(work_dir.to_string_lossy().as_bytes());
    match host {
        Some(h) => format!("{h}-{digest:x}"),
        None => format!("{digest:x}"),
    }
}

/// A plain `ls`-style listing of a directory, directories marked with a
/// trailing slash.  Used to seed the system prompt.
pub async fn list_directory(dir: &Path) -> String {
    let mut entries = Vec::new();
    let Ok(mut read_dir) = tokio::fs::read_dir(dir).await else {
        return String::new();
    };
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        entries.push(if is_dir { format!("{name}/") } else { name });
    }
    entries.sort();
    entries.join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_takes_lowest_free_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("context.jsonl");
        std::fs::write(&base, "x").unwrap();
        let r1 = next_available_rotation(&base).unwrap();
        assert_eq!(r1.file_name().unwrap(), "context_1.jsonl");
        let r2 = next_available_rotation(&base).unwrap();
        assert_eq!(r2.file_name().unwrap(), "context_2.jsonl");
    }

    #[test]
    fn rotation_skips_existing_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("context.jsonl");
        std::fs::write(dir.path().join("context_1.jsonl"), "taken").unwrap();
        let r = next_available_rotation(&base).unwrap();
        assert_eq!(r.file_name().unwrap(), "context_2.jsonl");
    }

    #[test]
    fn concurrent_rotations_yield_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("context.jsonl");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let base = base.clone();
            handles.push(std::thread::spawn(move || {
                next_available_rotation(&base).unwrap()
            }));
        }
        let mut paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8, "all reserved paths must be distinct");
        for p in &paths {
            let name = p.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with("context_") && name.ends_with(".jsonl"));
        }
    }

    #[test]
    fn work_dir_hash_is_stable_and_host_tagged() {
        let a = work_dir_hash(Path::new("/tmp/project"), None);
        let b = work_dir_hash(Path::new("/tmp/project"), None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        let tagged = work_dir_hash(Path::new("/tmp/project"), Some("devbox"));
        assert!(tagged.starts_with("devbox-"));
    }

    #[tokio::test]
    async fn list_directory_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "").unwrap();
        let listing = list_directory(dir.path()).await;
        assert_eq!(listing, "file.txt\nsub/");
    }
}
