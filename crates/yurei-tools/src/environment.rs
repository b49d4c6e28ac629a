// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use tracing::debug;

/// Host facts detected once at runtime creation and shared read-only.
#[derive(Debug, Clone)]
pub struct Environment {
    pub os_kind: String,
    pub os_arch: String,
    pub os_version: String,
    /// One of `bash`, `sh`, `Windows PowerShell`.
    pub shell_name: String,
    pub shell_path: PathBuf,
}

impl Environment {
    pub async fn detect() -> Environment {
        let (shell_name, shell_path) = detect_shell();
        let os_version = detect_os_version().await;
        let env = Environment {
            os_kind: std::env::consts::OS.to_string(),
            os_arch: std::env::consts::ARCH.to_string(),
            os_version,
            shell_name,
            shell_path,
        };
        debug!(?env, "detected environment");
        env
    }
}

fn detect_shell() -> (String, PathBuf) {
    if cfg!(windows) {
        return (
            "Windows PowerShell".to_string(),
            PathBuf::from("powershell.exe"),
        );
    }
    if let Ok(shell) = std::env::var("SHELL") {
        let path = PathBuf::from(&shell);
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == "bash")
        {
            return ("bash".to_string(), path);
        }
    }
    ("sh".to_string(), PathBuf::from("/bin/sh"))
}

async fn detect_os_version() -> String {
    if cfg!(windows) {
        return String::new();
    }
    match tokio::process::Command::new("uname").arg("-r").output().await {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => String::new(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
