// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::schema::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Default config location: `$YUREI_CONFIG`, else
/// `<config_dir>/yurei/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("YUREI_CONFIG") {
        let expanded = shellexpand::tilde(&p).into_owned();
        return Some(PathBuf::from(expanded));
    }
    dirs::config_dir().map(|d| d.join("yurei").join("config.toml"))
}

/// Load the config file, falling back to defaults when it does not exist.
/// Environment overrides are applied after parsing.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path(),
    };

    let mut config = match path {
        Some(ref p) if p.exists() => {
            debug!(path = %p.display(), "loading config file");
            let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                path: p.clone(),
                source,
            })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: p.clone(),
                source,
            })?
        }
        _ => {
            debug!("no config file found, using defaults");
            Config::default()
        }
    };

    let applied = config.augment_with_env();
    if !applied.is_empty() {
        info!(overrides = ?applied, "applied environment overrides");
    }
    Ok(config)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
