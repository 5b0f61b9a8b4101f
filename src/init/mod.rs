//! Project directory bootstrap for `draftsync init`.
//!
//! ```text
//! .draftsync/
//! ├── draftsync.toml   # Configuration (never overwritten)
//! ├── cache/           # One recovery record per editing session
//! └── logs/            # draftsync.log
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{CONFIG_DIR, CONFIG_FILE, DraftsyncToml};

/// Result of initializing a project directory.
#[derive(Debug)]
pub struct InitResult {
    pub config_dir: PathBuf,
    /// False when `.draftsync/` already existed.
    pub created: bool,
    /// Whether a default `draftsync.toml` was written.
    pub wrote_config: bool,
}

/// Create `.draftsync/` in `project_dir`, completing a partial layout.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let config_dir = get_config_dir(project_dir);
    let created = !config_dir.exists();

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create directory: {}", config_dir.display()))?;

    for sub in ["cache", "logs"] {
        let dir = config_dir.join(sub);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {} directory: {}", sub, dir.display()))?;
    }

    let config_file = config_dir.join(CONFIG_FILE);
    let wrote_config = !config_file.exists();
    if wrote_config {
        DraftsyncToml::default().save(&config_file)?;
    }

    Ok(InitResult {
        config_dir,
        created,
        wrote_config,
    })
}

pub fn is_initialized(project_dir: &Path) -> bool {
    get_config_dir(project_dir).is_dir()
}

pub fn get_config_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_DIR)
}
