//! Layered configuration for draftsync.
//!
//! Settings are read from `.draftsync/draftsync.toml`, then overridden by
//! environment variables, then by CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [remote]
//! base_url = "https://api.example.edu/v1"
//! token_env = "DRAFTSYNC_TOKEN"
//! timeout_secs = 30
//!
//! [autosave]
//! enabled = true
//! debounce_secs = 5
//! ceiling_secs = 60
//!
//! [validation]
//! min_title_len = 10
//! min_description_len = 50
//!
//! [session]
//! user_email = "me@example.edu"
//! ```
//!
//! # Environment
//!
//! | Variable                  | Overrides                 |
//! |---------------------------|---------------------------|
//! | `DRAFTSYNC_BASE_URL`      | `remote.base_url`         |
//! | `DRAFTSYNC_DEBOUNCE_SECS` | `autosave.debounce_secs`  |
//! | `DRAFTSYNC_CEILING_SECS`  | `autosave.ceiling_secs`   |
//! | `DRAFTSYNC_USER_EMAIL`    | `session.user_email`      |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::draft::ValidationRules;

pub const CONFIG_DIR: &str = ".draftsync";
pub const CONFIG_FILE: &str = "draftsync.toml";

/// Where the remote draft resource lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSection {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "DRAFTSYNC_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: None,
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Auto-save timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveSection {
    #[serde(default = "default_autosave_enabled")]
    pub enabled: bool,
    /// Quiet period after the last edit before a sync fires.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    /// Longest time unsaved changes may wait, even while typing continues.
    #[serde(default = "default_ceiling_secs")]
    pub ceiling_secs: u64,
}

fn default_autosave_enabled() -> bool {
    true
}

fn default_debounce_secs() -> u64 {
    5
}

fn default_ceiling_secs() -> u64 {
    60
}

impl Default for AutosaveSection {
    fn default() -> Self {
        Self {
            enabled: default_autosave_enabled(),
            debounce_secs: default_debounce_secs(),
            ceiling_secs: default_ceiling_secs(),
        }
    }
}

impl AutosaveSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_secs(self.ceiling_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSection {
    #[serde(default = "default_min_title_len")]
    pub min_title_len: usize,
    #[serde(default = "default_min_description_len")]
    pub min_description_len: usize,
}

fn default_min_title_len() -> usize {
    ValidationRules::default().min_title_len
}

fn default_min_description_len() -> usize {
    ValidationRules::default().min_description_len
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            min_title_len: default_min_title_len(),
            min_description_len: default_min_description_len(),
        }
    }
}

impl ValidationSection {
    pub fn rules(&self) -> ValidationRules {
        ValidationRules {
            min_title_len: self.min_title_len,
            min_description_len: self.min_description_len,
        }
    }
}

/// The signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub user_email: Option<String>,
}

/// Contents of `draftsync.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftsyncToml {
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub autosave: AutosaveSection,
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub session: SessionSection,
}

impl DraftsyncToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse draftsync.toml")
    }

    /// Load `draftsync.toml` from `config_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize draftsync.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Unparseable numeric values are ignored with a warning so a typo in the
    /// environment never hides the file setting.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DRAFTSYNC_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.remote.base_url = Some(url.trim().to_string());
        }
        if let Some(secs) = parse_secs(&lookup, "DRAFTSYNC_DEBOUNCE_SECS") {
            self.autosave.debounce_secs = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "DRAFTSYNC_CEILING_SECS") {
            self.autosave.ceiling_secs = secs;
        }
        if let Some(email) = lookup("DRAFTSYNC_USER_EMAIL").filter(|v| !v.trim().is_empty()) {
            self.session.user_email = Some(email.trim().to_string());
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match &self.remote.base_url {
            None => warnings.push(
                "No remote base_url configured; only dry-run commands will work".to_string(),
            ),
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                warnings.push(format!(
                    "remote.base_url '{}' should start with http:// or https://",
                    url
                ));
            }
            Some(_) => {}
        }

        if self.remote.timeout_secs == 0 {
            warnings.push("remote.timeout_secs is 0; requests will fail immediately".to_string());
        }
        if self.autosave.debounce_secs == 0 {
            warnings.push("autosave.debounce_secs is 0; every edit triggers a sync".to_string());
        }
        if self.autosave.ceiling_secs == 0 {
            warnings.push("autosave.ceiling_secs is 0; the ceiling timer is disabled".to_string());
        } else if self.autosave.ceiling_secs < self.autosave.debounce_secs {
            warnings.push(format!(
                "autosave.ceiling_secs ({}) is shorter than debounce_secs ({})",
                self.autosave.ceiling_secs, self.autosave.debounce_secs
            ));
        }

        warnings
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            warn!(key, value = %raw, "ignoring non-numeric environment override");
            None
        }
    }
}

/// CLI flags that override file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub user_email: Option<String>,
    pub debounce_secs: Option<u64>,
    pub ceiling_secs: Option<u64>,
}

/// Effective configuration for one invocation.
#[derive(Debug, Clone)]
pub struct DraftsyncConfig {
    pub project_dir: PathBuf,
    pub config_dir: PathBuf,
    pub toml: DraftsyncToml,
    pub verbose: bool,
}

impl DraftsyncConfig {
    /// Load file and process environment for `project_dir`.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        Self::with_env(project_dir, |key| std::env::var(key).ok())
    }

    /// Load file and environment, reading variables through `lookup`.
    pub fn with_env<F>(project_dir: PathBuf, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_dir = project_dir.join(CONFIG_DIR);
        let mut toml = DraftsyncToml::load_or_default(&config_dir)?;
        toml.apply_env(lookup);
        Ok(Self {
            project_dir,
            config_dir,
            toml,
            verbose: false,
        })
    }

    pub fn with_cli_overrides(mut self, overrides: CliOverrides) -> Self {
        if let Some(url) = overrides.base_url {
            self.toml.remote.base_url = Some(url);
        }
        if let Some(email) = overrides.user_email {
            self.toml.session.user_email = Some(email);
        }
        if let Some(secs) = overrides.debounce_secs {
            self.toml.autosave.debounce_secs = secs;
        }
        if let Some(secs) = overrides.ceiling_secs {
            self.toml.autosave.ceiling_secs = secs;
        }
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.config_dir.join("cache")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config_dir.join("logs")
    }

    pub fn is_initialized(&self) -> bool {
        self.config_dir.is_dir()
    }

    pub fn validation_rules(&self) -> ValidationRules {
        self.toml.validation.rules()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.toml.session.user_email.as_deref()
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
