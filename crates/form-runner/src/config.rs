use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::Deserialize;

use form_spec::AutoSource;

pub const LOCAL_CONFIG: &str = "form-runner.toml";

/// Settings read from `form-runner.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Template root, laid out as `<dir>/<form_class>/<form_id>.json`.
    pub templates_dir: PathBuf,
    pub drafts_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub log_filter: Option<String>,
    /// Values for system-computed fields, keyed by source.
    pub auto: BTreeMap<AutoSource, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            drafts_dir: PathBuf::from("drafts"),
            outbox_dir: PathBuf::from("outbox"),
            log_filter: None,
            auto: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    /// Loads the first config found: the explicit path, then
    /// `form-runner.toml` in the working directory, then the user config
    /// directory. Falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !path.is_file() {
                bail!("config file {} does not exist", path.display());
            }
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }
        for candidate in candidates() {
            if candidate.is_file() {
                return Ok((Self::from_file(&candidate)?, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Parses a config file; relative directories resolve against the
    /// file's own directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: RunnerConfig = toml::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        for dir in [
            &mut self.templates_dir,
            &mut self.drafts_dir,
            &mut self.outbox_dir,
        ] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

fn candidates() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(dirs) = ProjectDirs::from("dev", "dispatch-forms", "form-runner") {
        paths.push(dirs.config_dir().join("config.toml"));
    }
    paths
}
