//! Runtime configuration, bridging CLI flags, `ORCH_*` environment
//! variables and an on-disk TOML file — the same three-layer bridge the
//! teacher binary's `Config`/`ForgeConfig` pair implements, collapsed into
//! one struct since this system has a single configuration surface rather
//! than the teacher's CLI-args-plus-unified-config split.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The project marker directory (spec §6: "per project root, under
/// `.<project_marker>/`").
pub const PROJECT_MARKER: &str = ".synforge";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_steps: u32,
    pub max_remediation_attempts: u32,
    pub max_context_size: usize,
    pub history_summary_threshold: usize,
    pub max_backups: usize,
    pub max_history_messages: usize,
    pub rollback_limit: u32,
    pub patch_escalation_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_steps: 15,
            max_remediation_attempts: 3,
            max_context_size: 25_000,
            history_summary_threshold: 5,
            max_backups: 5,
            max_history_messages: 50,
            rollback_limit: 3,
            patch_escalation_threshold: 3,
        }
    }
}

impl Config {
    /// Load the effective configuration: defaults, then a user-level
    /// `$XDG_CONFIG_HOME/synforge/config.toml` if present, then
    /// `<project_dir>/.synforge/config.toml` if present (each file found
    /// replaces the running config wholesale, the project file taking
    /// precedence over the user one since it's checked last), then
    /// `ORCH_*` environment variables on top of whichever file won.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config) = dirs::config_dir().map(|d| d.join("synforge").join("config.toml")) {
            config.load_from_file(&user_config)?;
        }
        config.load_from_file(&project_dir.join(PROJECT_MARKER).join("config.toml"))?;

        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        match toml::from_str(&content) {
            Ok(parsed) => {
                *self = parsed;
                tracing::info!("loaded config from {}", path.display());
            }
            Err(e) => {
                tracing::warn!("failed to parse {}: {e}", path.display());
                return Err(e).with_context(|| format!("failed to parse {}", path.display()));
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        apply_env_u32(&mut self.max_steps, "ORCH_MAX_STEPS");
        apply_env_u32(&mut self.max_remediation_attempts, "ORCH_MAX_REMEDIATION_ATTEMPTS");
        apply_env_usize(&mut self.max_context_size, "ORCH_MAX_CONTEXT_SIZE");
        apply_env_usize(
            &mut self.history_summary_threshold,
            "ORCH_HISTORY_SUMMARY_THRESHOLD",
        );
        apply_env_usize(&mut self.max_backups, "ORCH_MAX_BACKUPS");
        apply_env_usize(&mut self.max_history_messages, "ORCH_MAX_HISTORY_MESSAGES");
        apply_env_u32(&mut self.rollback_limit, "ORCH_ROLLBACK_LIMIT");
        apply_env_u32(
            &mut self.patch_escalation_threshold,
            "ORCH_PATCH_ESCALATION_THRESHOLD",
        );
    }
}

fn apply_env_u32(slot: &mut u32, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        if let Ok(parsed) = raw.parse() {
            *slot = parsed;
        }
    }
}

fn apply_env_usize(slot: &mut usize, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        if let Ok(parsed) = raw.parse() {
            *slot = parsed;
        }
    }
}

/// Project-layout paths derived from `project_dir` (spec §6 "Persisted
/// state layout").
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub marker_dir: PathBuf,
    pub state_file: PathBuf,
    pub history_file: PathBuf,
    pub workflow_context_file: PathBuf,
    pub trash_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let marker_dir = root.join(PROJECT_MARKER);
        Self {
            state_file: marker_dir.join("project_state.json"),
            history_file: marker_dir.join("conversation_history.jsonl"),
            workflow_context_file: marker_dir.join("workflow_context.json"),
            trash_dir: marker_dir.join("trash"),
            marker_dir,
            root,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.marker_dir)
            .context("failed to create project marker directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::default();
        assert_eq!(config.max_steps, 15);
        assert_eq!(config.max_remediation_attempts, 3);
        assert_eq!(config.max_context_size, 25_000);
        assert_eq!(config.history_summary_threshold, 5);
        assert_eq!(config.max_backups, 5);
        assert_eq!(config.max_history_messages, 50);
        assert_eq!(config.rollback_limit, 3);
        assert_eq!(config.patch_escalation_threshold, 3);
    }

    #[test]
    fn loads_overrides_from_toml_file() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join(PROJECT_MARKER);
        std::fs::create_dir_all(&marker).unwrap();
        std::fs::write(marker.join("config.toml"), "max_steps = 30\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.max_steps, 30);
        assert_eq!(config.max_remediation_attempts, 3);
    }

    #[test]
    fn env_override_wins_over_file_and_default() {
        let dir = tempdir().unwrap();
        std::env::set_var("ORCH_MAX_STEPS", "7");
        let config = Config::load(dir.path()).unwrap();
        std::env::remove_var("ORCH_MAX_STEPS");
        assert_eq!(config.max_steps, 7);
    }

    #[test]
    fn project_paths_live_under_marker_dir() {
        let paths = ProjectPaths::new("/srv/project");
        assert_eq!(
            paths.state_file,
            PathBuf::from("/srv/project/.synforge/project_state.json")
        );
        assert_eq!(
            paths.history_file,
            PathBuf::from("/srv/project/.synforge/conversation_history.jsonl")
        );
    }
}
