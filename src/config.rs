//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest context length accepted by the load nodes
pub const MIN_CONTEXT_LENGTH: u32 = 512;
/// Largest context length accepted by the load nodes
pub const MAX_CONTEXT_LENGTH: u32 = 131_072;
/// Context lengths must be a multiple of this
pub const CONTEXT_LENGTH_STEP: u32 = 512;

/// Node pack configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NodesConfig {
    /// `lms` executable name or path
    pub lms_binary: String,
    pub context_length: u32,
    /// Value passed to `lms load --gpu=`
    pub gpu: String,

    pub list_timeout_secs: u64,
    pub status_timeout_secs: u64,
    pub unload_timeout_secs: u64,
    pub load_timeout_secs: u64,

    /// Pause after `lms unload` before loading the next model
    pub unload_settle_secs: u64,
    /// Pause after a successful `lms load` before verifying
    pub post_load_wait_secs: u64,
    /// Waits shorter than this trigger a warning
    pub min_post_load_wait_secs: u64,

    pub verify_attempts: u32,
    pub verify_interval_secs: u64,
    /// Overall cap on verification polling
    pub verify_timeout_secs: u64,

    /// Root directory holding one sub-directory per model folder kind
    pub models_root: PathBuf,
    /// Per-kind directory overrides, e.g. `unet_gguf = ["/mnt/gguf"]`
    pub model_folders: BTreeMap<String, Vec<PathBuf>>,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            lms_binary: default_lms_binary(),
            context_length: 8192,
            gpu: "1".to_string(),
            list_timeout_secs: 10,
            status_timeout_secs: 5,
            unload_timeout_secs: 10,
            load_timeout_secs: 120,
            unload_settle_secs: 2,
            post_load_wait_secs: 8,
            min_post_load_wait_secs: 5,
            verify_attempts: 15,
            verify_interval_secs: 1,
            verify_timeout_secs: 20,
            models_root: PathBuf::from("models"),
            model_folders: BTreeMap::new(),
        }
    }
}

impl NodesConfig {
    /// Load configuration from file with environment variable overrides
    ///
    /// Without an explicit path the user config file
    /// (`<config dir>/lms-nodes/config.toml`) is used when it exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| default_config_path().filter(|p| p.exists()));

        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        if let Ok(binary) = std::env::var("LMS_NODES_BINARY") {
            config.lms_binary = binary;
        }
        if let Ok(ctx) = std::env::var("LMS_NODES_CONTEXT_LENGTH") {
            config.context_length = ctx
                .parse()
                .context("Invalid LMS_NODES_CONTEXT_LENGTH value")?;
        }
        if let Ok(gpu) = std::env::var("LMS_NODES_GPU") {
            config.gpu = gpu;
        }
        if let Ok(wait) = std::env::var("LMS_NODES_POST_LOAD_WAIT") {
            config.post_load_wait_secs = wait
                .parse()
                .context("Invalid LMS_NODES_POST_LOAD_WAIT value")?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_context_length(self.context_length)?;

        if self.lms_binary.trim().is_empty() {
            anyhow::bail!("lms_binary cannot be empty");
        }
        if self.gpu.trim().is_empty() {
            anyhow::bail!("gpu cannot be empty");
        }

        for (name, secs) in [
            ("list_timeout_secs", self.list_timeout_secs),
            ("status_timeout_secs", self.status_timeout_secs),
            ("unload_timeout_secs", self.unload_timeout_secs),
            ("load_timeout_secs", self.load_timeout_secs),
            ("verify_timeout_secs", self.verify_timeout_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if self.verify_attempts == 0 {
            anyhow::bail!("verify_attempts must be at least 1");
        }

        Ok(())
    }

    /// Resolve the `lms` executable to invoke
    ///
    /// A bare `lms` that is not on `PATH` falls back to the per-user
    /// install location `~/.lmstudio/bin/lms`.
    pub fn resolved_lms_binary(&self) -> String {
        if self.lms_binary != default_lms_binary() || find_on_path(&self.lms_binary).is_some() {
            return self.lms_binary.clone();
        }

        let exe = if cfg!(windows) { "lms.exe" } else { "lms" };
        match dirs::home_dir().map(|h| h.join(".lmstudio").join("bin").join(exe)) {
            Some(candidate) if candidate.is_file() => {
                tracing::debug!(path = ?candidate, "Using per-user lms install");
                candidate.to_string_lossy().into_owned()
            }
            _ => self.lms_binary.clone(),
        }
    }

    /// Directories searched for a model folder kind
    pub fn folder_paths(&self, kind: &str) -> Vec<PathBuf> {
        self.model_folders
            .get(kind)
            .cloned()
            .unwrap_or_else(|| vec![self.models_root.join(kind)])
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn unload_timeout(&self) -> Duration {
        Duration::from_secs(self.unload_timeout_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

/// Check a context length against the node's input bounds
pub fn validate_context_length(context_length: u32) -> Result<()> {
    if !(MIN_CONTEXT_LENGTH..=MAX_CONTEXT_LENGTH).contains(&context_length) {
        anyhow::bail!(
            "context_length must be between {} and {} (got {})",
            MIN_CONTEXT_LENGTH,
            MAX_CONTEXT_LENGTH,
            context_length
        );
    }
    if context_length % CONTEXT_LENGTH_STEP != 0 {
        anyhow::bail!(
            "context_length must be a multiple of {} (got {})",
            CONTEXT_LENGTH_STEP,
            context_length
        );
    }
    Ok(())
}

/// `<config dir>/lms-nodes/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lms-nodes").join("config.toml"))
}

fn find_on_path(binary: &str) -> Option<PathBuf> {
    if Path::new(binary).components().count() > 1 {
        return Path::new(binary).is_file().then(|| PathBuf::from(binary));
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| {
            let plain = dir.join(binary);
            let exe = dir.join(format!("{}.exe", binary));
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

fn default_lms_binary() -> String {
    "lms".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodesConfig::default();
        assert_eq!(config.lms_binary, "lms");
        assert_eq!(config.context_length, 8192);
        assert_eq!(config.gpu, "1");
        assert_eq!(config.load_timeout_secs, 120);
        assert_eq!(config.post_load_wait_secs, 8);
        assert_eq!(config.verify_attempts, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_context_length_bounds() {
        assert!(validate_context_length(512).is_ok());
        assert!(validate_context_length(131_072).is_ok());
        assert!(validate_context_length(256).is_err());
        assert!(validate_context_length(131_584).is_err());
        assert!(validate_context_length(8000).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = NodesConfig {
            load_timeout_secs: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("load_timeout_secs"));
    }

    #[test]
    fn test_zero_verify_attempts_rejected() {
        let config = NodesConfig {
            verify_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_folder_paths_default_and_override() {
        let mut config = NodesConfig {
            models_root: PathBuf::from("/srv/models"),
            ..Default::default()
        };
        assert_eq!(
            config.folder_paths("checkpoints"),
            vec![PathBuf::from("/srv/models/checkpoints")]
        );

        config.model_folders.insert(
            "unet_gguf".to_string(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")],
        );
        assert_eq!(config.folder_paths("unet_gguf").len(), 2);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: NodesConfig = toml::from_str(
            r#"
            context_length = 4096
            [model_folders]
            checkpoints = ["/data/ckpt"]
            "#,
        )
        .unwrap();
        assert_eq!(config.context_length, 4096);
        assert_eq!(config.load_timeout_secs, 120);
        assert_eq!(
            config.folder_paths("checkpoints"),
            vec![PathBuf::from("/data/ckpt")]
        );
    }

    #[test]
    fn test_explicit_binary_path_is_kept() {
        let config = NodesConfig {
            lms_binary: "/opt/lmstudio/lms".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolved_lms_binary(), "/opt/lmstudio/lms");
    }
}
