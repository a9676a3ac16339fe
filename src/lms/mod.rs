//! LM Studio `lms` command-line integration
//!
//! All interaction with LM Studio goes through the [`LmsCli`] trait. The
//! production implementation shells out with a timeout per call; tests use
//! a scripted mock.

pub mod parse;

use crate::config::NodesConfig;
use crate::error::CliError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

// ============================================================================
// Trait Definitions
// ============================================================================

/// Captured result of one `lms` invocation that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout and stderr together, for substring checks
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Arguments for `lms load`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub model_path: String,
    pub context_length: u32,
    pub gpu: String,
}

impl LoadRequest {
    pub fn args(&self) -> Vec<String> {
        vec![
            "load".to_string(),
            self.model_path.clone(),
            "-y".to_string(),
            format!("--context-length={}", self.context_length),
            format!("--gpu={}", self.gpu),
        ]
    }
}

/// The four `lms` operations the nodes rely on
#[async_trait]
pub trait LmsCli: Send + Sync {
    /// `lms ls --detailed`
    async fn list_detailed(&self) -> Result<CliOutput, CliError>;

    /// `lms ps`
    async fn list_loaded(&self) -> Result<CliOutput, CliError>;

    /// `lms unload --all -y`
    async fn unload_all(&self) -> Result<CliOutput, CliError>;

    /// `lms load <path> -y --context-length=<n> --gpu=<g>`
    async fn load(&self, request: &LoadRequest) -> Result<CliOutput, CliError>;
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Runs the real `lms` executable via tokio::process
#[derive(Debug, Clone)]
pub struct SystemLmsCli {
    binary: String,
    list_timeout: Duration,
    status_timeout: Duration,
    unload_timeout: Duration,
    load_timeout: Duration,
}

impl SystemLmsCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self::from_config(&NodesConfig {
            lms_binary: binary.into(),
            ..Default::default()
        })
    }

    pub fn from_config(config: &NodesConfig) -> Self {
        Self {
            binary: config.resolved_lms_binary(),
            list_timeout: config.list_timeout(),
            status_timeout: config.status_timeout(),
            unload_timeout: config.unload_timeout(),
            load_timeout: config.load_timeout(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn run(&self, args: &[String], limit: Duration) -> Result<CliOutput, CliError> {
        tracing::debug!(
            binary = %self.binary,
            args = %args.join(" "),
            timeout_secs = limit.as_secs(),
            "Running lms"
        );

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CliError::NotFound(self.binary.clone()),
                _ => CliError::Spawn(e.to_string()),
            })?;

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| CliError::Timeout(limit))?
            .map_err(|e| CliError::Spawn(e.to_string()))?;

        let output = CliOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(code = ?output.code, "lms finished");
        Ok(output)
    }
}

impl Default for SystemLmsCli {
    fn default() -> Self {
        Self::from_config(&NodesConfig::default())
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl LmsCli for SystemLmsCli {
    async fn list_detailed(&self) -> Result<CliOutput, CliError> {
        self.run(&args(&["ls", "--detailed"]), self.list_timeout).await
    }

    async fn list_loaded(&self) -> Result<CliOutput, CliError> {
        self.run(&args(&["ps"]), self.status_timeout).await
    }

    async fn unload_all(&self) -> Result<CliOutput, CliError> {
        self.run(&args(&["unload", "--all", "-y"]), self.unload_timeout)
            .await
    }

    async fn load(&self, request: &LoadRequest) -> Result<CliOutput, CliError> {
        self.run(&request.args(), self.load_timeout).await
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================
