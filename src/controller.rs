//! Load, verify and unload LM Studio models
//!
//! One invocation walks check-loaded, unload, load, post-load wait and
//! verify in order. Nothing is kept between invocations; the model catalog
//! is passed in by the caller.

use crate::catalog::ModelCatalog;
use crate::catalog::vision::strip_marker;
use crate::config::NodesConfig;
use crate::error::CliError;
use crate::lms::parse;
use crate::lms::{CliOutput, LmsCli, LoadRequest};
use crate::retry::{PollOutcome, RetryPolicy};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How much of a failed command's output is logged
const OUTPUT_SNIPPET_CHARS: usize = 300;

/// Status of one load invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadStatus {
    /// `lms ps` already listed the model; nothing was unloaded or loaded
    AlreadyLoaded,
    /// Loaded and confirmed by `lms ps`
    Ready,
    /// `lms load` succeeded but `lms ps` never confirmed it
    LoadedUnverified,
    /// Auto-load disabled; `lms` was not touched
    ManualMode,
    /// `lms load` exited non-zero
    Failed { code: Option<i32> },
    /// `lms load` did not finish in time
    TimedOut { secs: u64 },
    /// `lms` could not be run at all
    Error { message: String },
}

impl LoadStatus {
    /// Whether the caller may go on to use the model
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyLoaded | Self::Ready | Self::LoadedUnverified | Self::ManualMode
        )
    }

    fn label(&self) -> &'static str {
        match self {
            Self::AlreadyLoaded => "already_loaded",
            Self::Ready => "ready",
            Self::LoadedUnverified => "loaded_unverified",
            Self::ManualMode => "manual",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timeout",
            Self::Error { .. } => "error",
        }
    }
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyLoaded => write!(f, "Already loaded"),
            Self::Ready => write!(f, "Ready"),
            Self::LoadedUnverified => write!(f, "Loaded (unverified)"),
            Self::ManualMode => write!(f, "Manual mode"),
            Self::Failed { code: Some(code) } => write!(f, "Load failed (code {})", code),
            Self::Failed { code: None } => write!(f, "Load failed"),
            Self::TimedOut { secs } => write!(f, "Timeout (>{}s)", secs),
            Self::Error { message } => write!(f, "Error: {}", message),
        }
    }
}

/// Success flag plus status of one load invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub success: bool,
    pub status: LoadStatus,
}

impl LoadOutcome {
    fn from_status(status: LoadStatus) -> Self {
        Self {
            success: status.is_usable(),
            status,
        }
    }

    pub fn message(&self) -> String {
        self.status.to_string()
    }
}

/// Outputs of the selector/loader nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutput {
    /// Identifier downstream chat nodes address the model by
    pub model_name: String,
    pub status: String,
    pub success: bool,
}

/// Knobs for one load invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub context_length: u32,
    pub gpu: String,
    /// Run `lms unload --all` before loading
    pub unload_first: bool,
    pub unload_settle: Duration,
    pub post_load_wait: Duration,
    pub min_post_load_wait: Duration,
    pub verify: RetryPolicy,
}

impl LoadOptions {
    pub fn from_config(config: &NodesConfig) -> Self {
        Self {
            context_length: config.context_length,
            gpu: config.gpu.clone(),
            unload_first: true,
            unload_settle: Duration::from_secs(config.unload_settle_secs),
            post_load_wait: Duration::from_secs(config.post_load_wait_secs),
            min_post_load_wait: Duration::from_secs(config.min_post_load_wait_secs),
            verify: RetryPolicy::new(
                config.verify_attempts,
                Duration::from_secs(config.verify_interval_secs),
            )
            .with_timeout(Duration::from_secs(config.verify_timeout_secs)),
        }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from_config(&NodesConfig::default())
    }
}

/// Diagnostic run of unload, load and `lms ps` for one model name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub model: String,
    pub unload_ok: bool,
    pub load_code: Option<i32>,
    pub load_stdout: String,
    pub load_stderr: String,
    pub load_error: Option<String>,
    pub loaded_output: String,
    /// Whether the exact name appeared in `lms ps`
    pub found: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

/// Drives `lms` through the load/verify/unload sequence
pub struct LoadController {
    cli: Arc<dyn LmsCli>,
    options: LoadOptions,
}

impl LoadController {
    pub fn new(cli: Arc<dyn LmsCli>, options: LoadOptions) -> Self {
        Self { cli, options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Whether `lms ps` mentions the model; any failure counts as "no"
    pub async fn is_loaded(&self, display_name: &str, full_path: &str) -> bool {
        match self.cli.list_loaded().await {
            Ok(output) if output.success() => {
                parse::output_mentions_model(&output.stdout, display_name, full_path)
            }
            Ok(output) => {
                tracing::debug!(code = ?output.code, "lms ps failed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error checking loaded models");
                false
            }
        }
    }

    /// Unload every model; returns whether LM Studio ended up empty
    ///
    /// Failures are logged and tolerated, the following load is attempted
    /// regardless.
    pub async fn unload_all(&self) -> bool {
        match self.try_unload_all().await {
            Ok(emptied) => emptied,
            Err(e) => {
                tracing::warn!(error = %e, "Unload failed, continuing");
                false
            }
        }
    }

    /// `Ok(false)` when `lms unload` ran but reported an error
    async fn try_unload_all(&self) -> Result<bool, CliError> {
        tracing::info!("Unloading previous models");
        let output = self.cli.unload_all().await?;

        if output.success() {
            Ok(true)
        } else if parse::reports_nothing_loaded(&output.combined()) {
            tracing::debug!("Nothing was loaded");
            Ok(true)
        } else {
            tracing::warn!(
                code = ?output.code,
                stderr = %snippet(&output.stderr),
                "Unload returned an error, continuing"
            );
            Ok(false)
        }
    }

    /// Make sure the selected model is loaded
    pub async fn load(
        &self,
        display_name: &str,
        catalog: &ModelCatalog,
        options: &LoadOptions,
    ) -> LoadOutcome {
        let display_name = strip_marker(display_name);
        let full_path = catalog.resolve(display_name);

        tracing::info!(
            display_name = %display_name,
            full_path = %full_path,
            context_length = options.context_length,
            "Loading model"
        );

        let outcome = self.run_load(display_name, full_path, options).await;
        crate::metrics::record_load_outcome(outcome.status.label());
        outcome
    }

    async fn run_load(
        &self,
        display_name: &str,
        full_path: &str,
        options: &LoadOptions,
    ) -> LoadOutcome {
        if self.is_loaded(display_name, full_path).await {
            tracing::info!(model = %display_name, "Model already loaded");
            return LoadOutcome::from_status(LoadStatus::AlreadyLoaded);
        }

        if options.unload_first {
            // Only settle when lms actually answered
            match self.try_unload_all().await {
                Ok(_) => tokio::time::sleep(options.unload_settle).await,
                Err(e) => tracing::warn!(error = %e, "Unload failed, loading without settling"),
            }
        }

        crate::metrics::record_load_attempt(full_path);
        let request = LoadRequest {
            model_path: full_path.to_string(),
            context_length: options.context_length,
            gpu: options.gpu.clone(),
        };
        tracing::info!(command = %format!("lms {}", request.args().join(" ")), "Running load");

        let status = match self.cli.load(&request).await {
            Ok(output) if output.success() => {
                for line in parse::identifier_lines(&output.combined()) {
                    tracing::info!(line = %line, "Model identifier");
                }
                tracing::info!(model = %display_name, "Model loaded");
                self.wait_and_verify(display_name, full_path, options).await
            }
            Ok(output) => {
                log_failed_output(&output);
                LoadStatus::Failed { code: output.code }
            }
            Err(CliError::Timeout(limit)) => {
                tracing::error!(timeout_secs = limit.as_secs(), "Timeout loading model");
                LoadStatus::TimedOut {
                    secs: limit.as_secs(),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Error loading model");
                LoadStatus::Error {
                    message: e.to_string(),
                }
            }
        };

        LoadOutcome::from_status(status)
    }

    async fn wait_and_verify(
        &self,
        display_name: &str,
        full_path: &str,
        options: &LoadOptions,
    ) -> LoadStatus {
        if options.post_load_wait < options.min_post_load_wait {
            tracing::warn!(
                wait_secs = options.post_load_wait.as_secs(),
                recommended_secs = options.min_post_load_wait.as_secs(),
                "Post-load wait is short, the server may not be ready yet"
            );
        }
        tokio::time::sleep(options.post_load_wait).await;

        let this = self;
        let outcome = options
            .verify
            .poll_until(move |_| this.is_loaded(display_name, full_path))
            .await;
        crate::metrics::record_verify_attempts(outcome.attempts());

        match outcome {
            PollOutcome::Ready { attempts } => {
                tracing::info!(attempts, "Model verified as loaded");
                LoadStatus::Ready
            }
            PollOutcome::Exhausted { attempts } => {
                tracing::warn!(
                    attempts,
                    model = %display_name,
                    "Model not confirmed by lms ps, continuing anyway"
                );
                LoadStatus::LoadedUnverified
            }
        }
    }

    /// Select a model and load it unless auto-load is off
    pub async fn select_and_load(
        &self,
        model: &str,
        catalog: &ModelCatalog,
        auto_load: bool,
        context_length: u32,
    ) -> NodeOutput {
        let api_name = parse::api_name(strip_marker(model));
        tracing::info!(selected = %model, api_name = %api_name, auto_load, "Model selected");

        let outcome = if auto_load {
            let options = LoadOptions {
                context_length,
                ..self.options.clone()
            };
            self.load(model, catalog, &options).await
        } else {
            tracing::info!("Auto-load disabled");
            LoadOutcome::from_status(LoadStatus::ManualMode)
        };

        NodeOutput {
            model_name: api_name.to_string(),
            status: outcome.message(),
            success: outcome.success,
        }
    }

    /// Load the selected model when the graph runs
    ///
    /// `unload_after` only annotates the status: the model must stay loaded
    /// for the downstream node that uses it.
    pub async fn load_on_run(
        &self,
        model: &str,
        catalog: &ModelCatalog,
        context_length: u32,
        unload_after: bool,
    ) -> NodeOutput {
        let mut output = self
            .select_and_load(model, catalog, true, context_length)
            .await;
        if unload_after && output.success {
            output.status.push_str(" (will unload)");
        }
        output
    }

    /// Unload, load and list, reporting every step
    pub async fn probe(&self, model: &str) -> ProbeReport {
        let started_at = chrono::Utc::now();
        let unload_ok = self.unload_all().await;

        let request = LoadRequest {
            model_path: model.to_string(),
            context_length: self.options.context_length,
            gpu: self.options.gpu.clone(),
        };
        let (load_code, load_stdout, load_stderr, load_error) = match self.cli.load(&request).await
        {
            Ok(output) => (output.code, output.stdout, output.stderr, None),
            Err(e) => (None, String::new(), String::new(), Some(e.to_string())),
        };

        let loaded_output = match self.cli.list_loaded().await {
            Ok(output) => output.stdout,
            Err(e) => {
                tracing::warn!(error = %e, "Error checking loaded models");
                String::new()
            }
        };
        let found = loaded_output.contains(model);

        ProbeReport {
            model: model.to_string(),
            unload_ok,
            load_code,
            load_stdout,
            load_stderr,
            load_error,
            loaded_output,
            found,
            started_at,
            finished_at: chrono::Utc::now(),
        }
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(OUTPUT_SNIPPET_CHARS).collect()
}

fn log_failed_output(output: &CliOutput) {
    tracing::error!(
        code = ?output.code,
        stdout = %snippet(&output.stdout),
        stderr = %snippet(&output.stderr),
        "Load failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lms::mocks::{MockLmsCli, exit, ok};

    fn controller(cli: Arc<MockLmsCli>) -> LoadController {
        LoadController::new(cli, LoadOptions::default())
    }

    fn catalog() -> ModelCatalog {
        ModelCatalog::from_entries(crate::lms::parse::parse_detailed_listing(
            "/google/gemma-3-27b-GGUF/gemma-3-27b-Q4.gguf 27B\n",
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_loaded_skips_unload_and_load() {
        let cli = Arc::new(MockLmsCli::new().push_ps(ok("gemma-3-27b-GGUF/gemma-3-27b-Q4.gguf")));
        let outcome = controller(cli.clone())
            .load("gemma-3-27b-GGUF/gemma-3-27b-Q4.gguf", &catalog(), &LoadOptions::default())
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.status, LoadStatus::AlreadyLoaded);
        assert_eq!(outcome.message(), "Already loaded");
        assert_eq!(cli.count("unload"), 0);
        assert_eq!(cli.count("load"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marked_name_matches_exact_display_name() {
        let cli = Arc::new(MockLmsCli::new().push_ps(ok("x/q4   loaded")));
        let catalog =
            ModelCatalog::from_entries(crate::lms::parse::parse_detailed_listing("/pub/x/q4 7B\n"));
        let marked = format!("{}x/q4", crate::catalog::VISION_MARKER);

        let outcome = controller(cli.clone())
            .load(&marked, &catalog, &LoadOptions::default())
            .await;

        assert_eq!(outcome.status, LoadStatus::AlreadyLoaded);
        assert_eq!(cli.calls(), vec!["ps"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_then_verify_ready() {
        let cli = Arc::new(
            MockLmsCli::new()
                .push_ps(ok("No models are currently loaded."))
                .push_ps(ok("No models are currently loaded."))
                .with_ps_default(ok("gemma-3-27b-Q4.gguf  loaded")),
        );
        let outcome = controller(cli.clone())
            .load("gemma-3-27b-GGUF/gemma-3-27b-Q4.gguf", &catalog(), &LoadOptions::default())
            .await;

        assert_eq!(outcome.status, LoadStatus::Ready);
        assert_eq!(cli.count("unload"), 1);
        assert!(cli.calls().contains(
            &"load google/gemma-3-27b-GGUF/gemma-3-27b-Q4.gguf -y --context-length=8192 --gpu=1"
                .to_string()
        ));
        // initial check, one miss, one hit
        assert_eq!(cli.count("ps"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unverified_is_soft_failure() {
        let cli = Arc::new(MockLmsCli::new());
        let options = LoadOptions {
            verify: RetryPolicy::new(4, Duration::from_secs(1)),
            ..Default::default()
        };
        let outcome = controller(cli.clone())
            .load("pixtral-12b", &ModelCatalog::fallback(), &options)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.status, LoadStatus::LoadedUnverified);
        assert_eq!(cli.count("ps"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_stops_at_configured_deadline() {
        let config = NodesConfig {
            verify_timeout_secs: 3,
            ..Default::default()
        };
        let options = LoadOptions::from_config(&config);
        assert_eq!(options.verify.timeout, Some(Duration::from_secs(3)));

        let cli = Arc::new(MockLmsCli::new());
        let outcome = controller(cli.clone())
            .load("pixtral-12b", &ModelCatalog::fallback(), &options)
            .await;

        assert_eq!(outcome.status, LoadStatus::LoadedUnverified);
        // Initial check plus polls at 0s, 1s, 2s and 3s
        assert_eq!(cli.count("ps"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unload_can_be_skipped() {
        let cli = Arc::new(MockLmsCli::new().with_ps_default(ok("pixtral-12b")).push_ps(ok("")));
        let options = LoadOptions {
            unload_first: false,
            ..Default::default()
        };
        let outcome = controller(cli.clone())
            .load("pixtral-12b", &ModelCatalog::fallback(), &options)
            .await;

        assert_eq!(outcome.status, LoadStatus::Ready);
        assert_eq!(cli.count("unload"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unload_failure_does_not_block_load() {
        let cli = Arc::new(
            MockLmsCli::new()
                .with_unload(Err(CliError::Timeout(Duration::from_secs(10))))
                .push_ps(ok(""))
                .with_ps_default(ok("pixtral-12b")),
        );
        let outcome = controller(cli.clone())
            .load("pixtral-12b", &ModelCatalog::fallback(), &LoadOptions::default())
            .await;

        assert_eq!(outcome.status, LoadStatus::Ready);
        assert_eq!(cli.count("load"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_only_after_unload_answers() {
        let scripted = |unload| {
            Arc::new(
                MockLmsCli::new()
                    .with_unload(unload)
                    .push_ps(ok(""))
                    .with_ps_default(ok("pixtral-12b")),
            )
        };
        let options = LoadOptions::default();

        let start = tokio::time::Instant::now();
        controller(scripted(Err(CliError::Timeout(Duration::from_secs(10)))))
            .load("pixtral-12b", &ModelCatalog::fallback(), &options)
            .await;
        assert_eq!(start.elapsed(), options.post_load_wait);

        let start = tokio::time::Instant::now();
        controller(scripted(exit(1, "boom")))
            .load("pixtral-12b", &ModelCatalog::fallback(), &options)
            .await;
        assert_eq!(start.elapsed(), options.unload_settle + options.post_load_wait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_exit_code_is_terminal() {
        let cli = Arc::new(MockLmsCli::new().with_load(exit(1, "model not found")));
        let outcome = controller(cli.clone())
            .load("missing-model", &ModelCatalog::default(), &LoadOptions::default())
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.message(), "Load failed (code 1)");
        assert_eq!(cli.count("load"), 1);
        // no verification polling after a failed load
        assert_eq!(cli.count("ps"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_status() {
        let cli = Arc::new(
            MockLmsCli::new().with_load(Err(CliError::Timeout(Duration::from_secs(120)))),
        );
        let outcome = controller(cli)
            .load("pixtral-12b", &ModelCatalog::fallback(), &LoadOptions::default())
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.status, LoadStatus::TimedOut { secs: 120 });
        assert_eq!(outcome.message(), "Timeout (>120s)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_binary_status() {
        let cli = Arc::new(MockLmsCli::new().with_load(Err(CliError::NotFound("lms".into()))));
        let outcome = controller(cli)
            .load("pixtral-12b", &ModelCatalog::fallback(), &LoadOptions::default())
            .await;

        assert!(!outcome.success);
        assert!(outcome.message().starts_with("Error: lms executable not found"));
    }

    #[tokio::test]
    async fn test_nothing_loaded_counts_as_unloaded() {
        let cli = Arc::new(MockLmsCli::new().with_unload(exit(1, "No models loaded")));
        assert!(controller(cli).unload_all().await);
    }

    #[tokio::test]
    async fn test_manual_mode_does_not_touch_lms() {
        let cli = Arc::new(MockLmsCli::new());
        let output = controller(cli.clone())
            .select_and_load("google/gemma-3-27b", &ModelCatalog::fallback(), false, 8192)
            .await;

        assert_eq!(output.model_name, "gemma-3-27b");
        assert_eq!(output.status, "Manual mode");
        assert!(cli.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_and_load_passes_context_length() {
        let cli = Arc::new(MockLmsCli::new().push_ps(ok("")).with_ps_default(ok("pixtral-12b")));
        let output = controller(cli.clone())
            .select_and_load("pixtral-12b", &ModelCatalog::fallback(), true, 4096)
            .await;

        assert_eq!(output.status, "Ready");
        assert!(
            cli.calls()
                .iter()
                .any(|c| c.contains("--context-length=4096"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_on_run_annotates_unload_after() {
        let cli = Arc::new(MockLmsCli::new().with_ps_default(ok("pixtral-12b")));
        let output = controller(cli.clone())
            .load_on_run("pixtral-12b", &ModelCatalog::fallback(), 8192, true)
            .await;

        assert_eq!(output.status, "Already loaded (will unload)");
        assert_eq!(cli.count("unload"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_on_run_failure_not_annotated() {
        let cli = Arc::new(MockLmsCli::new().with_load(exit(3, "")));
        let output = controller(cli)
            .load_on_run("pixtral-12b", &ModelCatalog::fallback(), 8192, true)
            .await;

        assert!(!output.success);
        assert_eq!(output.status, "Load failed (code 3)");
    }

    #[tokio::test]
    async fn test_probe_reports_each_step() {
        let cli = Arc::new(
            MockLmsCli::new()
                .with_load(ok("Model loaded"))
                .with_ps_default(ok("llava-v1.5-7b  4.1 GB")),
        );
        let report = controller(cli.clone()).probe("llava-v1.5-7b").await;

        assert!(report.unload_ok);
        assert_eq!(report.load_code, Some(0));
        assert!(report.found);
        assert!(report.finished_at >= report.started_at);
        assert_eq!(
            cli.calls(),
            vec![
                "unload --all -y",
                "load llava-v1.5-7b -y --context-length=8192 --gpu=1",
                "ps"
            ]
        );
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(LoadStatus::Ready.to_string(), "Ready");
        assert_eq!(LoadStatus::LoadedUnverified.to_string(), "Loaded (unverified)");
        assert_eq!(LoadStatus::Failed { code: None }.to_string(), "Load failed");
        assert!(!LoadStatus::TimedOut { secs: 1 }.is_usable());
    }
}
