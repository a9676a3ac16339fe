//! LMS Nodes - command-line entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lms_nodes::SystemLmsCli;
use lms_nodes::catalog::{self, ModelCatalog};
use lms_nodes::config::{self, NodesConfig};
use lms_nodes::controller::{LoadController, LoadOptions};
use lms_nodes::loaders::{
    self, HeaderProbe, LoaderOptions, ModelFolders, ModelKind, ModelLoader, WeightDtype,
};
use lms_nodes::prompt::{self, DescriptionOptions, Emphasis, PromptMode, Style};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "lms-nodes")]
#[command(about = "Model loader, LM Studio control and prompt nodes", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: String,

    /// Print node outputs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed LM Studio models
    List {
        /// Mark vision models and list them first
        #[arg(long)]
        marked: bool,

        /// Print bare model ids (last path segment) in listing order
        #[arg(long, conflicts_with = "marked")]
        ids: bool,
    },

    /// List models currently loaded in LM Studio
    Loaded,

    /// Load a model when the graph runs, then verify it
    Load {
        model: String,

        #[arg(long, value_parser = parse_context_length)]
        context_length: Option<u32>,

        /// Keep other loaded models instead of unloading them first
        #[arg(long)]
        no_unload: bool,

        /// Seconds to wait after loading before verifying
        #[arg(long)]
        wait: Option<u64>,

        /// Mark the model for unloading after use
        #[arg(long)]
        unload_after: bool,
    },

    /// Select a model and load it unless in manual mode
    AutoLoad {
        model: String,

        #[arg(long, value_parser = parse_context_length)]
        context_length: Option<u32>,

        /// Only report the selection, do not load
        #[arg(long)]
        manual: bool,
    },

    /// Unload every loaded model
    Unload,

    /// Try unloading and loading a model name, printing every step
    Probe { model: String },

    /// Turn a description into a comma-separated prompt ("-" reads stdin)
    Prompt {
        description: String,

        #[arg(long, default_value = "default")]
        style: Style,

        #[arg(long)]
        no_quality: bool,

        #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u16).range(10..=100))]
        max_keywords: u16,

        #[arg(long, default_value = "")]
        suffix: String,
    },

    /// Append emphasis tags and default negatives to a prompt
    Enhance {
        prompt: String,

        #[arg(long, default_value = "medium")]
        emphasis: Emphasis,

        #[arg(long, default_value = "")]
        negative: String,

        #[arg(long)]
        no_negative_defaults: bool,
    },

    /// Pick either the manual prompt or the image-to-prompt output
    Select {
        #[arg(long, default_value = "manual_prompt")]
        mode: PromptMode,

        #[arg(long)]
        manual: Option<String>,

        #[arg(long)]
        image2prompt: Option<String>,
    },

    /// List model files a loader node offers
    Models { kind: ModelKind },

    /// Resolve and probe a model file, printing its display name
    Resolve {
        kind: ModelKind,
        name: String,

        #[arg(long, default_value = "default")]
        weight_dtype: WeightDtype,
    },
}

fn parse_context_length(s: &str) -> Result<u32, String> {
    let value: u32 = s.parse().map_err(|e| format!("{}", e))?;
    config::validate_context_length(value).map_err(|e| e.to_string())?;
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for node outputs
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let config = NodesConfig::load(cli.config.clone())?;
    config.validate()?;

    tracing::debug!(
        lms_binary = %config.lms_binary,
        context_length = config.context_length,
        models_root = ?config.models_root,
        "Configuration loaded"
    );

    run(cli.command, &config, cli.json).await
}

async fn run(command: Command, config: &NodesConfig, json: bool) -> Result<ExitCode> {
    let lms = Arc::new(SystemLmsCli::from_config(config));

    match command {
        Command::List { marked, ids } => {
            if ids {
                let ids = catalog::list_model_ids(lms.as_ref()).await;
                emit(json, &ids, || ids.join("\n"))?;
            } else {
                let catalog = if marked {
                    catalog::list_marked_models(lms.as_ref()).await
                } else {
                    catalog::list_models(lms.as_ref()).await
                };
                emit(json, &catalog, || catalog.names().join("\n"))?;
            }
        }

        Command::Loaded => {
            let loaded = catalog::list_loaded_models(lms.as_ref()).await;
            if let Some(first) = loaded.first() {
                catalog::select_loaded(first);
            }
            emit(json, &loaded, || loaded.join("\n"))?;
        }

        Command::Load {
            model,
            context_length,
            no_unload,
            wait,
            unload_after,
        } => {
            let mut options = LoadOptions::from_config(config);
            options.unload_first = !no_unload;
            if let Some(wait) = wait {
                options.post_load_wait = Duration::from_secs(wait);
            }

            let catalog = catalog::list_models(lms.as_ref()).await;
            let controller = LoadController::new(lms, options);
            let output = controller
                .load_on_run(
                    &model,
                    &catalog,
                    context_length.unwrap_or(config.context_length),
                    unload_after,
                )
                .await;
            emit(json, &output, || format!("{}\n{}", output.model_name, output.status))?;
            return Ok(exit_code(output.success));
        }

        Command::AutoLoad {
            model,
            context_length,
            manual,
        } => {
            let catalog = if manual {
                ModelCatalog::default()
            } else {
                catalog::list_models(lms.as_ref()).await
            };
            let controller = LoadController::new(lms, LoadOptions::from_config(config));
            let output = controller
                .select_and_load(
                    &model,
                    &catalog,
                    !manual,
                    context_length.unwrap_or(config.context_length),
                )
                .await;
            emit(json, &output, || format!("{}\n{}", output.model_name, output.status))?;
            return Ok(exit_code(output.success));
        }

        Command::Unload => {
            let controller = LoadController::new(lms, LoadOptions::from_config(config));
            let ok = controller.unload_all().await;
            emit(json, &ok, || {
                if ok { "Unloaded" } else { "Unload failed" }.to_string()
            })?;
            return Ok(exit_code(ok));
        }

        Command::Probe { model } => {
            let controller = LoadController::new(lms, LoadOptions::from_config(config));
            let report = controller.probe(&model).await;
            emit(json, &report, || {
                let mut text = format!(
                    "unload: {}\nload: {}\n",
                    if report.unload_ok { "ok" } else { "failed" },
                    match (&report.load_error, report.load_code) {
                        (Some(e), _) => e.clone(),
                        (None, code) => format!("exit code {:?}", code),
                    }
                );
                if !report.load_stdout.trim().is_empty() {
                    text.push_str(&format!("stdout:\n{}\n", report.load_stdout.trim_end()));
                }
                if !report.load_stderr.trim().is_empty() {
                    text.push_str(&format!("stderr:\n{}\n", report.load_stderr.trim_end()));
                }
                text.push_str(&format!(
                    "currently loaded:\n{}\n{} in lms ps output ({}ms)",
                    report.loaded_output.trim_end(),
                    if report.found { "found" } else { "NOT found" },
                    (report.finished_at - report.started_at).num_milliseconds()
                ));
                text
            })?;
            return Ok(exit_code(report.found));
        }

        Command::Prompt {
            description,
            style,
            no_quality,
            max_keywords,
            suffix,
        } => {
            let description = read_arg(description)?;
            let options = DescriptionOptions {
                add_quality_tags: !no_quality,
                style,
                max_keywords: max_keywords as usize,
                custom_suffix: suffix,
            };
            let prompt = prompt::description_to_prompt(&description, &options);
            emit(json, &prompt, || prompt.clone())?;
        }

        Command::Enhance {
            prompt: base,
            emphasis,
            negative,
            no_negative_defaults,
        } => {
            let base = read_arg(base)?;
            let enhanced = prompt::enhance(&base, emphasis, &negative, !no_negative_defaults);
            emit(json, &enhanced, || {
                format!("{}\n{}", enhanced.prompt, enhanced.negative_prompt)
            })?;
        }

        Command::Select {
            mode,
            manual,
            image2prompt,
        } => {
            let selected = prompt::select_prompt(mode, manual.as_deref(), image2prompt.as_deref());
            emit(json, &selected, || selected.clone())?;
        }

        Command::Models { kind } => {
            let names = ModelFolders::from_config(config).selectable_names(kind);
            emit(json, &names, || names.join("\n"))?;
        }

        Command::Resolve {
            kind,
            name,
            weight_dtype,
        } => {
            let folders = ModelFolders::from_config(config);
            let options = LoaderOptions { weight_dtype };
            let loaded = match kind {
                ModelKind::Gguf => {
                    let strategies: Vec<Box<dyn ModelLoader<Handle = loaders::ModelInfo>>> =
                        vec![Box::new(HeaderProbe::gguf()), Box::new(HeaderProbe::any())];
                    loaders::load_with_strategies(&folders, kind, &name, &strategies, &options)?
                }
                _ => loaders::load_with_name(&folders, kind, &name, &HeaderProbe::any(), &options)?,
            };

            #[derive(Serialize)]
            struct Resolved<'a> {
                model_name: &'a str,
                #[serde(flatten)]
                info: &'a loaders::ModelInfo,
            }

            let resolved = Resolved {
                model_name: &loaded.model_name,
                info: &loaded.handle,
            };
            emit(json, &resolved, || {
                format!(
                    "{}\n{}\n{:?}",
                    loaded.model_name,
                    loaded.path.display(),
                    loaded.handle.format
                )
            })?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Print a node output as JSON or as plain text
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("Failed to serialize output")?
        );
    } else {
        println!("{}", text());
    }
    Ok(())
}

/// "-" means read the whole of stdin
fn read_arg(value: String) -> Result<String> {
    if value != "-" {
        return Ok(value);
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read stdin")?;
    Ok(buf)
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
