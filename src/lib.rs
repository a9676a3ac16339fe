//! LMS Nodes - model loader, LM Studio control and prompt nodes
//!
//! Thin adapters for a node-based image-generation host: load model files
//! and report their names, list/load/unload LM Studio models through the
//! `lms` command-line tool, and build text prompts.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod loaders;
pub mod lms;
pub mod metrics;
pub mod prompt;
pub mod retry;

pub use catalog::{ModelCatalog, list_loaded_models, list_marked_models, list_models};
pub use config::NodesConfig;
pub use controller::{LoadController, LoadOptions, LoadOutcome, LoadStatus, NodeOutput};
pub use error::{CliError, NodesError, NodesResult};
pub use lms::{CliOutput, LmsCli, LoadRequest, SystemLmsCli};
pub use retry::{PollOutcome, RetryPolicy};
