//! Model listing nodes
//!
//! Builds the selectable model lists from `lms` output. A listing never
//! fails: when LM Studio is unreachable the caller gets a fixed fallback
//! list so the node still renders.

pub mod vision;

pub use vision::{VISION_MARKER, is_catalog_entry, is_vision_model, list_marked_models};

use crate::lms::LmsCli;
use crate::lms::parse::{self, ListingEntry};
use serde::Serialize;
use std::collections::BTreeMap;

/// Offered when `lms ls --detailed` yields nothing usable
pub const FALLBACK_MODELS: [&str; 5] = [
    "llava-v1.5-7b",
    "qwen2-vl-7b-instruct",
    "pixtral-12b",
    "google/gemma-3-27b",
    "llama-3.1-unhinged-vision-8b",
];

/// Fallback for the flat id selector
pub const FALLBACK_MODEL_IDS: [&str; 5] = [
    "llava-v1.5",
    "qwen2-vl-7b-instruct",
    "pixtral-12b",
    "minicpm-v-2.6",
    "gemma-3-27b-it",
];

/// Loaded-models sentinel: `lms ps` listed nothing
pub const NO_MODEL_LOADED: &str = "no-model-loaded";
/// Loaded-models sentinel: `lms ps` exited non-zero
pub const LMS_ERROR: &str = "lms-error";
/// Loaded-models sentinel: `lms ps` could not be run
pub const ERROR_CHECKING_MODELS: &str = "error-checking-models";

/// Where a catalog's entries came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSource {
    Lms,
    #[default]
    Fallback,
}

/// Display names offered for selection plus the path each one resolves to
///
/// Rebuilt from scratch on every listing and passed explicitly to the load
/// controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelCatalog {
    names: Vec<String>,
    paths: BTreeMap<String, String>,
    source: CatalogSource,
}

impl ModelCatalog {
    /// Build from parsed listing rows: unique names, sorted
    ///
    /// When two paths share a display name the last one listed wins.
    pub fn from_entries(entries: Vec<ListingEntry>) -> Self {
        let mut paths = BTreeMap::new();
        for entry in entries {
            tracing::debug!(
                display_name = %entry.display_name,
                full_path = %entry.full_path,
                "Mapped model"
            );
            paths.insert(entry.display_name, entry.full_path);
        }

        Self {
            names: paths.keys().cloned().collect(),
            paths,
            source: CatalogSource::Lms,
        }
    }

    /// The fixed fallback list, each name mapping to itself
    pub fn fallback() -> Self {
        Self::from_names(&FALLBACK_MODELS)
    }

    /// Catalog whose names are their own paths, in the given order
    pub fn from_names(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            paths: names
                .iter()
                .map(|n| (n.to_string(), n.to_string()))
                .collect(),
            source: CatalogSource::Fallback,
        }
    }

    pub(crate) fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn source(&self) -> CatalogSource {
        self.source
    }

    pub fn is_fallback(&self) -> bool {
        self.source == CatalogSource::Fallback
    }

    /// First entry, the node's default selection
    pub fn default_selection(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// Path `lms load` should receive for a display name
    ///
    /// Unknown names resolve to themselves so a typed-in identifier still
    /// reaches `lms`.
    pub fn resolve<'a>(&'a self, display_name: &'a str) -> &'a str {
        let name = vision::strip_marker(display_name);
        self.paths.get(name).map(String::as_str).unwrap_or(name)
    }
}

/// List installed models via `lms ls --detailed`
pub async fn list_models(cli: &dyn LmsCli) -> ModelCatalog {
    let output = match cli.list_detailed().await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "Error listing models, using defaults");
            crate::metrics::record_listing_fallback("unavailable");
            return ModelCatalog::fallback();
        }
    };

    if !output.success() {
        tracing::warn!(code = ?output.code, "lms ls failed, using defaults");
        crate::metrics::record_listing_fallback("exit_code");
        return ModelCatalog::fallback();
    }

    let catalog = ModelCatalog::from_entries(parse::parse_detailed_listing(&output.stdout));
    if catalog.is_empty() {
        tracing::info!("No models found, using defaults");
        crate::metrics::record_listing_fallback("empty");
        return ModelCatalog::fallback();
    }

    tracing::info!(count = catalog.len(), "Listed installed models");
    catalog
}

/// List installed models as bare ids (last path segment), output order
pub async fn list_model_ids(cli: &dyn LmsCli) -> Vec<String> {
    let fallback = || FALLBACK_MODEL_IDS.iter().map(|s| s.to_string()).collect();

    match cli.list_detailed().await {
        Ok(output) if output.success() => {
            let ids = parse::parse_model_ids(&output.stdout);
            if ids.is_empty() {
                tracing::info!("No models found, using defaults");
                fallback()
            } else {
                tracing::info!(count = ids.len(), "Listed model ids");
                ids
            }
        }
        Ok(output) => {
            tracing::warn!(code = ?output.code, "lms ls failed, using defaults");
            fallback()
        }
        Err(e) => {
            tracing::warn!(error = %e, "lms unavailable, using defaults");
            fallback()
        }
    }
}

/// List the models LM Studio currently has in memory
///
/// Never empty: yields a single sentinel entry when nothing can be listed.
pub async fn list_loaded_models(cli: &dyn LmsCli) -> Vec<String> {
    match cli.list_loaded().await {
        Ok(output) if output.success() => {
            let loaded = parse::parse_loaded(&output.stdout);
            if loaded.is_empty() {
                vec![NO_MODEL_LOADED.to_string()]
            } else {
                tracing::info!(models = %loaded.join(", "), "Currently loaded");
                loaded
            }
        }
        Ok(_) => vec![LMS_ERROR.to_string()],
        Err(e) => {
            tracing::warn!(error = %e, "Error checking loaded models");
            vec![ERROR_CHECKING_MODELS.to_string()]
        }
    }
}

/// Pass a loaded-model selection through, warning on the empty sentinel
pub fn select_loaded(model: &str) -> &str {
    if model == NO_MODEL_LOADED {
        tracing::warn!("No model is currently loaded in LM Studio");
    } else {
        tracing::info!(model = %model, "Using loaded model");
    }
    model
}
