//! Vision-capability heuristics for model names
//!
//! LM Studio's listing carries no capability flags, so vision support is
//! guessed from well-known model family names.

use super::{ModelCatalog, list_models};
use crate::lms::LmsCli;

/// Prefix put in front of vision-capable entries in the marked listing
pub const VISION_MARKER: &str = "[VISION] ";

/// Name fragments of vision-capable model families
const VISION_KEYWORDS: &[&str] = &[
    "llava",
    "bakllava",
    "qwen2-vl",
    "qwen2.5-vl",
    "qwen2_vl",
    "qwen-vl",
    "pixtral",
    "minicpm-v",
    "gemma-3",
    "gemma3",
    "llama-3.2-vision",
    "llama-3.2-11b-vision",
    "moondream",
    "internvl",
    "idefics",
    "molmo",
    "glm-4v",
    "cogvlm",
    "phi-3-vision",
    "phi-3.5-vision",
    "florence",
    "-vision",
    "-vl-",
];

/// Names that contain a vision keyword but are text-only builds
const VISION_EXCEPTIONS: &[&str] = &["gemma-3-1b", "gemma3-1b", "gemma-3n"];

/// Entries in the listing that are not loadable chat models
const NON_MODEL_KEYWORDS: &[&str] = &["embed", "embedding", "bge-", "e5-", "rerank"];

/// Longest token still treated as a category label
const MAX_LABEL_LEN: usize = 12;

/// Whether a model name refers to a vision-capable model
pub fn is_vision_model(name: &str) -> bool {
    let name = strip_marker(name).to_lowercase();

    if VISION_EXCEPTIONS.iter().any(|k| name.contains(k)) {
        return false;
    }

    VISION_KEYWORDS.iter().any(|k| name.contains(k)) || name.ends_with("-vl")
}

/// Whether a listing entry is a real loadable model
///
/// Rejects embedding models and category labels like `LLM`, `LLMs` or
/// `EMBEDDING`.
pub fn is_catalog_entry(name: &str) -> bool {
    let name = strip_marker(name).trim();
    if name.is_empty() || is_category_label(name) {
        return false;
    }

    let lower = name.to_lowercase();
    !NON_MODEL_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn is_category_label(token: &str) -> bool {
    if token.len() > MAX_LABEL_LEN || !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    let stem = token.strip_suffix('s').unwrap_or(token);
    !stem.is_empty() && stem.chars().all(|c| c.is_ascii_uppercase())
}

/// Remove the vision marker from a (possibly marked) display name
pub fn strip_marker(name: &str) -> &str {
    name.strip_prefix(VISION_MARKER).unwrap_or(name)
}

/// Reorder and mark a catalog: vision models first, each group sorted
pub fn mark_catalog(catalog: ModelCatalog) -> ModelCatalog {
    let (mut vision, mut other): (Vec<String>, Vec<String>) = catalog
        .names()
        .iter()
        .filter(|name| is_catalog_entry(name))
        .cloned()
        .partition(|name| is_vision_model(name));

    vision.sort();
    other.sort();

    let names = vision
        .into_iter()
        .map(|name| format!("{}{}", VISION_MARKER, name))
        .chain(other)
        .collect();

    catalog.with_names(names)
}

/// List installed models with vision models marked and listed first
pub async fn list_marked_models(cli: &dyn LmsCli) -> ModelCatalog {
    let catalog = mark_catalog(list_models(cli).await);
    let vision_count = catalog
        .names()
        .iter()
        .filter(|n| n.starts_with(VISION_MARKER))
        .count();
    tracing::info!(
        total = catalog.len(),
        vision = vision_count,
        "Listed models with vision markers"
    );
    catalog
}
