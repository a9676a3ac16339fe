//! Model-loading nodes
//!
//! Each node resolves a file name inside the configured model folders,
//! hands the path to a host loader and also returns the file's base name
//! (no directory, no extension) for use in labels and output filenames.
//!
//! Folder layout mirrors the host's model directory:
//! ```text
//! models/
//! ├── checkpoints/
//! ├── diffusion_models/
//! ├── unet/
//! └── unet_gguf/
//! ```

pub mod probe;

pub use probe::{HeaderProbe, ModelFormat, ModelInfo};

use crate::config::NodesConfig;
use crate::error::{NodesError, NodesResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Shown in the GGUF selector when no file was found anywhere
pub const NO_GGUF_FILES: &str = "No GGUF files found";

/// File extensions the host can load
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "ckpt",
    "pt",
    "pt2",
    "bin",
    "pth",
    "safetensors",
    "pkl",
    "sft",
    "gguf",
];

/// Which loader node is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Checkpoint,
    Diffusion,
    Gguf,
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkpoint" => Ok(Self::Checkpoint),
            "diffusion" => Ok(Self::Diffusion),
            "gguf" => Ok(Self::Gguf),
            other => Err(format!("unknown model kind '{}'", other)),
        }
    }
}

/// One folder searched for a model kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderSearch {
    pub folder: &'static str,
    /// Only accept `.gguf` files from this folder
    pub gguf_only: bool,
}

const CHECKPOINT_SEARCH: &[FolderSearch] = &[FolderSearch {
    folder: "checkpoints",
    gguf_only: false,
}];

const DIFFUSION_SEARCH: &[FolderSearch] = &[FolderSearch {
    folder: "diffusion_models",
    gguf_only: false,
}];

const GGUF_SEARCH: &[FolderSearch] = &[
    FolderSearch {
        folder: "unet_gguf",
        gguf_only: false,
    },
    FolderSearch {
        folder: "unet",
        gguf_only: true,
    },
    FolderSearch {
        folder: "diffusion_models",
        gguf_only: true,
    },
];

impl ModelKind {
    /// Folders searched, in order
    pub fn search_order(self) -> &'static [FolderSearch] {
        match self {
            Self::Checkpoint => CHECKPOINT_SEARCH,
            Self::Diffusion => DIFFUSION_SEARCH,
            Self::Gguf => GGUF_SEARCH,
        }
    }
}

/// Weight precision requested from the diffusion loader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightDtype {
    #[default]
    Default,
    Fp8E4m3fn,
    Fp8E5m2,
}

impl std::str::FromStr for WeightDtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "fp8_e4m3fn" => Ok(Self::Fp8E4m3fn),
            "fp8_e5m2" => Ok(Self::Fp8E5m2),
            other => Err(format!("unknown weight dtype '{}'", other)),
        }
    }
}

/// Options forwarded to the host loader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderOptions {
    pub weight_dtype: WeightDtype,
}

/// A host loading function: resolved path in, model handle out
pub trait ModelLoader {
    type Handle;

    /// Short name used in logs and failure summaries
    fn name(&self) -> &str;

    fn load(&self, path: &Path, options: &LoaderOptions) -> anyhow::Result<Self::Handle>;
}

/// Loader output plus the derived display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModel<H> {
    pub handle: H,
    pub model_name: String,
    pub path: PathBuf,
}

/// Directories per folder kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelFolders {
    folders: BTreeMap<String, Vec<PathBuf>>,
}

impl ModelFolders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every folder any model kind searches, resolved through the config
    pub fn from_config(config: &NodesConfig) -> Self {
        let mut folders = Self::new();
        for search in CHECKPOINT_SEARCH
            .iter()
            .chain(DIFFUSION_SEARCH)
            .chain(GGUF_SEARCH)
        {
            folders
                .folders
                .entry(search.folder.to_string())
                .or_insert_with(|| config.folder_paths(search.folder));
        }
        folders
    }

    pub fn with_folder(mut self, folder: &str, dirs: Vec<PathBuf>) -> Self {
        self.folders.insert(folder.to_string(), dirs);
        self
    }

    fn dirs(&self, folder: &str) -> NodesResult<&[PathBuf]> {
        self.folders
            .get(folder)
            .map(Vec::as_slice)
            .ok_or_else(|| NodesError::UnknownFolder(folder.to_string()))
    }

    /// Loadable files in a folder kind, relative to their root, sorted
    pub fn filename_list(&self, folder: &str) -> NodesResult<Vec<String>> {
        let mut names = Vec::new();
        for dir in self.dirs(folder)? {
            collect_files(dir, dir, &mut names);
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Absolute path of `name` in the first directory that has it
    pub fn full_path(&self, folder: &str, name: &str) -> NodesResult<Option<PathBuf>> {
        if !is_relative_name(name) {
            return Ok(None);
        }
        Ok(self
            .dirs(folder)?
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file()))
    }

    /// Names offered by a loader node, following its folder fallbacks
    ///
    /// The first folder with any matching file wins.
    pub fn list_for(&self, kind: ModelKind) -> Vec<String> {
        for search in kind.search_order() {
            let names = match self.filename_list(search.folder) {
                Ok(names) => names,
                Err(e) => {
                    tracing::debug!(folder = search.folder, error = %e, "Skipping folder");
                    continue;
                }
            };
            let names: Vec<String> = names
                .into_iter()
                .filter(|n| !search.gguf_only || is_gguf(n))
                .collect();
            if !names.is_empty() {
                return names;
            }
        }
        Vec::new()
    }

    /// Like [`list_for`](Self::list_for), with the GGUF placeholder
    pub fn selectable_names(&self, kind: ModelKind) -> Vec<String> {
        let names = self.list_for(kind);
        if names.is_empty() && kind == ModelKind::Gguf {
            vec![NO_GGUF_FILES.to_string()]
        } else {
            names
        }
    }

    /// Find the file for a selection, searching the kind's folders in order
    pub fn resolve(&self, kind: ModelKind, name: &str) -> NodesResult<PathBuf> {
        for search in kind.search_order() {
            if search.gguf_only && !is_gguf(name) {
                continue;
            }
            match self.full_path(search.folder, name) {
                Ok(Some(path)) => {
                    tracing::debug!(folder = search.folder, path = ?path, "Found model file");
                    return Ok(path);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(folder = search.folder, error = %e, "Skipping folder"),
            }
        }

        Err(NodesError::ModelNotFound {
            name: name.to_string(),
            searched: kind
                .search_order()
                .iter()
                .map(|s| s.folder.to_string())
                .collect(),
        })
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if has_supported_extension(&path)
            && let Ok(relative) = path.strip_prefix(root)
        {
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(name);
        }
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_gguf(name: &str) -> bool {
    name.to_lowercase().ends_with(".gguf")
}

/// Reject absolute names and `..` so lookups stay inside the folders
fn is_relative_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Base file name without directory or extension
///
/// `sdxl/juggernaut_v9.safetensors` becomes `juggernaut_v9`.
pub fn model_display_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[..idx].to_string(),
        _ => base.to_string(),
    }
}

/// Resolve and load a model with a single loader
pub fn load_with_name<L: ModelLoader>(
    folders: &ModelFolders,
    kind: ModelKind,
    name: &str,
    loader: &L,
    options: &LoaderOptions,
) -> NodesResult<LoadedModel<L::Handle>> {
    let path = folders.resolve(kind, name)?;

    let handle = loader.load(&path, options).map_err(|e| NodesError::LoadFailed {
        path: path.clone(),
        attempts: vec![format!("{}: {:#}", loader.name(), e)],
    })?;

    let model_name = model_display_name(name);
    tracing::info!(model_name = %model_name, path = ?path, loader = loader.name(), "Model loaded");

    Ok(LoadedModel {
        handle,
        model_name,
        path,
    })
}

/// Resolve a model and try each loader in turn until one succeeds
pub fn load_with_strategies<H>(
    folders: &ModelFolders,
    kind: ModelKind,
    name: &str,
    strategies: &[Box<dyn ModelLoader<Handle = H>>],
    options: &LoaderOptions,
) -> NodesResult<LoadedModel<H>> {
    let path = folders.resolve(kind, name)?;
    let mut attempts = Vec::with_capacity(strategies.len());

    for (idx, strategy) in strategies.iter().enumerate() {
        tracing::debug!(method = idx + 1, loader = strategy.name(), "Trying load strategy");
        match strategy.load(&path, options) {
            Ok(handle) => {
                let model_name = model_display_name(name);
                tracing::info!(
                    model_name = %model_name,
                    path = ?path,
                    loader = strategy.name(),
                    "Model loaded"
                );
                return Ok(LoadedModel {
                    handle,
                    model_name,
                    path,
                });
            }
            Err(e) => {
                tracing::warn!(loader = strategy.name(), error = %e, "Load strategy failed");
                attempts.push(format!("{}: {:#}", strategy.name(), e));
            }
        }
    }

    tracing::error!(path = ?path, "All load strategies failed");
    Err(NodesError::LoadFailed { path, attempts })
}
