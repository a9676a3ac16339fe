//! Header probe used as the command-line stand-in for a host loader
//!
//! Reads just enough of a model file to identify its container format.
//! GGUF files start with the `GGUF` magic and a little-endian version;
//! safetensors files start with a little-endian u64 header length
//! followed by a JSON tensor index.

use super::{LoaderOptions, ModelLoader};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const GGUF_MAGIC: &[u8; 4] = b"GGUF";

/// Refuse safetensors headers larger than this
const MAX_SAFETENSORS_HEADER: u64 = 100 * 1024 * 1024;

/// Container format detected from the file header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ModelFormat {
    Gguf { version: u32 },
    Safetensors { tensors: usize },
    /// Readable, but not a format recognized here (e.g. pickled `.ckpt`)
    Unknown,
}

/// What the probe found out about a model file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub path: PathBuf,
    pub format: ModelFormat,
    pub size_bytes: u64,
}

/// Which formats a probe accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accept {
    Any,
    Gguf,
    Safetensors,
}

/// [`ModelLoader`] that validates the file header instead of loading weights
#[derive(Debug, Clone, Copy)]
pub struct HeaderProbe {
    accept: Accept,
}

impl HeaderProbe {
    /// Accept any readable file
    pub fn any() -> Self {
        Self {
            accept: Accept::Any,
        }
    }

    /// Require the GGUF magic
    pub fn gguf() -> Self {
        Self {
            accept: Accept::Gguf,
        }
    }

    /// Require a parseable safetensors header
    pub fn safetensors() -> Self {
        Self {
            accept: Accept::Safetensors,
        }
    }
}

/// Identify the container format of a model file
pub fn detect_format(path: &Path) -> Result<ModelFormat> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let len = file.metadata()?.len();

    let mut prefix = [0u8; 8];
    if len < prefix.len() as u64 {
        return Ok(ModelFormat::Unknown);
    }
    file.read_exact(&mut prefix)
        .context("Failed to read file header")?;

    if &prefix[..4] == GGUF_MAGIC {
        let version = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        return Ok(ModelFormat::Gguf { version });
    }

    let header_len = u64::from_le_bytes(prefix);
    if header_len > 0 && header_len <= MAX_SAFETENSORS_HEADER && header_len + 8 <= len {
        let mut header = vec![0u8; header_len as usize];
        file.read_exact(&mut header)
            .context("Failed to read safetensors header")?;
        if let Ok(serde_json::Value::Object(index)) = serde_json::from_slice(&header) {
            let tensors = index.keys().filter(|k| *k != "__metadata__").count();
            return Ok(ModelFormat::Safetensors { tensors });
        }
    }

    Ok(ModelFormat::Unknown)
}

impl ModelLoader for HeaderProbe {
    type Handle = ModelInfo;

    fn name(&self) -> &str {
        match self.accept {
            Accept::Any => "header-probe",
            Accept::Gguf => "gguf-header",
            Accept::Safetensors => "safetensors-header",
        }
    }

    fn load(&self, path: &Path, options: &LoaderOptions) -> Result<ModelInfo> {
        let format = detect_format(path)?;
        let size_bytes = std::fs::metadata(path)?.len();

        match (self.accept, &format) {
            (Accept::Any, _)
            | (Accept::Gguf, ModelFormat::Gguf { .. })
            | (Accept::Safetensors, ModelFormat::Safetensors { .. }) => {}
            (Accept::Gguf, other) => anyhow::bail!("not a GGUF file (found {:?})", other),
            (Accept::Safetensors, other) => {
                anyhow::bail!("not a safetensors file (found {:?})", other)
            }
        }

        tracing::debug!(
            path = ?path,
            format = ?format,
            size_bytes,
            weight_dtype = ?options.weight_dtype,
            "Probed model file"
        );

        Ok(ModelInfo {
            path: path.to_path_buf(),
            format,
            size_bytes,
        })
    }
}
