//! Shared fixtures: a scripted stand-in for the `lms` executable
//!
//! The fake keeps its state in files next to the script so every test gets
//! an isolated instance without touching process-wide environment.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Listing printed by the fake `lms ls --detailed`
pub const LISTING: &str = "\
You have 3 models, taking up 28.3 GB of disk space.

Downloaded models                                   PARAMS   ARCH     SIZE
------------------------------------------------------------------------------
/lmstudio-community/gemma-3-27b-it-GGUF/gemma-3-27b-it-Q4_K_M.gguf   27B   gemma3   16.5 GB
/Qwen/Qwen2-VL-7B-Instruct-GGUF/qwen2-vl-7b-instruct-q4_k_m.gguf      7B    qwen2vl  4.7 GB
/nomic-ai/nomic-embed-text-v1.5-GGUF/nomic-embed-text-v1.5.Q8_0.gguf  137M  nomic    146 MB
";

const SCRIPT: &str = r#"#!/bin/sh
DIR="$(dirname "$0")"
echo "$*" >> "$DIR/calls.log"
case "$1" in
  ls)
    if [ -f "$DIR/ls_exit" ]; then exit "$(cat "$DIR/ls_exit")"; fi
    cat "$DIR/listing.txt"
    ;;
  ps)
    if [ -s "$DIR/loaded" ]; then
      echo "Currently loaded models:"
      echo "------------------------"
      cat "$DIR/loaded"
    else
      echo "No models are currently loaded."
    fi
    ;;
  unload)
    if [ -s "$DIR/loaded" ]; then
      : > "$DIR/loaded"
      echo "Unloaded all models."
    else
      echo "No models loaded." >&2
      exit 1
    fi
    ;;
  load)
    if [ -f "$DIR/load_sleep" ]; then sleep "$(cat "$DIR/load_sleep")"; fi
    if [ -f "$DIR/load_exit" ]; then
      echo "Error: cannot load $2" >&2
      exit "$(cat "$DIR/load_exit")"
    fi
    if [ ! -f "$DIR/load_silent" ]; then
      echo "$2   4.7 GB" >> "$DIR/loaded"
    fi
    echo "Model loaded. Use the identifier \"$(basename "$2")\" to reference it."
    ;;
  *)
    echo "unknown command $1" >&2
    exit 2
    ;;
esac
"#;

/// A fake `lms` in its own temporary directory
pub struct FakeLms {
    dir: TempDir,
}

impl FakeLms {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let script = dir.path().join("lms");
        std::fs::write(&script, SCRIPT).expect("Failed to write fake lms");
        std::fs::write(dir.path().join("listing.txt"), LISTING).expect("Failed to write listing");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
                .expect("Failed to make fake lms executable");
        }

        Self { dir }
    }

    pub fn binary(&self) -> String {
        self.path("lms").to_string_lossy().into_owned()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Replace the `ls --detailed` output
    pub fn with_listing(self, listing: &str) -> Self {
        self.write("listing.txt", listing);
        self
    }

    /// Pretend a model is already loaded
    pub fn with_loaded(self, line: &str) -> Self {
        self.write("loaded", &format!("{}\n", line));
        self
    }

    /// Make `ls` exit with the given code
    pub fn failing_ls(self, code: i32) -> Self {
        self.write("ls_exit", &code.to_string());
        self
    }

    /// Make `load` exit with the given code
    pub fn failing_load(self, code: i32) -> Self {
        self.write("load_exit", &code.to_string());
        self
    }

    /// Make `load` sleep before answering
    pub fn slow_load(self, secs: u64) -> Self {
        self.write("load_sleep", &secs.to_string());
        self
    }

    /// Make `load` succeed without the model ever showing up in `ps`
    pub fn silent_load(self) -> Self {
        self.write("load_silent", "");
        self
    }

    /// Every invocation so far, one argument string per call
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.path("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.path(name), content).expect("Failed to write fake lms state");
    }
}
